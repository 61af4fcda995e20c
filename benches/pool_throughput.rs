use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sockpool::config::PoolConfig;
use sockpool::{PoolManager, PoolSocket};
use std::sync::Arc;
use std::thread;

struct BenchSocket(u64);

impl PoolSocket for BenchSocket {
    type Descriptor = u64;

    fn descriptor(&self) -> u64 {
        self.0
    }

    fn close(self) {}
}

fn bench_pool() -> PoolManager<BenchSocket> {
    PoolManager::new(PoolConfig {
        max_connections_per_key: 10,
        idle_timeout_secs: 0,
    })
}

fn bench_release_acquire(c: &mut Criterion) {
    let pool = bench_pool();
    pool.release(BenchSocket(1), "example.com:443", true);

    c.bench_function("release_acquire_single_thread", |b| {
        b.iter(|| {
            let socket = pool.acquire("example.com:443", true).unwrap();
            pool.release(black_box(socket), "example.com:443", true);
        });
    });
}

fn bench_contended(c: &mut Criterion) {
    let pool = Arc::new(bench_pool());
    for fd in 0..10 {
        pool.release(BenchSocket(fd), "example.com:443", true);
    }

    c.bench_function("release_acquire_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            if let Some(socket) = pool.acquire("example.com:443", true) {
                                pool.release(socket, "example.com:443", true);
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

fn bench_all_connection_counts(c: &mut Criterion) {
    let pool = bench_pool();
    for fd in 0..500u64 {
        pool.release(BenchSocket(fd), &format!("host-{}:80", fd % 50), false);
    }

    c.bench_function("all_connection_counts_top_5", |b| {
        b.iter(|| black_box(pool.all_connection_counts(Some(5))));
    });
}

criterion_group!(
    benches,
    bench_release_acquire,
    bench_contended,
    bench_all_connection_counts
);
criterion_main!(benches);
