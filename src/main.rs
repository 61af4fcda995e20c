use anyhow::{Context, Result};
use clap::Parser;
use sockpool::config::{Config, LoggingConfig};
use sockpool::PoolManager;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sockpool")]
#[command(about = "Exercise the socket pool against an HTTP server", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP server to send requests to (host:port)
    #[arg(short, long, default_value = "127.0.0.1:80")]
    target: String,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 8)]
    workers: usize,

    /// Requests issued by each worker
    #[arg(short, long, default_value_t = 100)]
    requests: usize,

    /// Maximum idle sockets per destination (overrides config)
    #[arg(long)]
    max_connections_per_key: Option<usize>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Default)]
struct RunMetrics {
    reused: AtomicUsize,
    opened: AtomicUsize,
    failed: AtomicUsize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }
    if let Some(max) = args.max_connections_per_key {
        config.pool.max_connections_per_key = max;
    }
    config.validate()?;

    init_logging(&config.logging)?;

    info!("sockpool v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Sending to {} with {} workers x {} requests (max {} idle per key, idle timeout {}s)",
        args.target,
        args.workers,
        args.requests,
        config.pool.max_connections_per_key,
        config.pool.idle_timeout_secs
    );

    // the runtime lives as long as the process, so the reaper can share it
    let pool = Arc::new(PoolManager::<TcpStream>::with_runtime(
        config.pool.clone(),
        &Handle::current(),
    ));
    let metrics = Arc::new(RunMetrics::default());
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let pool = Arc::clone(&pool);
        let metrics = Arc::clone(&metrics);
        let target = args.target.clone();
        let requests = args.requests;

        tasks.push(tokio::spawn(async move {
            for _ in 0..requests {
                if let Err(e) = request_once(&pool, &target, &metrics).await {
                    debug!("Worker {} request failed: {}", worker, e);
                    metrics.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for task in tasks {
        if let Err(e) = task.await {
            warn!("Worker task panicked: {}", e);
        }
    }

    let elapsed = started.elapsed();
    let stats = pool.stats();

    println!("\n{}", "=".repeat(60));
    println!("Run duration:          {:.2}s", elapsed.as_secs_f64());
    println!("Connections reused:    {}", metrics.reused.load(Ordering::Relaxed));
    println!("Connections opened:    {}", metrics.opened.load(Ordering::Relaxed));
    println!("Failed requests:       {}", metrics.failed.load(Ordering::Relaxed));
    println!("Idle sockets pooled:   {}", stats.idle_sockets);
    println!("Destinations:          {}", stats.destinations);
    for (key, count) in pool.all_connection_counts(None) {
        println!("  {:<30} {}", key.to_string(), count);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}

/// Send one keep-alive HEAD request, reusing a pooled socket when possible
async fn request_once(
    pool: &PoolManager<TcpStream>,
    target: &str,
    metrics: &RunMetrics,
) -> std::io::Result<()> {
    let mut stream = match pool.acquire(target, false) {
        Some(stream) => {
            metrics.reused.fetch_add(1, Ordering::Relaxed);
            stream
        }
        None => {
            metrics.opened.fetch_add(1, Ordering::Relaxed);
            TcpStream::connect(target).await?
        }
    };

    let request = format!(
        "HEAD / HTTP/1.1\r\nHost: {}\r\nConnection: keep-alive\r\n\r\n",
        target
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::with_capacity(512);
    let mut buf = [0u8; 512];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        response.extend_from_slice(&buf[..n]);
        if response.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    pool.release(stream, target, false);
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&logging.level)
        .map_err(|e| sockpool::SockPoolError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}
