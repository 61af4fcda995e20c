use super::key::PoolKey;
use super::reaper::Reaper;
use super::socket::PoolSocket;
use crate::config::PoolConfig;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// An idle socket waiting to be reused
struct Reclaimable<S> {
    socket: S,
    key: PoolKey,
    released_at: Instant,
}

/// Everything guarded by the pool lock.
///
/// `idle` holds descriptors only; the sockets themselves live in `reclaimable`.
/// A descriptor left in `idle` after the reaper closed its socket is stale and
/// is dropped by the next `take` that pops it.
struct PoolState<S: PoolSocket> {
    idle: HashMap<PoolKey, VecDeque<S::Descriptor>>,
    reclaimable: HashMap<S::Descriptor, Reclaimable<S>>,
    counts: HashMap<PoolKey, usize>,
}

impl<S: PoolSocket> PoolState<S> {
    fn new() -> Self {
        Self {
            idle: HashMap::new(),
            reclaimable: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    /// Pool `socket` under `key`.
    ///
    /// Hands the socket back as `Err` when the key is already full. On success,
    /// yields any socket displaced from the registry by a reused descriptor.
    fn put(
        &mut self,
        socket: S,
        key: PoolKey,
        now: Instant,
        max_per_key: usize,
    ) -> Result<Option<S>, S> {
        if self.idle.get(&key).map_or(0, VecDeque::len) >= max_per_key {
            return Err(socket);
        }

        let descriptor = socket.descriptor();
        self.idle.entry(key.clone()).or_default().push_front(descriptor);
        *self.counts.entry(key.clone()).or_insert(0) += 1;

        let entry = Reclaimable {
            socket,
            key,
            released_at: now,
        };
        Ok(self
            .reclaimable
            .insert(descriptor, entry)
            .map(|displaced| displaced.socket))
    }

    /// Pop the most recently pooled live socket for `key`, skipping stale slots
    fn take(&mut self, key: &PoolKey) -> Option<S> {
        let idle = self.idle.get_mut(key)?;
        let mut found = None;

        while let Some(descriptor) = idle.pop_front() {
            if let Some(count) = self.counts.get_mut(key) {
                *count = count.saturating_sub(1);
            }

            match self.reclaimable.entry(descriptor) {
                Entry::Occupied(slot) if slot.get().key == *key => {
                    found = Some(slot.remove().socket);
                    break;
                }
                _ => trace!("Skipping stale pool slot {:?} for {}", descriptor, key),
            }
        }

        // drained keys keep their counter at zero
        if idle.is_empty() {
            self.idle.remove(key);
        }

        found
    }

    /// Remove every registry entry idle for longer than `timeout`.
    ///
    /// The matching descriptors stay in their idle queues.
    fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<S> {
        let expired: Vec<S::Descriptor> = self
            .reclaimable
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.released_at) > timeout)
            .map(|(descriptor, _)| *descriptor)
            .collect();

        expired
            .into_iter()
            .filter_map(|descriptor| self.reclaimable.remove(&descriptor))
            .map(|entry| entry.socket)
            .collect()
    }
}

/// Close expired sockets outside the lock, returning how many were closed
fn sweep<S: PoolSocket>(state: &Mutex<PoolState<S>>, now: Instant, timeout: Duration) -> usize {
    let expired = state.lock().expire(now, timeout);
    let closed = expired.len();

    for socket in expired {
        socket.close();
    }

    if closed > 0 {
        debug!("Reaper closed {} idle sockets", closed);
    }
    closed
}

/// Bounded pool of idle sockets, partitioned by [`PoolKey`].
///
/// Client code calls [`acquire`](Self::acquire) before a request and
/// [`release`](Self::release) afterwards. Sockets idle for longer than the
/// configured timeout are closed by a background reaper started in
/// [`new`](Self::new). All operations are synchronous and never wait for a
/// socket to become available.
pub struct PoolManager<S: PoolSocket> {
    config: PoolConfig,
    state: Arc<Mutex<PoolState<S>>>,
    reaper: Reaper,
}

impl<S: PoolSocket> PoolManager<S> {
    /// Create a new pool and start its reaper if an idle timeout is configured.
    ///
    /// The reaper runs on a dedicated thread, so the pool does not depend on
    /// the lifetime of any tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        Self::build(config, |period, tick| Reaper::spawn_thread(period, tick))
    }

    /// Create a new pool whose reaper runs as a task on `handle`.
    ///
    /// The runtime must outlive the pool; once it shuts down, idle sockets stop
    /// expiring.
    pub fn with_runtime(config: PoolConfig, handle: &Handle) -> Self {
        Self::build(config, |period, tick| Reaper::spawn_task(handle, period, tick))
    }

    fn build<F>(config: PoolConfig, start_reaper: F) -> Self
    where
        F: FnOnce(Duration, Box<dyn FnMut() -> bool + Send>) -> Reaper,
    {
        let state = Arc::new(Mutex::new(PoolState::new()));

        let reaper = match config.idle_timeout() {
            Some(timeout) => {
                let weak: Weak<Mutex<PoolState<S>>> = Arc::downgrade(&state);
                start_reaper(
                    timeout,
                    Box::new(move || match weak.upgrade() {
                        Some(state) => {
                            sweep(&state, Instant::now(), timeout);
                            true
                        }
                        None => false,
                    }),
                )
            }
            None => {
                debug!("Idle timeout disabled, pool reaper not started");
                Reaper::Disabled
            }
        };

        Self {
            config,
            state,
            reaper,
        }
    }

    /// Take a pooled socket for `address`, if one is available.
    ///
    /// `None` means the caller should open a fresh connection.
    pub fn acquire(&self, address: &str, use_tls: bool) -> Option<S> {
        self.fetch(&PoolKey::new(address, use_tls))
    }

    /// Hand a socket back after a request completes
    pub fn release(&self, socket: S, address: &str, use_tls: bool) {
        self.store(socket, PoolKey::new(address, use_tls));
    }

    /// Take the most recently released socket for `key`
    pub fn fetch(&self, key: &PoolKey) -> Option<S> {
        let socket = self.state.lock().take(key);

        match &socket {
            Some(socket) => trace!("Reusing pooled socket {:?} for {}", socket.descriptor(), key),
            None => trace!("Pool miss for {}", key),
        }
        socket
    }

    /// Pool `socket` under `key`, or close it if `key` already holds the maximum
    pub fn store(&self, socket: S, key: PoolKey) {
        let descriptor = socket.descriptor();
        let max_per_key = self.config.max_connections_per_key;

        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.put(socket, key.clone(), Instant::now(), max_per_key);
            if outcome.is_ok() {
                trace!(
                    "Returned socket {:?} to pool for {} (pool size: {})",
                    descriptor,
                    key,
                    state.counts.get(&key).copied().unwrap_or(0)
                );
            }
            outcome
        };

        match outcome {
            Ok(None) => {}
            Ok(Some(displaced)) => {
                debug!(
                    "Descriptor {:?} reused while pooled, closing displaced socket",
                    descriptor
                );
                displaced.close();
            }
            Err(socket) => {
                debug!("Pool for {} is full, closing socket {:?}", key, descriptor);
                socket.close();
            }
        }
    }

    /// Number of idle sockets pooled for `address`
    pub fn connection_count(&self, address: &str, use_tls: bool) -> usize {
        let key = PoolKey::new(address, use_tls);
        self.state.lock().counts.get(&key).copied().unwrap_or(0)
    }

    /// Per-key counts, largest first. `limit` keeps only the top entries.
    pub fn all_connection_counts(&self, limit: Option<usize>) -> Vec<(PoolKey, usize)> {
        let mut counts: Vec<(PoolKey, usize)> = self
            .state
            .lock()
            .counts
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect();

        counts.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        if let Some(limit) = limit {
            counts.truncate(limit);
        }
        counts
    }

    /// Close sockets that have been idle longer than the timeout, as of now
    pub fn reap(&self) -> usize {
        self.reap_at(Instant::now())
    }

    /// Close sockets released more than the idle timeout before `now`.
    ///
    /// Does nothing when the timeout is disabled. Returns the number closed.
    pub fn reap_at(&self, now: Instant) -> usize {
        match self.config.idle_timeout() {
            Some(timeout) => sweep(&self.state, now, timeout),
            None => 0,
        }
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();

        PoolStats {
            idle_sockets: state.counts.values().sum(),
            reclaimable_sockets: state.reclaimable.len(),
            destinations: state.idle.len(),
            reaper_running: self.reaper.is_running(),
            config: self.config.clone(),
        }
    }

    /// Configuration the pool was built with
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<S: PoolSocket> Default for PoolManager<S> {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// Statistics about the socket pool
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Idle slots across all keys, including slots whose socket was reaped
    pub idle_sockets: usize,
    /// Sockets still open and waiting for reuse
    pub reclaimable_sockets: usize,
    /// Number of keys with at least one idle slot
    pub destinations: usize,
    /// Whether the background reaper is active
    pub reaper_running: bool,
    /// Pool configuration
    pub config: PoolConfig,
}
