use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Background sweep owned by a pool. Stops when dropped.
pub(crate) enum Reaper {
    Task(JoinHandle<()>),
    Thread(Arc<StopSignal>),
    Disabled,
}

#[derive(Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    /// Sleep for `period` or until stopped. Returns true once stopped.
    fn wait(&self, period: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cvar.wait_for(&mut stopped, period);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.cvar.notify_all();
    }
}

impl Reaper {
    /// Run `tick` every `period` on a dedicated thread, first after one full period.
    ///
    /// The thread does not depend on any runtime, so the sweep keeps going for
    /// as long as the pool lives. `tick` returns false once there is nothing left
    /// to reap for (the pool is gone), which ends the loop.
    pub(crate) fn spawn_thread<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let spawned = thread::Builder::new()
            .name("sockpool-reaper".to_string())
            .spawn(move || {
                while !thread_signal.wait(period) {
                    if !tick() {
                        break;
                    }
                }
                thread_signal.stop();
            });

        match spawned {
            Ok(_) => {
                debug!("Pool reaper thread started (period: {:?})", period);
                Reaper::Thread(signal)
            }
            Err(e) => {
                warn!(
                    "Failed to start pool reaper thread, idle sockets will not expire: {}",
                    e
                );
                Reaper::Disabled
            }
        }
    }

    /// Run `tick` every `period` as a task on `handle`.
    ///
    /// The task dies with its runtime, so the caller must keep the runtime
    /// alive for as long as the pool.
    pub(crate) fn spawn_task<F>(handle: &Handle, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let first = Instant::now() + period;
        let task = handle.spawn(async move {
            let mut interval = interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if !tick() {
                    break;
                }
            }
        });
        debug!("Pool reaper task started (period: {:?})", period);
        Reaper::Task(task)
    }

    pub(crate) fn is_running(&self) -> bool {
        match self {
            Reaper::Task(task) => !task.is_finished(),
            Reaper::Thread(signal) => !*signal.stopped.lock(),
            Reaper::Disabled => false,
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        match self {
            Reaper::Task(task) => {
                task.abort();
                debug!("Pool reaper task stopped");
            }
            Reaper::Thread(signal) => {
                signal.stop();
                debug!("Pool reaper thread stopped");
            }
            Reaper::Disabled => {}
        }
    }
}
