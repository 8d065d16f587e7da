//! Periodic software timer.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Control {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Thread-backed timer firing a callback on a fixed period.
///
/// The callback runs on the timer thread; it should only signal other
/// objects, since a slow callback delays the next tick.
pub struct PeriodicTimer {
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl PeriodicTimer {
    /// Spawn the timer thread. The first tick fires one `period` from now.
    pub fn start<F>(name: &str, period: Duration, callback: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let control = Arc::new(Control::default());
        let shared = control.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                let mut stopped = shared.stopped.lock();
                while !*stopped {
                    if shared.wake.wait_until(&mut stopped, next).timed_out() && !*stopped {
                        // Release the lock while the callback runs so stop() can proceed.
                        parking_lot::MutexGuard::unlocked(&mut stopped, &callback);
                        next += period;
                        let now = Instant::now();
                        if next < now {
                            next = now + period;
                        }
                    }
                }
            })?;
        Ok(Self {
            control,
            handle: Some(handle),
            period,
        })
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the timer and join its thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            *self.control.stopped.lock() = true;
            self.control.wake.notify_all();
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}
