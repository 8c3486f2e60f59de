//! Cancellable periodic task.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest period a task will tick at; tokio rejects a zero interval
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Runs a closure on a fixed period until cancelled.
///
/// Cancellation is synchronous: once [`cancel`](Self::cancel) returns, the
/// closure will not run again. It is also idempotent, and dropping the task
/// cancels it. Must be created inside a tokio runtime.
pub struct RepeatingTask {
    active: Arc<Mutex<bool>>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn a task whose first tick fires one `period` from now.
    ///
    /// Periods below one millisecond are raised to one millisecond.
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let active = Arc::new(Mutex::new(true));
        let cancel_token = CancellationToken::new();

        let task_active = Arc::clone(&active);
        let task_token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        // Held across the tick so cancel() waits for a running body
                        let active = task_active.lock();
                        if !*active {
                            break;
                        }
                        tick();
                    }
                }
            }
        });

        Self {
            active,
            cancel_token,
            handle,
        }
    }

    /// Stop the task. Safe to call more than once.
    pub fn cancel(&self) {
        *self.active.lock() = false;
        self.cancel_token.cancel();
        self.handle.abort();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        !*self.active.lock()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
