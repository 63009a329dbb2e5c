//! One-shot expiry timer.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Delayed task that runs a callback once at a wall-clock due-time.
///
/// A due-time already in the past fires immediately. Dropping the timer
/// cancels it if it has not fired yet.
#[derive(Debug)]
pub struct ExpiryTimer {
    task: JoinHandle<()>,
}

impl ExpiryTimer {
    /// Spawn a task that waits until `due` and then runs `on_fire`.
    pub fn schedule<F, Fut>(due: DateTime<Utc>, on_fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = delay_until(due, Utc::now());
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire().await;
        });
        Self { task }
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Time left until `due`, zero if already passed.
pub(crate) fn delay_until(due: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (due - now).to_std().unwrap_or(Duration::ZERO)
}
