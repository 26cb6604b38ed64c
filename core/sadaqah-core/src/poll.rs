//! Fixed-interval fallback refresh.
//!
//! Runs regardless of live-channel health so the dashboard converges even
//! when the socket is degraded or has given up reconnecting.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

pub struct PollTimer {
    task: JoinHandle<()>,
}

impl PollTimer {
    /// Calls `on_tick` every `period`, first after one full period. Each
    /// tick's work runs as its own task: a slow or failing refresh never
    /// delays or cancels the next tick.
    pub fn spawn<F, Fut>(period: Duration, on_tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!(period_ms = period.as_millis() as u64, "Poll tick");
                tokio::spawn(on_tick());
            }
        });
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
