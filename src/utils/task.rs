use log::error;
use std::{future::Future, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A spawned loop tied to the lifetime of its owner.
///
/// The loop receives a [`CancellationToken`] and is expected to exit when it
/// fires. Dropping the handle cancels the token and aborts the task, so a
/// timer can never outlive the engine that started it.
pub struct ScopedTask {
    name: &'static str,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScopedTask {
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(body(cancel_token.clone()));
        Self {
            name,
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!("{} task failed to join: {err}", self.name);
                }
            }
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Interval whose first tick fires one period from now rather than
/// immediately. Late ticks are delayed, never bunched. Periods shorter than
/// a millisecond are raised to one.
pub fn delayed_interval(period: Duration) -> time::Interval {
    let period = period.max(MIN_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
