use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A task re-run on a fixed period until stopped.
///
/// Each run is awaited before the next tick is considered, so runs never
/// overlap and a slow run delays the schedule. Stopping takes effect between
/// runs; a run in progress always completes.
#[derive(Debug)]
pub struct Recurring {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Recurring {
    /// Run `task` now and then every `period`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::start(name, Instant::now(), period, task)
    }

    /// Like [`Recurring::spawn`] but the first run waits one `period`.
    pub fn spawn_delayed<F, Fut>(name: &'static str, period: Duration, task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::start(name, Instant::now() + period, period, task)
    }

    fn start<F, Fut>(name: &'static str, first: Instant, period: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                task().await;
            }
            debug!(task = name, "recurring task stopped");
        });
        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Recurring {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
