//! Supervised background loops owned by each realtime component.
//!
//! Every component that runs periodic work (heartbeat checks, sweeps,
//! flushes) owns one [`BackgroundTasks`]. `shutdown` cancels all loops
//! and waits for them to exit, so no task outlives its owner's `stop`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use lexhub_core::AppResult;

#[derive(Debug)]
struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Running {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

/// A restartable group of cancellable tasks.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    running: Mutex<Option<Running>>,
}

impl BackgroundTasks {
    /// Create an empty task group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any task has been spawned since the last shutdown.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn a task that receives the group's cancellation token.
    pub async fn spawn<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().await;
        let running = running.get_or_insert_with(Running::new);
        let fut = task(running.cancel.child_token());
        running.tracker.spawn(async move {
            fut.await;
            debug!(task = name, "Background task stopped");
        });
    }

    /// Spawn a loop that runs `tick` every `period` until cancelled.
    ///
    /// The first tick fires one full period after spawning. Errors and
    /// panics from a single tick are logged and the loop keeps going.
    /// Cancellation is only observed between ticks, so a tick that has
    /// started always runs to completion.
    pub async fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        self.spawn(name, move |cancel| async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(task = name, error = %e, "Background task iteration failed"),
                    Err(_) => error!(task = name, "Background task iteration panicked"),
                }
            }
        })
        .await;
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        running.tracker.close();
        running.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lexhub_core::AppError;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_runs_until_shutdown() {
        let tasks = BackgroundTasks::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        tasks
            .spawn_periodic("counter", Duration::from_secs(10), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        tasks.shutdown().await;
        assert!(!tasks.is_running().await);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_and_panicking_ticks_keep_loop_alive() {
        let tasks = BackgroundTasks::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        tasks
            .spawn_periodic("flaky", Duration::from_secs(1), move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    match n {
                        0 => Err(AppError::internal("boom")),
                        1 => panic!("tick panicked"),
                        _ => Ok(()),
                    }
                }
            })
            .await;

        time::sleep(Duration::from_millis(4500)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 4);
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_tick() {
        let tasks = BackgroundTasks::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        tasks
            .spawn_periodic("slow", Duration::from_secs(10), move || {
                let counter = counter.clone();
                async move {
                    time::sleep(Duration::from_secs(2)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        tasks.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_tasks_is_noop() {
        let tasks = BackgroundTasks::new();
        tasks.shutdown().await;
        assert!(!tasks.is_running().await);
    }
}
