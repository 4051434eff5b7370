//! Periodic background sync.

use crate::engine::SyncEngine;
use crate::error::{ConfigError, SyncError};
use crate::replica::Replica;
use crate::transport::RemoteTransport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to a background task calling [`SyncEngine::sync`] on the
/// configured interval.
///
/// A cycle with failed tables is retried sooner, following the engine's
/// [`RetryConfig`](crate::RetryConfig). Once the retry budget is spent the
/// scheduler falls back to the normal interval.
pub struct SyncScheduler {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    runs: Arc<AtomicU64>,
}

impl SyncScheduler {
    /// Spawns the loop on the current tokio runtime. The first cycle runs
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSyncInterval`] if the engine has no
    /// interval configured.
    pub fn spawn<T, R>(engine: Arc<SyncEngine<T, R>>) -> Result<Self, ConfigError>
    where
        T: RemoteTransport + 'static,
        R: Replica + 'static,
    {
        let interval = engine
            .config()
            .sync_interval
            .ok_or(ConfigError::MissingSyncInterval)?;
        let (stop, stopped) = watch::channel(false);
        let runs = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_loop(engine, interval, stopped, Arc::clone(&runs)));
        info!(interval_ms = interval.as_millis() as u64, "sync scheduler started");
        Ok(Self { stop, task, runs })
    }

    /// Cycles started so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and waits for it. A cycle in progress finishes first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync scheduler task ended abnormally");
        }
        info!("sync scheduler stopped");
    }
}

async fn run_loop<T, R>(
    engine: Arc<SyncEngine<T, R>>,
    interval: Duration,
    mut stopped: watch::Receiver<bool>,
    runs: Arc<AtomicU64>,
) where
    T: RemoteTransport + 'static,
    R: Replica + 'static,
{
    let retry = engine.config().retry.clone();
    let mut failures = 0u32;

    loop {
        if *stopped.borrow() {
            break;
        }
        runs.fetch_add(1, Ordering::SeqCst);

        let delay = match engine.sync().await {
            Ok(report) if report.is_success() => {
                failures = 0;
                interval
            }
            Ok(report) => {
                failures += 1;
                debug!(failed = report.failed_tables().len(), failures, "scheduled sync incomplete");
                if failures < retry.max_attempts {
                    retry.delay_for_attempt(failures)
                } else {
                    failures = 0;
                    interval
                }
            }
            Err(SyncError::Configuration(e)) => {
                error!(error = %e, "scheduled sync stopped: invalid configuration");
                break;
            }
            Err(e) => {
                warn!(error = %e, "scheduled sync failed");
                interval
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stopped.changed() => {}
        }
    }
}
