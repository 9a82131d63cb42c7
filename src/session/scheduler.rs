// ABOUTME: Periodic expiration sweep for editing sessions.
// ABOUTME: The task holds a weak reference, so dropping the manager ends it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::manager::SessionManager;

pub(crate) struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

impl SessionManager {
    /// Start sweeping expired sessions every `cleanup_interval`.
    ///
    /// The first sweep runs immediately. Returns `false` if a scheduler is
    /// already running.
    pub fn start_cleanup_scheduler(self: &Arc<Self>) -> bool {
        let mut slot = self.scheduler.lock();
        if slot.as_ref().is_some_and(SchedulerHandle::is_running) {
            return false;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let manager = Arc::downgrade(self);
        let period = self.settings.cleanup_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let report = manager.sweep_expired().await;
                        tracing::debug!(
                            sessions = report.expired.len(),
                            routes = report.routes_removed,
                            "cleanup tick"
                        );
                    }
                }
            }
            tracing::debug!("cleanup scheduler exited");
        });

        tracing::info!(interval = ?period, "cleanup scheduler started");
        *slot = Some(SchedulerHandle { token, task });
        true
    }

    /// Stop the scheduler and wait for an in-flight sweep to finish.
    pub async fn stop_cleanup_scheduler(&self) {
        let handle = self.scheduler.lock().take();
        let Some(handle) = handle else {
            return;
        };

        handle.cancel();
        if let Err(e) = handle.task.await {
            tracing::warn!(error = %e, "cleanup scheduler task failed");
        }
        tracing::info!("cleanup scheduler stopped");
    }

    pub fn is_cleanup_scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }
}
