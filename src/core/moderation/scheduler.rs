// Periodic driver for the moderation engine.
//
// Runs one pass immediately, then one per interval, until the handle is shut
// down or dropped. Manual passes go straight to `ModerationEngine::process_reports`
// and share the engine's run lock with the timer.

use super::moderation_service::{ContentStore, ModerationEngine, ReportStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub struct AutoModerator<S: ReportStore, C: ContentStore> {
    engine: Arc<ModerationEngine<S, C>>,
    period: Duration,
}

impl<S, C> AutoModerator<S, C>
where
    S: ReportStore + 'static,
    C: ContentStore + 'static,
{
    /// Scheduler using the engine's configured interval.
    pub fn new(engine: Arc<ModerationEngine<S, C>>) -> Self {
        let minutes = engine.config().auto_process_interval_minutes;
        Self::with_period(engine, Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn with_period(engine: Arc<ModerationEngine<S, C>>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Spawn the background loop. The first pass runs right away.
    pub fn start(&self) -> AutoModerationHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let period = self.period;

        tracing::info!(
            interval_secs = period.as_secs(),
            "Starting auto-moderation scheduler"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::debug!("Scheduled moderation pass starting");
                        engine.process_reports(Utc::now()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        // Err: the handle was dropped
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Auto-moderation scheduler stopped");
        });

        AutoModerationHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner of a running scheduler loop.
pub struct AutoModerationHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoModerationHandle {
    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for an in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Auto-moderation task ended abnormally: {}", e);
        }
    }
}
