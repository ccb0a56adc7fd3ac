// # Scheduler
//
// Periodic trigger for the Reconciler.
//
// ## Behavior
//
// - The interval is read from settings before each wait; 0 means "not
//   scheduled" and the loop idles until rescheduled or shut down
// - The first run happens one full interval after start
// - `reschedule()` restarts the wait with the current settings, so an
//   interval change takes effect immediately
// - Shutdown is observed between runs; an in-flight run is never cancelled
//
// Audit retention is swept by the reconciler itself, so manual-only setups
// (interval 0) are pruned as well.

use crate::engine::{Reconciler, RunOutcome};
use crate::traits::SettingsStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, oneshot};
use tracing::{debug, info, warn};

/// Fixed-interval trigger
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    settings: Arc<dyn SettingsStore>,
    reschedule: Notify,
    next_run: RwLock<Option<DateTime<Utc>>>,
}

impl Scheduler {
    /// Create a scheduler; nothing runs until [`run`](Self::run) is awaited
    pub fn new(reconciler: Arc<Reconciler>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            reconciler,
            settings,
            reschedule: Notify::new(),
            next_run: RwLock::new(None),
        }
    }

    /// Restart the wait using the current settings
    pub fn reschedule(&self) {
        self.reschedule.notify_one();
    }

    /// When the next scheduled run is due, or `None` when not scheduled
    pub async fn next_run(&self) -> Option<DateTime<Utc>> {
        *self.next_run.read().await
    }

    /// Drive the schedule until `shutdown` fires
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        info!("Scheduler started");

        loop {
            let interval = self.current_interval().await;

            if interval == 0 {
                *self.next_run.write().await = None;
                debug!("Check interval is 0, not scheduled");

                tokio::select! {
                    _ = self.reschedule.notified() => continue,
                    _ = &mut shutdown => break,
                }
            }

            let due = Utc::now() + ChronoDuration::seconds(interval as i64);
            *self.next_run.write().await = Some(due);
            debug!("Next check at {} (every {}s)", due, interval);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {
                    self.tick().await;
                }
                _ = self.reschedule.notified() => {
                    info!("Schedule reloaded from settings");
                }
                _ = &mut shutdown => break,
            }
        }

        *self.next_run.write().await = None;
        info!("Scheduler stopped");
    }

    /// One scheduled run
    pub async fn tick(&self) -> RunOutcome {
        self.reconciler.reconcile().await
    }

    async fn current_interval(&self) -> u64 {
        match self.settings.load().await {
            Ok(settings) => settings.check_interval,
            Err(e) => {
                warn!("Failed to load settings for scheduling: {}", e);
                0
            }
        }
    }
}
