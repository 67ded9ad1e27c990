//! Summary of an update-all batch

use std::collections::BTreeSet;
use std::sync::Arc;

use berth_errors::Error;
use berth_events::{EventEmitter, EventSender, NoticeEvent};
use berth_platform::Platform;
use berth_state::JobStore;
use berth_types::{Job, JobStatus, JobType};
use tokio::sync::Mutex;
use tracing::info;

/// Collects packages updated during a batch run
///
/// Once nothing is left in flight the collected set is announced with one
/// `UpdatesCompleted` notice and cleared.
///
/// "In flight" means an active status, `Queued` through `Installing`.
/// Persisted jobs parked in `Unavailable` or `Blocked` do not delay the
/// notice, the same as `InstallationIssue` and `PurchaseNeeded`: none of
/// them moves again without a new enqueue.
#[derive(Debug, Clone)]
pub struct UpdateCompletionTracker {
    store: JobStore,
    platform: Platform,
    updated: Arc<Mutex<BTreeSet<String>>>,
    tx: Option<EventSender>,
}

impl EventEmitter for UpdateCompletionTracker {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl UpdateCompletionTracker {
    #[must_use]
    pub fn new(store: JobStore, platform: Platform) -> Self {
        Self {
            store,
            platform,
            updated: Arc::new(Mutex::new(BTreeSet::new())),
            tx: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Record a finished job; returns the announced count when the batch
    /// summary was emitted
    pub async fn on_job_finished(
        &self,
        job: Option<&Job>,
        is_update: bool,
    ) -> Result<Option<usize>, Error> {
        if !is_update {
            return Ok(None);
        }

        let mut updated = self.updated.lock().await;
        if let Some(job) = job {
            if self.is_installed(job).await? {
                updated.insert(job.title().to_string());
            }
        }
        if updated.is_empty() {
            return Ok(None);
        }

        let in_flight = self
            .store
            .get_all()
            .await?
            .iter()
            .any(|job| job.status.is_active());
        if in_flight {
            return Ok(None);
        }

        let packages: Vec<String> = std::mem::take(&mut *updated).into_iter().collect();
        let count = packages.len();
        info!(count, "update batch completed");
        self.emit_notice(NoticeEvent::UpdatesCompleted {
            count,
            packages,
            completed_at: chrono::Utc::now(),
        });
        Ok(Some(count))
    }

    async fn is_installed(&self, job: &Job) -> Result<bool, Error> {
        match job.job_type {
            JobType::WebApp => Ok(job.status == JobStatus::Installed),
            JobType::Native => Ok(self
                .platform
                .packages()
                .installed_version(&job.package_name)
                .await?
                .is_some_and(|version| version >= job.version_code)),
        }
    }
}
