//! Per-job driving loop
//!
//! `process` moves one job from `Awaiting` to a terminal status. It reacts to
//! the live record: downloads completing, the install outcome arriving, the
//! record being deleted by a cancel. It never returns an error.

use berth_errors::{Error, InstallError, StateError};
use berth_install::{CacheLayout, DownloadCoordinator, InstallExecutor};
use berth_platform::Platform;
use berth_state::JobStore;
use berth_types::{Job, JobStatus, JobTransition, JobType};
use tracing::{debug, error, info, warn};

use crate::tracker::UpdateCompletionTracker;

#[derive(Debug, Clone)]
pub struct JobProcessor {
    store: JobStore,
    platform: Platform,
    cache: CacheLayout,
    coordinator: DownloadCoordinator,
    executor: InstallExecutor,
    tracker: UpdateCompletionTracker,
}

impl JobProcessor {
    #[must_use]
    pub fn new(
        store: JobStore,
        platform: Platform,
        cache: CacheLayout,
        coordinator: DownloadCoordinator,
        executor: InstallExecutor,
        tracker: UpdateCompletionTracker,
    ) -> Self {
        Self {
            store,
            platform,
            cache,
            coordinator,
            executor,
            tracker,
        }
    }

    /// Drive `job_id` to a terminal status, then report it to the tracker
    pub async fn process(&self, job_id: &str, is_update: bool) {
        let last = match self.drive(job_id).await {
            Ok(last) => last,
            Err(e) => {
                error!(job_id, error = %e, "job processing failed");
                self.mark_issue(job_id).await
            }
        };

        if let Err(e) = self.tracker.on_job_finished(last.as_ref(), is_update).await {
            warn!(job_id, error = %e, "update tracking failed");
        }
    }

    async fn drive(&self, job_id: &str) -> Result<Option<Job>, Error> {
        let Some(mut job) = self.store.get_by_id(job_id).await? else {
            debug!(job_id, "job vanished before processing");
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(Some(job));
        }

        if let Err(e) = validate(&job) {
            warn!(job_id, error = %e, "job rejected");
            self.store.transition(&mut job, JobTransition::Fail).await?;
            return Ok(Some(job));
        }

        if self.needs_install_recovery(&job).await? {
            info!(job_id, package = %job.package_name, "artifacts already cached, retrying install");
            if job.status == JobStatus::Downloading {
                self.coordinator.cancel_downloads(&job.id).await?;
            }
            self.store
                .transition(&mut job, JobTransition::RecoverInstall)
                .await?;
            self.executor.install(&mut job).await?;
        } else if job.status == JobStatus::Awaiting {
            self.coordinator.dispatch(&mut job).await?;
        }

        self.watch(job).await
    }

    /// Cached artifacts but no matching install, or an interrupted install
    async fn needs_install_recovery(&self, job: &Job) -> Result<bool, Error> {
        if job.job_type != JobType::Native {
            return Ok(false);
        }
        if job.status == JobStatus::Installing {
            return Ok(true);
        }
        if !self.cache.is_fully_cached(job).await? {
            return Ok(false);
        }
        let installed = self
            .platform
            .packages()
            .installed_version(&job.package_name)
            .await?;
        Ok(installed.is_none_or(|version| version < job.version_code))
    }

    async fn watch(&self, job: Job) -> Result<Option<Job>, Error> {
        let job_id = job.id.clone();
        let mut last = Some(job);
        let mut updates = self.store.observe(&job_id).await?;

        loop {
            let current = updates.borrow_and_update().clone();
            let Some(job) = current else {
                debug!(job_id = %job_id, "job record removed");
                return Ok(last);
            };
            last = Some(job.clone());

            match job.status {
                JobStatus::Awaiting | JobStatus::Downloading | JobStatus::Installing => {}
                JobStatus::Downloaded => {
                    if let Err(e) = self.install_downloaded(job).await {
                        error!(job_id = %job_id, error = %e, "install step failed");
                        return Ok(self.mark_issue(&job_id).await.or(last));
                    }
                }
                JobStatus::Installed | JobStatus::InstallationIssue | JobStatus::Blocked => {
                    return Ok(last);
                }
                status @ (JobStatus::Queued | JobStatus::Unavailable | JobStatus::PurchaseNeeded) => {
                    let violation = StateError::InvariantViolation {
                        job_id: job_id.clone(),
                        message: format!("unexpected status {status} while processing"),
                    };
                    error!(job_id = %job_id, error = %violation, "invariant violation");
                    return Ok(last);
                }
            }

            if updates.changed().await.is_err() {
                return Ok(last);
            }
        }
    }

    async fn install_downloaded(&self, mut job: Job) -> Result<(), Error> {
        self.store
            .transition(&mut job, JobTransition::StartInstall)
            .await?;
        self.executor.install(&mut job).await
    }

    /// Best-effort `InstallationIssue`; returns the record as left behind
    async fn mark_issue(&self, job_id: &str) -> Option<Job> {
        let mut job = match self.store.get_by_id(job_id).await {
            Ok(job) => job?,
            Err(e) => {
                error!(job_id, error = %e, "failed to read job record");
                return None;
            }
        };
        if job.status.is_active() {
            if let Err(e) = self.store.transition(&mut job, JobTransition::Fail).await {
                error!(job_id, error = %e, "failed to mark installation issue");
            }
        }
        Some(job)
    }
}

fn validate(job: &Job) -> Result<(), InstallError> {
    let invalid = |message: &str| InstallError::InvalidJob {
        job_id: job.id.clone(),
        message: message.to_string(),
    };
    match job.job_type {
        JobType::Native if job.package_name.is_empty() => Err(invalid("missing package name")),
        JobType::Native if job.download_urls.is_empty() => Err(invalid("no download URLs")),
        JobType::WebApp if job.web_url.is_none() || job.icon_url.is_none() => {
            Err(invalid("web app job needs a web URL and an icon URL"))
        }
        _ => Ok(()),
    }
}
