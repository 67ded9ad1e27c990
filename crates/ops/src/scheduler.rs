//! Admission of install jobs into the pipeline

use std::path::PathBuf;
use std::sync::Arc;

use berth_errors::{CatalogError, Error, NetworkError, StorageError, UserFacingError};
use berth_events::{AppEvent, EventEmitter, EventSender, NoticeEvent, QueueEvent};
use berth_install::{FaultRecovery, StorageGuard};
use berth_platform::Platform;
use berth_state::JobStore;
use berth_types::{Job, JobStatus, JobTransition, JobType};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::work_queue::{WorkItem, WorkQueue};

/// Outcome of the checks that may stop a job after it was persisted
enum Admission {
    Submitted,
    Held,
}

/// Claim on a job id for the duration of one `enqueue`
///
/// Released on drop, so every exit path of admission frees the id.
struct AdmissionClaim {
    admitting: Arc<DashMap<String, ()>>,
    job_id: String,
}

impl AdmissionClaim {
    fn acquire(admitting: &Arc<DashMap<String, ()>>, job_id: &str) -> Option<Self> {
        match admitting.entry(job_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    admitting: Arc::clone(admitting),
                    job_id: job_id.to_string(),
                })
            }
        }
    }
}

impl Drop for AdmissionClaim {
    fn drop(&mut self) {
        self.admitting.remove(&self.job_id);
    }
}

/// Public entry point of the pipeline
#[derive(Debug, Clone)]
pub struct InstallScheduler {
    store: JobStore,
    platform: Platform,
    queue: WorkQueue,
    guard: StorageGuard,
    recovery: FaultRecovery,
    storage_root: PathBuf,
    admitting: Arc<DashMap<String, ()>>,
    tx: Option<EventSender>,
}

impl EventEmitter for InstallScheduler {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl InstallScheduler {
    #[must_use]
    pub fn new(
        store: JobStore,
        platform: Platform,
        queue: WorkQueue,
        guard: StorageGuard,
        recovery: FaultRecovery,
        storage_root: PathBuf,
    ) -> Self {
        Self {
            store,
            platform,
            queue,
            guard,
            recovery,
            storage_root,
            admitting: Arc::new(DashMap::new()),
            tx: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Validate, persist and submit `job`
    ///
    /// Returns `true` only when the job was handed to the work queue. A job
    /// held back by a missing network, low storage or a required purchase
    /// stays persisted with the matching status and `false` is returned.
    /// Packages with a recorded signature conflict are not admitted until
    /// the OS reports them added or removed.
    /// Failures never propagate: they leave the job `InstallationIssue`.
    ///
    /// Concurrent calls for one id are serialized; only the first proceeds.
    pub async fn enqueue(&self, mut job: Job, is_update: bool) -> bool {
        let Some(_claim) = AdmissionClaim::acquire(&self.admitting, &job.id) else {
            debug!(job_id = %job.id, "job already being admitted");
            return false;
        };

        if self.queue.is_live(&job.id).await {
            debug!(job_id = %job.id, "job already running in the work queue");
            return false;
        }

        let existing = match self.store.get_by_id(&job.id).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to read job record");
                return false;
            }
        };
        if let Some(existing) = &existing {
            if !existing.status.is_retryable() {
                debug!(job_id = %job.id, status = %existing.status, "job already known");
                return false;
            }
        }

        match self.recovery.fault_for(&job.package_name).await {
            Ok(Some(fault)) => {
                info!(job_id = %job.id, package = %job.package_name, reason = %fault.reason, "package has an unresolved conflict");
                self.emit_notice(NoticeEvent::SignatureMismatch {
                    package: job.package_name.clone(),
                });
                return false;
            }
            Ok(None) => {}
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to read fault records");
                return false;
            }
        }

        if !job.is_free && self.platform.account().is_anonymous() {
            info!(job_id = %job.id, package = %job.package_name, "paid package needs an account");
            self.emit_notice(NoticeEvent::PurchaseRequiresAccount {
                package: job.title().to_string(),
            });
            return false;
        }

        match self.admit(&mut job, existing.map(|e| e.status), is_update).await {
            Ok(Admission::Submitted) => true,
            Ok(Admission::Held) => false,
            Err(e) => {
                error!(job_id = %job.id, package = %job.package_name, error = %e, "enqueue failed");
                self.mark_issue(&job.id).await;
                false
            }
        }
    }

    async fn admit(
        &self,
        job: &mut Job,
        previous: Option<JobStatus>,
        is_update: bool,
    ) -> Result<Admission, Error> {
        if job.job_type == JobType::Native {
            match self.platform.catalog().resolve(job).await {
                Ok(resolved) => {
                    job.download_urls = resolved.download_urls;
                    if !resolved.files.is_empty() {
                        job.files = resolved.files;
                    }
                }
                Err(Error::Catalog(CatalogError::PurchaseRequired { .. })) => {
                    self.persist(job, previous).await?;
                    self.store
                        .transition(job, JobTransition::RequirePurchase)
                        .await?;
                    self.emit_notice(NoticeEvent::PurchaseFlowRequired {
                        package: job.title().to_string(),
                    });
                    return Ok(Admission::Held);
                }
                Err(e) => {
                    warn!(job_id = %job.id, package = %job.package_name, error = %e, "download resolution failed");
                    self.emit_notice(NoticeEvent::LoadError {
                        package: job.title().to_string(),
                        message: e.to_string(),
                    });
                    return Ok(Admission::Held);
                }
            }
        }

        self.persist(job, previous).await?;

        if !self.platform.network().is_reachable().await {
            let error = NetworkError::NetworkUnavailable;
            warn!(job_id = %job.id, code = error.user_code(), error = %error, "job held");
            self.emit_notice(NoticeEvent::NetworkUnavailable {
                package: job.title().to_string(),
            });
            self.store.transition(job, JobTransition::Fail).await?;
            return Ok(Admission::Held);
        }

        match self
            .guard
            .check(self.platform.storage(), &self.storage_root, job.app_size)
            .await
        {
            Ok(()) => {}
            Err(Error::Storage(StorageError::InsufficientSpace { missing })) => {
                warn!(job_id = %job.id, missing, "not enough free space");
                self.emit_notice(NoticeEvent::LowStorage {
                    package: job.title().to_string(),
                    missing,
                });
                self.store.transition(job, JobTransition::Fail).await?;
                return Ok(Admission::Held);
            }
            Err(e) => return Err(e),
        }

        self.store.transition(job, JobTransition::Await).await?;
        self.queue
            .submit(WorkItem {
                job_id: job.id.clone(),
                is_update,
            })
            .await?;

        info!(job_id = %job.id, package = %job.package_name, is_update, "job queued");
        self.emit(AppEvent::Queue(QueueEvent::JobQueued {
            job_id: job.id.clone(),
            package: job.title().to_string(),
            job_type: job.job_type,
        }));
        Ok(Admission::Submitted)
    }

    /// Store the job as `Queued`, requeueing a retryable previous record
    async fn persist(&self, job: &mut Job, previous: Option<JobStatus>) -> Result<(), Error> {
        job.download_ids.clear();
        match previous {
            Some(status) => {
                job.status = status;
                self.store.add(job).await?;
                self.store.transition(job, JobTransition::Requeue).await?;
            }
            None => {
                job.status = JobStatus::Queued;
                self.store.add(job).await?;
            }
        }
        Ok(())
    }

    async fn mark_issue(&self, job_id: &str) {
        match self.store.get_by_id(job_id).await {
            Ok(Some(mut job)) if job.status.is_active() => {
                if let Err(e) = self.store.transition(&mut job, JobTransition::Fail).await {
                    error!(job_id, error = %e, "failed to mark installation issue");
                }
            }
            Ok(_) => {}
            Err(e) => error!(job_id, error = %e, "failed to read job record"),
        }
    }
}
