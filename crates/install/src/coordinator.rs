//! Download dispatch and transport completion
//!
//! The coordinator is the only writer of a job's `download_ids`. Dispatch,
//! completion and failure handling all run under one mutex shared by every
//! job, so a completion can never observe a half-populated map and two jobs
//! never build their cache directories at the same time.

use std::sync::Arc;

use berth_config::PipelineConfig;
use berth_errors::{Error, InstallError, UserFacingError};
use berth_events::{
    AppEvent, DownloadEvent, EventEmitter, EventSender, FailureContext, InstallEvent,
};
use berth_platform::{Platform, Shortcut, TransportRequest};
use berth_state::JobStore;
use berth_types::{FileKind, Job, JobStatus, JobTransition, JobType, TransportJobId};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::CacheLayout;
use crate::progress::{calculate_progress, ProgressTracker};

#[derive(Clone)]
pub struct DownloadCoordinator {
    store: JobStore,
    platform: Platform,
    cache: CacheLayout,
    settings: PipelineConfig,
    progress: ProgressTracker,
    lock: Arc<Mutex<()>>,
    /// Transport id -> owning job id
    owners: Arc<DashMap<TransportJobId, String>>,
    tx: Option<EventSender>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("cache", &self.cache)
            .field("tracked_transport_ids", &self.owners.len())
            .finish_non_exhaustive()
    }
}

impl EventEmitter for DownloadCoordinator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl DownloadCoordinator {
    #[must_use]
    pub fn new(
        store: JobStore,
        platform: Platform,
        cache: CacheLayout,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            store,
            platform,
            cache,
            settings,
            progress: ProgressTracker::new(),
            lock: Arc::new(Mutex::new(())),
            owners: Arc::new(DashMap::new()),
            tx: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Start acquiring a job's artifacts
    ///
    /// Native jobs are handed to the download transport. Web-app jobs run the
    /// whole shortcut install here.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be prepared, the transport
    /// rejects a request, or a status transition is invalid. Transport ids
    /// accepted before the failure are cancelled.
    pub async fn dispatch(&self, job: &mut Job) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        match job.job_type {
            JobType::Native => self.dispatch_native(job).await,
            JobType::WebApp => self.install_webapp(job).await,
        }
    }

    async fn dispatch_native(&self, job: &mut Job) -> Result<(), Error> {
        if job.download_urls.is_empty() {
            return Err(InstallError::InvalidJob {
                job_id: job.id.clone(),
                message: "no download URLs".to_string(),
            }
            .into());
        }

        self.cache.reset(&job.package_name).await?;
        self.store
            .transition(job, JobTransition::StartDownload)
            .await?;

        let mut artifact_index = 0usize;
        let mut accepted = Vec::with_capacity(job.download_urls.len());
        for (position, url) in job.download_urls.clone().into_iter().enumerate() {
            let destination = match job.descriptor_for(&url) {
                Some(file) if file.kind == FileKind::AuxiliaryAsset => {
                    let name = if file.name.is_empty() {
                        format!("{}_{position}.obb", job.package_name)
                    } else {
                        file.name.clone()
                    };
                    self.cache.asset_path(&job.package_name, &name)?
                }
                _ => {
                    artifact_index += 1;
                    self.cache.artifact_path(&job.package_name, artifact_index)?
                }
            };

            let request = TransportRequest {
                url: url.clone(),
                destination,
                title: job.title().to_string(),
            };
            let id = match self.platform.transport().enqueue(request).await {
                Ok(id) => id,
                Err(e) => {
                    self.release(&accepted).await;
                    return Err(InstallError::DownloadTransportFailed {
                        package: job.package_name.clone(),
                        message: e.to_string(),
                    }
                    .into());
                }
            };

            accepted.push(id);
            job.download_ids.insert(id, false);
            self.owners.insert(id, job.id.clone());
            self.emit(AppEvent::Download(DownloadEvent::Dispatched {
                job_id: job.id.clone(),
                url,
                transport_id: id,
            }));
        }

        self.store.update(job).await?;
        info!(job_id = %job.id, downloads = accepted.len(), "downloads dispatched");
        Ok(())
    }

    async fn install_webapp(&self, job: &mut Job) -> Result<(), Error> {
        let (Some(web_url), Some(icon_url)) = (job.web_url.clone(), job.icon_url.clone()) else {
            return Err(InstallError::InvalidJob {
                job_id: job.id.clone(),
                message: "web app job needs a web URL and an icon URL".to_string(),
            }
            .into());
        };

        self.store
            .transition(job, JobTransition::StartDownload)
            .await?;
        tokio::time::sleep(self.settings.webapp_download_settle()).await;

        let icon = match self.platform.webapp().fetch_icon(&icon_url).await {
            Ok(icon) => icon,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "icon fetch failed");
                self.emit(AppEvent::Install(InstallEvent::Failed {
                    job_id: job.id.clone(),
                    package: job.title().to_string(),
                    failure: FailureContext::from_error(&e),
                }));
                self.store.transition(job, JobTransition::Fail).await?;
                return Ok(());
            }
        };

        let shortcut = Shortcut {
            id: job.id.clone(),
            name: job.title().to_string(),
            web_url,
            icon,
        };
        self.platform
            .webapp()
            .publish_shortcut(&shortcut)
            .await
            .map_err(|e| InstallError::WebAppFailed {
                job_id: job.id.clone(),
                message: e.user_message().into_owned(),
            })?;

        self.store
            .transition(job, JobTransition::StartInstall)
            .await?;
        tokio::time::sleep(self.settings.webapp_install_settle()).await;
        self.store
            .transition(job, JobTransition::CompleteInstall)
            .await?;

        self.emit(AppEvent::Install(InstallEvent::Completed {
            job_id: job.id.clone(),
            package: job.title().to_string(),
        }));
        self.store.delete(&job.id).await?;
        Ok(())
    }

    /// Record transport progress and publish the job's percentage
    pub async fn on_transport_progress(
        &self,
        id: TransportJobId,
        downloaded: u64,
        total: Option<u64>,
    ) -> Result<(), Error> {
        self.progress.record(id, downloaded, total);

        let Some(job_id) = self.owner_of(id) else {
            return Ok(());
        };
        let Some(job) = self.store.get_by_id(&job_id).await? else {
            return Ok(());
        };

        let percent = calculate_progress(&job_id, &job, &self.progress.snapshot_for(&job));
        if percent >= 0 {
            self.emit(AppEvent::Download(DownloadEvent::Progress { job_id, percent }));
        }
        Ok(())
    }

    /// Mark one transport id complete; advance to `Downloaded` once all are
    pub async fn on_transport_completed(&self, id: TransportJobId) -> Result<(), Error> {
        let _guard = self.lock.lock().await;

        let Some(job_id) = self.owners.remove(&id).map(|(_, job_id)| job_id) else {
            debug!(transport_id = id, "completion for untracked transport id");
            return Ok(());
        };
        let Some(mut job) = self.store.get_by_id(&job_id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Downloading || !job.tracks_download(id) {
            debug!(job_id = %job.id, transport_id = id, status = %job.status, "stale completion ignored");
            return Ok(());
        }

        job.download_ids.insert(id, true);
        if job.downloads_complete() {
            let ids: Vec<_> = job.download_ids.keys().copied().collect();
            self.store
                .transition(&mut job, JobTransition::CompleteDownload)
                .await?;
            self.progress.forget(ids);
            self.emit(AppEvent::Download(DownloadEvent::Completed {
                job_id: job.id.clone(),
                package: job.package_name.clone(),
            }));
        } else {
            self.store.update(&job).await?;
        }
        Ok(())
    }

    /// Fail the owning job and cancel its other downloads
    pub async fn on_transport_failed(&self, id: TransportJobId, message: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;

        let Some(job_id) = self.owners.remove(&id).map(|(_, job_id)| job_id) else {
            return Ok(());
        };
        let Some(mut job) = self.store.get_by_id(&job_id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Downloading || !job.tracks_download(id) {
            return Ok(());
        }

        let siblings: Vec<_> = job
            .pending_download_ids()
            .into_iter()
            .filter(|other| *other != id)
            .collect();
        self.release(&siblings).await;
        self.progress.forget(job.download_ids.keys().copied());

        let error = InstallError::DownloadTransportFailed {
            package: job.package_name.clone(),
            message: message.to_string(),
        };
        warn!(job_id = %job.id, transport_id = id, %message, "download failed");
        self.emit(AppEvent::Download(DownloadEvent::Failed {
            job_id: job.id.clone(),
            package: job.package_name.clone(),
            failure: FailureContext::from_error(&error),
        }));

        self.store.transition(&mut job, JobTransition::Fail).await?;
        self.cache.clear(&job.package_name).await?;
        Ok(())
    }

    /// Cancel every outstanding download of a job
    ///
    /// Reads the record under the dispatch lock so a dispatch in flight has
    /// persisted its transport ids first. Returns the record as read.
    pub async fn cancel_downloads(&self, job_id: &str) -> Result<Option<Job>, Error> {
        let _guard = self.lock.lock().await;
        let Some(job) = self.store.get_by_id(job_id).await? else {
            return Ok(None);
        };
        self.release(&job.pending_download_ids()).await;
        self.progress.forget(job.download_ids.keys().copied());
        Ok(Some(job))
    }

    /// Re-register ownership of a persisted job's transport ids
    pub fn track(&self, job: &Job) {
        for id in job.download_ids.keys() {
            self.owners.insert(*id, job.id.clone());
        }
    }

    #[must_use]
    pub fn owner_of(&self, id: TransportJobId) -> Option<String> {
        self.owners.get(&id).map(|entry| entry.value().clone())
    }

    async fn release(&self, ids: &[TransportJobId]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.owners.remove(id);
        }
        if let Err(e) = self.platform.transport().cancel(ids).await {
            warn!(error = %e, "failed to cancel transport downloads");
        }
    }
}
