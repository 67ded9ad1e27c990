//! Install service lifecycle

use std::sync::Arc;

use berth_errors::Error;
use berth_events::{AppEvent, EventEmitter, EventSender, QueueEvent};
use berth_install::{
    CacheLayout, DownloadCoordinator, FaultRecovery, InstallExecutor, StorageGuard,
};
use berth_platform::{LifecycleReceiver, TransportReceiver};
use berth_state::JobStore;
use berth_types::{FaultyPackageRecord, Job, JobStatus, JobTransition};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::context::OpsCtx;
use crate::listener::{spawn_lifecycle_listener, spawn_transport_listener};
use crate::processor::JobProcessor;
use crate::scheduler::InstallScheduler;
use crate::tracker::UpdateCompletionTracker;
use crate::work_queue::{WorkItem, WorkQueue};

/// The assembled install pipeline
///
/// Built from an [`OpsCtx`]; `start` spawns the work queue worker and the
/// platform listeners and `stop` shuts them down again.
#[derive(Debug, Clone)]
pub struct InstallService {
    ctx: OpsCtx,
    cache: CacheLayout,
    queue: WorkQueue,
    scheduler: InstallScheduler,
    coordinator: DownloadCoordinator,
    executor: InstallExecutor,
    processor: JobProcessor,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl EventEmitter for InstallService {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.ctx.tx)
    }
}

impl InstallService {
    #[must_use]
    pub fn new(ctx: OpsCtx) -> Self {
        let tx = ctx.tx.clone();
        let cache = ctx.cache();
        let pipeline = ctx.config.pipeline.clone();
        let queue = WorkQueue::new(&pipeline.work_queue_name);

        let coordinator = DownloadCoordinator::new(
            ctx.jobs.clone(),
            ctx.platform.clone(),
            cache.clone(),
            pipeline.clone(),
        )
        .with_event_sender(tx.clone());
        let recovery = FaultRecovery::new(ctx.faults.clone()).with_event_sender(tx.clone());
        let executor = InstallExecutor::new(
            ctx.jobs.clone(),
            ctx.platform.clone(),
            cache.clone(),
            recovery.clone(),
        )
        .with_event_sender(tx.clone());
        let tracker = UpdateCompletionTracker::new(ctx.jobs.clone(), ctx.platform.clone())
            .with_event_sender(tx.clone());
        let processor = JobProcessor::new(
            ctx.jobs.clone(),
            ctx.platform.clone(),
            cache.clone(),
            coordinator.clone(),
            executor.clone(),
            tracker,
        );
        let scheduler = InstallScheduler::new(
            ctx.jobs.clone(),
            ctx.platform.clone(),
            queue.clone(),
            StorageGuard::new(pipeline.storage_headroom_bytes),
            recovery,
            cache.root().to_path_buf(),
        )
        .with_event_sender(tx);

        Self {
            ctx,
            cache,
            queue,
            scheduler,
            coordinator,
            executor,
            processor,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn context(&self) -> &OpsCtx {
        &self.ctx
    }

    #[must_use]
    pub fn jobs(&self) -> &JobStore {
        &self.ctx.jobs
    }

    #[must_use]
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Spawn the worker and listeners, then resume persisted jobs
    ///
    /// Returns how many jobs were resubmitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted jobs cannot be read.
    pub async fn start(
        &self,
        transport_rx: TransportReceiver,
        lifecycle_rx: LifecycleReceiver,
    ) -> Result<usize, Error> {
        let processor = self.processor.clone();
        let worker = self.queue.spawn_worker(move |item: WorkItem| {
            let processor = processor.clone();
            async move { processor.process(&item.job_id, item.is_update).await }
        });

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(worker);
            tasks.push(spawn_transport_listener(
                self.coordinator.clone(),
                transport_rx,
            ));
            tasks.push(spawn_lifecycle_listener(self.executor.clone(), lifecycle_rx));
        }
        info!(queue = self.queue.name(), "install service started");

        self.resume().await
    }

    /// Stop the worker and listeners; persisted jobs are resumed by the next
    /// `start`
    pub async fn stop(&self) {
        self.queue.stop();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        info!(queue = self.queue.name(), "install service stopped");
    }

    /// Resubmit every persisted job that still has work ahead of it
    async fn resume(&self) -> Result<usize, Error> {
        let mut resumed = 0;
        for mut job in self.ctx.jobs.active().await? {
            match job.status {
                JobStatus::Queued => {
                    self.ctx
                        .jobs
                        .transition(&mut job, JobTransition::Await)
                        .await?;
                }
                JobStatus::Downloading => {
                    if !self.downloads_still_pending(&job).await {
                        warn!(job_id = %job.id, "downloads lost across restart");
                        self.ctx
                            .jobs
                            .transition(&mut job, JobTransition::Fail)
                            .await?;
                        continue;
                    }
                    self.coordinator.track(&job);
                }
                _ => {}
            }

            self.queue
                .submit(WorkItem {
                    job_id: job.id.clone(),
                    is_update: false,
                })
                .await?;
            resumed += 1;
        }
        if resumed > 0 {
            info!(resumed, "resumed persisted jobs");
        }
        Ok(resumed)
    }

    async fn downloads_still_pending(&self, job: &Job) -> bool {
        for id in job.pending_download_ids() {
            if !self.ctx.platform.transport().is_pending(id).await {
                return false;
            }
        }
        true
    }

    /// Admit one job; see [`InstallScheduler::enqueue`]
    pub async fn enqueue(&self, job: Job) -> bool {
        self.scheduler.enqueue(job, false).await
    }

    /// Admit one job as a member of the current update batch
    pub async fn enqueue_update(&self, job: Job) -> bool {
        self.scheduler.enqueue(job, true).await
    }

    /// Admit every candidate as part of one update batch
    ///
    /// Returns how many were submitted.
    pub async fn update_all(&self, jobs: Vec<Job>) -> usize {
        let mut accepted = 0;
        for job in jobs {
            if self.enqueue_update(job).await {
                accepted += 1;
            }
        }
        accepted
    }

    /// Cancel a job
    ///
    /// Outstanding downloads are cancelled and cached artifacts flushed. The
    /// record is deleted unless it is `InstallationIssue`, which stays
    /// visible. Returns `false` for an unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or deleted or the cache
    /// cannot be flushed.
    pub async fn cancel(&self, job_id: &str) -> Result<bool, Error> {
        self.queue.remove(job_id).await;
        let Some(job) = self.coordinator.cancel_downloads(job_id).await? else {
            return Ok(false);
        };

        if job.status != JobStatus::InstallationIssue {
            self.ctx.jobs.delete(job_id).await?;
        }
        if !job.package_name.is_empty() {
            self.cache.clear(&job.package_name).await?;
        }

        info!(job_id, status = %job.status, "job cancelled");
        self.emit(AppEvent::Queue(QueueEvent::Cancelled {
            job_id: job_id.to_string(),
        }));
        Ok(true)
    }

    /// `(total_size_bytes, bytes_downloaded)` for a job, `(1, 0)` if unknown
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub async fn progress(&self, job_id: &str) -> Result<(u64, u64), Error> {
        let job = self.ctx.jobs.get_by_id(job_id).await?;
        Ok(self.coordinator.progress().query(job.as_ref()))
    }

    /// Packages whose last install hit a signature or version conflict
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    pub async fn faults(&self) -> Result<Vec<FaultyPackageRecord>, Error> {
        self.executor.recovery().list().await
    }

    /// Wait until the work queue has drained
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }
}
