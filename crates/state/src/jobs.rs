//! Job record store
//!
//! Single source of truth for install jobs. Readers may subscribe to a job
//! id and receive every persisted value, then `None` once it is deleted.

use std::sync::Arc;

use berth_errors::{Error, StateError};
use berth_events::{AppEvent, EventEmitter, EventSender, QueueEvent};
use berth_types::{Job, JobStatus, JobTransition};
use dashmap::DashMap;
use sqlx::{query, Pool, Sqlite};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::rows::{job_from_row, EncodedCollections};

const SELECT_JOB: &str = "SELECT id, origin, package_name, display_name, job_type, status, \
     download_urls, files, download_ids, version_code, is_free, app_size, signature, \
     content_rating_id, content_rating_title, icon_url, web_url FROM jobs";

/// Durable keyed storage of install jobs
#[derive(Clone)]
pub struct JobStore {
    pool: Pool<Sqlite>,
    observers: Arc<DashMap<String, watch::Sender<Option<Job>>>>,
    tx: Option<EventSender>,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl EventEmitter for JobStore {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl JobStore {
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            observers: Arc::new(DashMap::new()),
            tx: None,
        }
    }

    /// Publish status transitions on `tx`
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Insert a job, replacing any existing record with the same id
    pub async fn add(&self, job: &Job) -> Result<(), Error> {
        let encoded = EncodedCollections::encode(job)?;
        let now = chrono::Utc::now().timestamp();

        query(
            "INSERT INTO jobs (id, origin, package_name, display_name, job_type, status, \
             download_urls, files, download_ids, version_code, is_free, app_size, signature, \
             content_rating_id, content_rating_title, icon_url, web_url, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18) \
             ON CONFLICT(id) DO UPDATE SET origin = excluded.origin, \
             package_name = excluded.package_name, display_name = excluded.display_name, \
             job_type = excluded.job_type, status = excluded.status, \
             download_urls = excluded.download_urls, files = excluded.files, \
             download_ids = excluded.download_ids, version_code = excluded.version_code, \
             is_free = excluded.is_free, app_size = excluded.app_size, \
             signature = excluded.signature, content_rating_id = excluded.content_rating_id, \
             content_rating_title = excluded.content_rating_title, \
             icon_url = excluded.icon_url, web_url = excluded.web_url, \
             updated_at = excluded.updated_at",
        )
        .bind(&job.id)
        .bind(job.origin.as_str())
        .bind(&job.package_name)
        .bind(&job.display_name)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(encoded.download_urls)
        .bind(encoded.files)
        .bind(encoded.download_ids)
        .bind(job.version_code)
        .bind(job.is_free)
        .bind(i64::try_from(job.app_size).unwrap_or(i64::MAX))
        .bind(&job.signature)
        .bind(&job.content_rating_id)
        .bind(&job.content_rating_title)
        .bind(&job.icon_url)
        .bind(&job.web_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.id, status = %job.status, "job stored");
        self.publish(job);
        Ok(())
    }

    /// Persist every field of an existing job
    ///
    /// # Errors
    ///
    /// Returns `StateError::JobNotFound` if no record with the job's id exists.
    pub async fn update(&self, job: &Job) -> Result<(), Error> {
        let encoded = EncodedCollections::encode(job)?;
        let now = chrono::Utc::now().timestamp();

        let result = query(
            "UPDATE jobs SET origin = ?2, package_name = ?3, display_name = ?4, job_type = ?5, \
             status = ?6, download_urls = ?7, files = ?8, download_ids = ?9, version_code = ?10, \
             is_free = ?11, app_size = ?12, signature = ?13, content_rating_id = ?14, \
             content_rating_title = ?15, icon_url = ?16, web_url = ?17, updated_at = ?18 \
             WHERE id = ?1",
        )
        .bind(&job.id)
        .bind(job.origin.as_str())
        .bind(&job.package_name)
        .bind(&job.display_name)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(encoded.download_urls)
        .bind(encoded.files)
        .bind(encoded.download_ids)
        .bind(job.version_code)
        .bind(job.is_free)
        .bind(i64::try_from(job.app_size).unwrap_or(i64::MAX))
        .bind(&job.signature)
        .bind(&job.content_rating_id)
        .bind(&job.content_rating_title)
        .bind(&job.icon_url)
        .bind(&job.web_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StateError::JobNotFound { id: job.id.clone() }.into());
        }

        self.publish(job);
        Ok(())
    }

    /// Delete a job. Returns whether a record was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, Error> {
        let result = query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            debug!(job_id = %id, "job deleted");
        }
        // Watchers see the deletion; the id starts fresh if observed again
        if let Some((_, sender)) = self.observers.remove(id) {
            sender.send_replace(None);
        }
        Ok(removed)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Job>, Error> {
        let sql = format!("{SELECT_JOB} WHERE id = ?1");
        let row = query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// All jobs in insertion order
    pub async fn get_all(&self) -> Result<Vec<Job>, Error> {
        let sql = format!("{SELECT_JOB} ORDER BY created_at, rowid");
        let rows = query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Jobs for one OS package name, in insertion order
    pub async fn get_by_package(&self, package_name: &str) -> Result<Vec<Job>, Error> {
        let sql = format!("{SELECT_JOB} WHERE package_name = ?1 ORDER BY created_at, rowid");
        let rows = query(&sql)
            .bind(package_name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Live view of one job id
    ///
    /// The receiver starts at the currently persisted value and sees every
    /// later `add`, `update` and `delete` for that id.
    pub async fn observe(&self, id: &str) -> Result<watch::Receiver<Option<Job>>, Error> {
        let current = self.get_by_id(id).await?;
        let receiver = self
            .observers
            .entry(id.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe();

        // A write may have landed between the read and the registration
        let fresh = self.get_by_id(id).await?;
        if let Some(sender) = self.observers.get(id) {
            sender.send_if_modified(|value| {
                if *value == fresh {
                    false
                } else {
                    *value = fresh;
                    true
                }
            });
        }
        Ok(receiver)
    }

    /// Apply `transition` to the job's status and persist the result
    ///
    /// Leaving `Downloading` clears the transport id map so it is only
    /// populated while downloads are outstanding.
    ///
    /// # Errors
    ///
    /// Returns `StateError::InvalidTransition` when the status graph rejects
    /// the transition; the job is left untouched in that case.
    pub async fn transition(
        &self,
        job: &mut Job,
        transition: JobTransition,
    ) -> Result<JobStatus, Error> {
        let from = job.status;
        let to = from.apply(transition)?;

        job.status = to;
        if to != JobStatus::Downloading {
            job.download_ids.clear();
        }
        self.update(job).await?;

        if from != to {
            info!(job_id = %job.id, %from, %to, "job status changed");
            self.emit_status_changed(job.id.clone(), from, to);
            if to.is_terminal() {
                self.emit(AppEvent::Queue(QueueEvent::Finished {
                    job_id: job.id.clone(),
                    status: to,
                }));
            }
        }
        Ok(to)
    }

    /// Jobs that have not reached a terminal status
    pub async fn active(&self) -> Result<Vec<Job>, Error> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|job| job.status.is_active())
            .collect())
    }

    /// Number of job ids with a live watch channel
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn publish(&self, job: &Job) {
        if let Some(sender) = self.observers.get(&job.id) {
            sender.send_replace(Some(job.clone()));
        }
        self.observers
            .remove_if(&job.id, |_, sender| sender.receiver_count() == 0);
    }
}
