//! Named work queue that drains one job at a time
//!
//! Submissions are keyed by job id. A second submission for an id that is
//! still waiting replaces the waiting entry in place; one for the id that is
//! currently running is appended and runs after it. The same id never runs
//! twice concurrently.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use berth_errors::{Error, OpsError};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One unit of work: process `job_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub job_id: String,
    /// Part of an update-all batch
    pub is_update: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<WorkItem>,
    running: Option<String>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.running.is_none() && self.waiting.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WorkQueue {
    name: Arc<str>,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    idle: Arc<watch::Sender<bool>>,
}

impl WorkQueue {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            idle: Arc::new(watch::channel(true).0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// Returns `OpsError::QueueStopped` after [`WorkQueue::stop`].
    pub async fn submit(&self, item: WorkItem) -> Result<(), Error> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(OpsError::QueueStopped {
                queue: self.name.to_string(),
            }
            .into());
        }

        let mut state = self.state.lock().await;
        if let Some(waiting) = state
            .waiting
            .iter_mut()
            .find(|waiting| waiting.job_id == item.job_id)
        {
            debug!(queue = %self.name, job_id = %item.job_id, "replacing waiting work item");
            *waiting = item;
        } else {
            debug!(queue = %self.name, job_id = %item.job_id, "work item appended");
            state.waiting.push_back(item);
        }
        self.idle.send_replace(false);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    /// Whether `job_id` is running or waiting to run
    pub async fn is_live(&self, job_id: &str) -> bool {
        let state = self.state.lock().await;
        state.running.as_deref() == Some(job_id)
            || state.waiting.iter().any(|item| item.job_id == job_id)
    }

    /// Drop a waiting entry; a running one is left alone
    pub async fn remove(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.waiting.len();
        state.waiting.retain(|item| item.job_id != job_id);
        let removed = state.waiting.len() != before;
        self.idle.send_replace(state.is_idle());
        removed
    }

    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.waiting.len() + usize::from(state.running.is_some())
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_idle()
    }

    /// Wait until nothing is running or waiting
    pub async fn wait_idle(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Next item to run, or `None` once stopped
    async fn next(&self) -> Option<WorkItem> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }
            {
                let mut state = self.state.lock().await;
                if let Some(item) = state.waiting.pop_front() {
                    state.running = Some(item.job_id.clone());
                    return Some(item);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn finish(&self) {
        let mut state = self.state.lock().await;
        state.running = None;
        self.idle.send_replace(state.is_idle());
    }

    /// Run `handler` for every item, one at a time, until stopped
    pub fn spawn_worker<F, Fut>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let queue = self.clone();
        self.stopped.store(false, Ordering::SeqCst);
        tokio::spawn(async move {
            info!(queue = %queue.name, "work queue started");
            while let Some(item) = queue.next().await {
                handler(item).await;
                queue.finish().await;
            }
            info!(queue = %queue.name, "work queue stopped");
        })
    }

    /// Stop handing out work; waiting items stay queued
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}
