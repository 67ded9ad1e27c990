//! Download progress aggregation
//!
//! The transport reports bytes per transport id. A job's progress is the
//! sum over exactly the ids in its `download_ids`.

use std::collections::HashMap;
use std::sync::Arc;

use berth_types::{Job, TransportJobId};
use dashmap::DashMap;

/// Size and received bytes for a set of transport ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_size_bytes: HashMap<TransportJobId, u64>,
    pub bytes_downloaded: HashMap<TransportJobId, u64>,
}

/// Percentage for a job: `-1` when `event_job_id` is not the job's id, `0`
/// while any of its downloads has no known size yet
#[must_use]
pub fn calculate_progress(event_job_id: &str, job: &Job, snapshot: &ProgressSnapshot) -> i32 {
    if event_job_id != job.id {
        return -1;
    }

    let mut total: u128 = 0;
    let mut downloaded: u128 = 0;
    for id in job.download_ids.keys() {
        let Some(size) = snapshot.total_size_bytes.get(id) else {
            return 0;
        };
        total += u128::from(*size);
        downloaded += u128::from(snapshot.bytes_downloaded.get(id).copied().unwrap_or(0));
    }

    if total == 0 {
        return 0;
    }
    i32::try_from((downloaded.min(total) * 100) / total).unwrap_or(100)
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    total: Option<u64>,
    downloaded: u64,
}

/// Latest transport progress per id
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    entries: Arc<DashMap<TransportJobId, Entry>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: TransportJobId, downloaded: u64, total: Option<u64>) {
        let mut entry = self.entries.entry(id).or_default();
        entry.downloaded = downloaded;
        if total.is_some() {
            entry.total = total;
        }
    }

    pub fn forget(&self, ids: impl IntoIterator<Item = TransportJobId>) {
        for id in ids {
            self.entries.remove(&id);
        }
    }

    /// Progress restricted to the job's transport ids
    #[must_use]
    pub fn snapshot_for(&self, job: &Job) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot::default();
        for id in job.download_ids.keys() {
            if let Some(entry) = self.entries.get(id) {
                if let Some(total) = entry.total {
                    snapshot.total_size_bytes.insert(*id, total);
                }
                snapshot.bytes_downloaded.insert(*id, entry.downloaded);
            }
        }
        snapshot
    }

    /// `(total_size_bytes, bytes_downloaded)` for a job
    ///
    /// Returns `(1, 0)` for an unknown job or one with no known sizes so
    /// callers can always divide.
    #[must_use]
    pub fn query(&self, job: Option<&Job>) -> (u64, u64) {
        let Some(job) = job else {
            return (1, 0);
        };
        let snapshot = self.snapshot_for(job);
        let total: u64 = snapshot.total_size_bytes.values().sum();
        let downloaded: u64 = snapshot.bytes_downloaded.values().sum();
        if total == 0 {
            (1, 0)
        } else {
            (total, downloaded)
        }
    }
}
