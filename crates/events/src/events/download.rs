use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Download domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Transport download requested for one artifact
    Dispatched {
        job_id: String,
        url: String,
        transport_id: u64,
    },

    /// Aggregate byte progress of a job's downloads
    Progress { job_id: String, percent: i32 },

    /// All of a job's artifacts are present on disk
    Completed { job_id: String, package: String },

    /// A download could not be completed
    Failed {
        job_id: String,
        package: String,
        failure: FailureContext,
    },
}
