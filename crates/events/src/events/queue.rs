use berth_types::{JobStatus, JobType};
use serde::{Deserialize, Serialize};

/// Job queue events: admission, status transitions and removal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Job admitted and submitted to the work queue
    JobQueued {
        job_id: String,
        package: String,
        job_type: JobType,
    },

    /// Job record moved between statuses
    StatusChanged {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Job removed by a caller before it finished
    Cancelled { job_id: String },

    /// Job reached a terminal status
    Finished { job_id: String, status: JobStatus },
}
