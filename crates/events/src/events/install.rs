use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Installation domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallEvent {
    /// Platform installer session opened for a package
    SessionOpened {
        job_id: String,
        package: String,
        files: usize,
    },

    /// Session committed; the platform reports the outcome asynchronously
    SessionCommitted { job_id: String, package: String },

    /// Package installed (or web shortcut published)
    Completed { job_id: String, package: String },

    /// Installation failed
    Failed {
        job_id: String,
        package: String,
        failure: FailureContext,
    },
}
