//! Report types returned to the CLI

use berth_types::{FaultyPackageRecord, Job, JobStatus, JobType};
use serde::{Deserialize, Serialize};

/// One job as shown by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub title: String,
    pub package_name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub version_code: i64,
    pub app_size: u64,
    /// Transport downloads still outstanding
    pub pending_downloads: usize,
}

impl From<&Job> for JobInfo {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            title: job.title().to_string(),
            package_name: job.package_name.clone(),
            job_type: job.job_type,
            status: job.status,
            version_code: job.version_code,
            app_size: job.app_size,
            pending_downloads: job.pending_download_ids().len(),
        }
    }
}

/// Download progress of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub job_id: String,
    pub total_size_bytes: u64,
    pub bytes_downloaded: u64,
}

impl ProgressReport {
    #[must_use]
    pub fn percent(&self) -> u64 {
        if self.total_size_bytes == 0 {
            return 0;
        }
        self.bytes_downloaded.min(self.total_size_bytes) * 100 / self.total_size_bytes
    }
}

/// Result of submitting a job file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
    /// Final status of every submitted job still on record after the queue drained
    pub remaining: Vec<JobInfo>,
}

/// Operation result that can be serialized for CLI output
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationResult {
    JobList(Vec<JobInfo>),
    Faults(Vec<FaultyPackageRecord>),
    Progress(ProgressReport),
    Enqueue(EnqueueReport),
    /// Generic success message
    Success(String),
}

impl OperationResult {
    /// Convert to JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, berth_errors::Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether the operation did everything it was asked to
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Enqueue(report) => report.rejected.is_empty(),
            Self::JobList(_) | Self::Faults(_) | Self::Progress(_) | Self::Success(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_is_bounded() {
        let report = ProgressReport {
            job_id: "a".into(),
            total_size_bytes: 300,
            bytes_downloaded: 150,
        };
        assert_eq!(report.percent(), 50);

        let unknown = ProgressReport {
            job_id: "a".into(),
            total_size_bytes: 1,
            bytes_downloaded: 0,
        };
        assert_eq!(unknown.percent(), 0);
    }

    #[test]
    fn enqueue_with_rejections_is_not_success() {
        let result = OperationResult::Enqueue(EnqueueReport {
            accepted: vec!["a".into()],
            rejected: vec!["b".into()],
            remaining: Vec::new(),
        });
        assert!(!result.is_success());
        assert!(result.to_json().unwrap().contains("\"type\": \"Enqueue\""));
    }
}
