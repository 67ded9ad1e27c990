//! TOML job files
//!
//! ```toml
//! [[jobs]]
//! id = "org.example.app-42"
//! package_name = "org.example.app"
//! download_urls = ["https://cdn.example/org.example.app/base.apk"]
//! version_code = 42
//! ```

use std::collections::HashSet;
use std::path::Path;

use berth_errors::{Error, OpsError};
use berth_types::{Job, JobStatus};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JobFile {
    #[serde(default)]
    jobs: Vec<Job>,
}

/// Parse a job file's contents; `origin` names the file in errors
///
/// Every job starts `Queued` with no transport ids regardless of what the
/// file says.
///
/// # Errors
///
/// Returns `OpsError::InvalidJobFile` for malformed TOML, a job without an
/// id, or a duplicated id.
pub fn parse_jobs(contents: &str, origin: &str) -> Result<Vec<Job>, Error> {
    let invalid = |message: String| -> Error {
        OpsError::InvalidJobFile {
            path: origin.to_string(),
            message,
        }
        .into()
    };

    let file: JobFile = toml::from_str(contents).map_err(|e| invalid(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(file.jobs.len());
    for mut job in file.jobs {
        if job.id.is_empty() {
            return Err(invalid("every job needs an id".to_string()));
        }
        if !seen.insert(job.id.clone()) {
            return Err(invalid(format!("duplicate job id {}", job.id)));
        }
        job.status = JobStatus::Queued;
        job.download_ids.clear();
        jobs.push(job);
    }
    Ok(jobs)
}

/// Read and parse a job file
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, otherwise see
/// [`parse_jobs`].
pub async fn load_job_file(path: &Path) -> Result<Vec<Job>, Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    parse_jobs(&contents, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_types::{FileKind, JobType};

    #[test]
    fn parses_native_and_webapp_jobs() {
        let jobs = parse_jobs(
            r#"
            [[jobs]]
            id = "a"
            package_name = "org.a"
            download_urls = ["https://cdn.example/a/base", "https://cdn.example/a/obb"]
            version_code = 3
            is_free = false
            status = "installed"

            [[jobs.files]]
            url = "https://cdn.example/a/obb"
            kind = "auxiliary_asset"
            name = "main.obb"

            [[jobs]]
            id = "w"
            type = "webapp"
            display_name = "Example"
            web_url = "https://app.example"
            icon_url = "https://app.example/icon.png"
            "#,
            "jobs.toml",
        )
        .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].status, JobStatus::Queued);
        assert!(!jobs[0].is_free);
        assert_eq!(jobs[0].files[0].kind, FileKind::AuxiliaryAsset);
        assert_eq!(jobs[1].job_type, JobType::WebApp);
        assert!(jobs[1].is_free);
    }

    #[test]
    fn rejects_duplicates_and_missing_ids() {
        let duplicate = "[[jobs]]\nid = \"a\"\n[[jobs]]\nid = \"a\"\n";
        let err = parse_jobs(duplicate, "jobs.toml").unwrap_err();
        assert!(err.to_string().contains("duplicate job id a"));

        assert!(parse_jobs("[[jobs]]\npackage_name = \"x\"\n", "jobs.toml").is_err());
        assert!(parse_jobs("jobs = 3", "jobs.toml").is_err());
        assert!(parse_jobs("", "jobs.toml").unwrap().is_empty());
    }
}
