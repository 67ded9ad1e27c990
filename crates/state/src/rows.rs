//! Row <-> `Job` mapping

use berth_errors::{Error, InstallError, StateError};
use berth_types::{Job, JobStatus, JobType, Origin};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn corrupted(id: &str, message: impl Into<String>) -> Error {
    StateError::CorruptedRecord {
        id: id.to_string(),
        message: message.into(),
    }
    .into()
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    id: &str,
    column: &str,
) -> Result<T, Error> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| corrupted(id, format!("{column}: {e}")))
}

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<Job, Error> {
    let id: String = row.try_get("id")?;

    let origin: String = row.try_get("origin")?;
    let origin =
        Origin::parse(&origin).ok_or_else(|| corrupted(&id, format!("unknown origin `{origin}`")))?;

    let job_type: String = row.try_get("job_type")?;
    let job_type = JobType::parse(&job_type).ok_or_else(|| InstallError::UnsupportedJobType {
        job_id: id.clone(),
        job_type: job_type.clone(),
    })?;

    let status: String = row.try_get("status")?;
    let status: JobStatus = status
        .parse()
        .map_err(|_| corrupted(&id, format!("unknown status `{status}`")))?;

    let app_size: i64 = row.try_get("app_size")?;

    Ok(Job {
        origin,
        package_name: row.try_get("package_name")?,
        display_name: row.try_get("display_name")?,
        job_type,
        status,
        download_urls: json_column(row, &id, "download_urls")?,
        files: json_column(row, &id, "files")?,
        download_ids: json_column(row, &id, "download_ids")?,
        version_code: row.try_get("version_code")?,
        is_free: row.try_get("is_free")?,
        app_size: u64::try_from(app_size).unwrap_or(0),
        signature: row.try_get("signature")?,
        content_rating_id: row.try_get("content_rating_id")?,
        content_rating_title: row.try_get("content_rating_title")?,
        icon_url: row.try_get("icon_url")?,
        web_url: row.try_get("web_url")?,
        id,
    })
}

/// JSON-encoded collection columns of a job
pub(crate) struct EncodedCollections {
    pub download_urls: String,
    pub files: String,
    pub download_ids: String,
}

impl EncodedCollections {
    pub(crate) fn encode(job: &Job) -> Result<Self, Error> {
        Ok(Self {
            download_urls: serde_json::to_string(&job.download_urls)?,
            files: serde_json::to_string(&job.files)?,
            download_ids: serde_json::to_string(&job.download_ids)?,
        })
    }
}
