#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

//! Durable job records for berth
//!
//! This crate owns the `SQLite` database holding install jobs and faulty
//! package records, and the live per-job observation channels the job
//! processor watches.

pub mod faults;
pub mod jobs;
mod rows;

pub use faults::FaultStore;
pub use jobs::JobStore;

use berth_errors::Error;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

/// Create a new `SQLite` connection pool
///
/// # Errors
///
/// Returns an error if the database connection fails or configuration is invalid.
pub async fn create_pool(db_path: &Path) -> Result<Pool<Sqlite>, Error> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| {
            Error::from(berth_errors::StateError::DatabaseError {
                message: e.to_string(),
            })
        })?;

    if let Ok(mut conn) = pool.acquire().await {
        let _ = sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&mut *conn)
            .await;
        let _ = sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&mut *conn)
            .await;
    }

    Ok(pool)
}

/// Run database migrations
///
/// # Errors
///
/// Returns an error if any migration fails to execute.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        berth_errors::StateError::MigrationFailed {
            message: e.to_string(),
        }
        .into()
    })
}

/// Open the database at `db_path`, migrate it, and build both stores
///
/// # Errors
///
/// Returns an error if the pool cannot be created or migrations fail.
pub async fn open(db_path: &Path) -> Result<(JobStore, FaultStore), Error> {
    let pool = create_pool(db_path).await?;
    run_migrations(&pool).await?;
    Ok((JobStore::new(pool.clone()), FaultStore::new(pool)))
}
