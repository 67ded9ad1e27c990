//! Faulty package records

use berth_errors::{Error, StateError};
use berth_types::{FaultReason, FaultyPackageRecord};
use chrono::DateTime;
use sqlx::{query, Pool, Row, Sqlite};

/// Packages whose last install failed on a signature or version conflict
#[derive(Debug, Clone)]
pub struct FaultStore {
    pool: Pool<Sqlite>,
}

impl FaultStore {
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Record a fault, replacing any earlier one for the same package
    pub async fn record(&self, record: &FaultyPackageRecord) -> Result<(), Error> {
        query(
            "INSERT OR REPLACE INTO faulty_packages (package_name, reason, recorded_at) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(&record.package_name)
        .bind(record.reason.as_str())
        .bind(record.recorded_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove the fault for a package. Returns whether one existed.
    pub async fn clear(&self, package_name: &str) -> Result<bool, Error> {
        let result = query("DELETE FROM faulty_packages WHERE package_name = ?1")
            .bind(package_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, package_name: &str) -> Result<Option<FaultyPackageRecord>, Error> {
        let row = query(
            "SELECT package_name, reason, recorded_at FROM faulty_packages WHERE package_name = ?1",
        )
        .bind(package_name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<FaultyPackageRecord>, Error> {
        let rows = query(
            "SELECT package_name, reason, recorded_at FROM faulty_packages ORDER BY recorded_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FaultyPackageRecord, Error> {
    let package_name: String = row.try_get("package_name")?;
    let reason: String = row.try_get("reason")?;
    let recorded_at: i64 = row.try_get("recorded_at")?;

    let reason = FaultReason::parse(&reason).ok_or_else(|| StateError::CorruptedRecord {
        id: package_name.clone(),
        message: format!("unknown fault reason `{reason}`"),
    })?;

    Ok(FaultyPackageRecord {
        recorded_at: DateTime::from_timestamp(recorded_at, 0).unwrap_or_default(),
        package_name,
        reason,
    })
}
