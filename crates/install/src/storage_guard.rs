//! Free-space admission check

use std::path::Path;

use berth_errors::{Error, StorageError};
use berth_platform::StorageProbe;
use tracing::debug;

/// Requires a package's size plus a best-effort headroom to be free
#[derive(Debug, Clone, Copy)]
pub struct StorageGuard {
    headroom: u64,
}

impl StorageGuard {
    #[must_use]
    pub fn new(headroom: u64) -> Self {
        Self { headroom }
    }

    /// Bytes that would have to be freed; zero or negative means enough space
    #[must_use]
    pub fn space_missing(&self, app_size: u64, available: u64) -> i64 {
        let required = i128::from(app_size) + i128::from(self.headroom);
        let missing = required - i128::from(available);
        i64::try_from(missing).unwrap_or(if missing > 0 { i64::MAX } else { i64::MIN })
    }

    /// # Errors
    ///
    /// Returns `StorageError::InsufficientSpace` with the missing byte count,
    /// or the probe's error if free space cannot be read.
    pub async fn check(
        &self,
        probe: &dyn StorageProbe,
        path: &Path,
        app_size: u64,
    ) -> Result<(), Error> {
        let available = probe.available_bytes(path).await?;
        let missing = self.space_missing(app_size, available);
        debug!(app_size, available, missing, "storage check");

        if missing > 0 {
            return Err(StorageError::InsufficientSpace {
                missing: u64::try_from(missing).unwrap_or(u64::MAX),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_space_includes_headroom() {
        let guard = StorageGuard::new(500_000_000);
        assert_eq!(
            guard.space_missing(700_000_000, 1_000_000_000),
            200_000_000
        );
        assert!(guard.space_missing(100, 2_000_000_000) < 0);
        assert_eq!(guard.space_missing(0, 500_000_000), 0);
    }

    #[test]
    fn extreme_values_saturate() {
        let guard = StorageGuard::new(u64::MAX);
        assert_eq!(guard.space_missing(u64::MAX, 0), i64::MAX);
        assert_eq!(StorageGuard::new(0).space_missing(0, u64::MAX), i64::MIN);
    }
}
