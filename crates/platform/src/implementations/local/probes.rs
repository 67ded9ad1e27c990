//! Network and storage probes

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use berth_errors::{Error, StorageError};
use sysinfo::Disks;
use tokio::net::TcpStream;

use crate::probe::{NetworkMonitor, StorageProbe};

/// Reachable when a TCP connection to `address` opens within `timeout`
pub struct TcpReachability {
    address: String,
    timeout: Duration,
}

impl TcpReachability {
    #[must_use]
    pub fn new(address: String, timeout: Duration) -> Self {
        Self { address, timeout }
    }
}

#[async_trait]
impl NetworkMonitor for TcpReachability {
    async fn is_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await,
            Ok(Ok(_))
        )
    }
}

/// Free space of the mounted volume with the longest prefix of the path
pub struct SysinfoStorageProbe;

/// Closest ancestor of `path` that exists, canonicalized
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find_map(|candidate| std::fs::canonicalize(candidate).ok())
}

#[async_trait]
impl StorageProbe for SysinfoStorageProbe {
    async fn available_bytes(&self, path: &Path) -> Result<u64, Error> {
        let path = path.to_path_buf();
        let probe_path = path.clone();

        let available = tokio::task::spawn_blocking(move || {
            let target = existing_ancestor(&probe_path)?;
            let disks = Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .filter(|disk| target.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .map(sysinfo::Disk::available_space)
        })
        .await
        .map_err(|e| Error::internal(format!("storage probe task failed: {e}")))?;

        available.ok_or_else(|| {
            StorageError::ProbeFailed {
                path: path.display().to_string(),
                message: "no mounted volume holds this path".to_string(),
            }
            .into()
        })
    }
}
