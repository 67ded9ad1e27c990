//! Environment probes consulted at admission time

use async_trait::async_trait;
use berth_errors::Error;
use std::path::Path;

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

#[async_trait]
pub trait StorageProbe: Send + Sync {
    /// Free bytes on the volume holding `path`
    async fn available_bytes(&self, path: &Path) -> Result<u64, Error>;
}
