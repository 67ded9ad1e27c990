//! Catalog and account collaborators

use async_trait::async_trait;
use berth_errors::Error;
use berth_types::{FileDescriptor, Job};

/// Concrete download locations for a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub download_urls: Vec<String>,
    pub files: Vec<FileDescriptor>,
}

/// Resolves catalog metadata into download URLs
#[async_trait]
pub trait Catalog: Send + Sync {
    /// # Errors
    ///
    /// `CatalogError::PurchaseRequired` when the package must be bought first,
    /// any other error when resolution failed.
    async fn resolve(&self, job: &Job) -> Result<ResolvedDownload, Error>;
}

/// Current user session
pub trait AccountSession: Send + Sync {
    fn is_anonymous(&self) -> bool;
}
