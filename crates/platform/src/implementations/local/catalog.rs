//! Catalog and account backed by local data

use async_trait::async_trait;
use berth_config::AccountConfig;
use berth_errors::{CatalogError, Error};
use berth_types::Job;

use crate::catalog::{AccountSession, Catalog, ResolvedDownload};

/// Uses the URLs already carried by the job
///
/// A paid job without URLs has not been purchased yet.
pub struct PassthroughCatalog;

#[async_trait]
impl Catalog for PassthroughCatalog {
    async fn resolve(&self, job: &Job) -> Result<ResolvedDownload, Error> {
        if job.download_urls.is_empty() {
            if !job.is_free {
                return Err(CatalogError::PurchaseRequired {
                    package: job.package_name.clone(),
                }
                .into());
            }
            return Err(CatalogError::ResolutionFailed {
                package: job.package_name.clone(),
                message: "no download locations available".to_string(),
            }
            .into());
        }

        Ok(ResolvedDownload {
            download_urls: job.download_urls.clone(),
            files: job.files.clone(),
        })
    }
}

/// Account state taken from the `[account]` configuration section
pub struct ConfigAccount {
    anonymous: bool,
}

impl ConfigAccount {
    #[must_use]
    pub fn from_config(config: &AccountConfig) -> Self {
        Self {
            anonymous: config.anonymous || config.name.is_none(),
        }
    }
}

impl AccountSession for ConfigAccount {
    fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}
