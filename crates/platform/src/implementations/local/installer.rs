//! Directory-backed package installer
//!
//! Each package lives under `<root>/<package>/` with its artifacts in
//! `files/` and a `receipt.json` describing the installed version. Sessions
//! stage into `<root>/.staging/<uuid>/` and are swapped in on commit.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use berth_errors::{Error, PlatformError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::installer::{
    InstallSession, InstallStatus, LifecycleSender, PackageInstaller, PackageLifecycleEvent,
    PackageQuery, SessionParams, UPDATE_INCOMPATIBLE, VERSION_DOWNGRADE,
};

const RECEIPT_FILE: &str = "receipt.json";
const FILES_DIR: &str = "files";
const STAGING_DIR: &str = ".staging";

/// What is recorded about an installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub package: String,
    pub version_code: i64,
    pub signature: String,
    pub installer_of_record: String,
    pub files: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

pub struct DirectoryInstaller {
    root: PathBuf,
    tx: LifecycleSender,
}

impl DirectoryInstaller {
    #[must_use]
    pub fn new(root: PathBuf, tx: LifecycleSender) -> Self {
        Self { root, tx }
    }

    fn package_dir(&self, package: &str) -> PathBuf {
        self.root.join(package)
    }

    /// Read the receipt of an installed package
    pub async fn receipt(&self, package: &str) -> Result<Option<InstallReceipt>, Error> {
        read_receipt(&self.package_dir(package)).await
    }

    /// Uninstall a package and broadcast its removal
    ///
    /// Returns whether the package was installed.
    pub async fn remove(&self, package: &str) -> Result<bool, Error> {
        validate_package_name(package)?;
        let dir = self.package_dir(package);
        if !dir.exists() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
        info!(package, "package removed");
        let _ = self.tx.send(PackageLifecycleEvent::Removed {
            package: package.to_string(),
        });
        Ok(true)
    }
}

fn validate_package_name(package: &str) -> Result<(), Error> {
    if package.is_empty()
        || package.starts_with('.')
        || package.contains(['/', '\\'])
        || package.contains("..")
    {
        return Err(PlatformError::SessionError {
            message: format!("invalid package name `{package}`"),
        }
        .into());
    }
    Ok(())
}

async fn read_receipt(package_dir: &Path) -> Result<Option<InstallReceipt>, Error> {
    let path = package_dir.join(RECEIPT_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_with_path(&e, &path)),
    }
}

#[async_trait]
impl PackageInstaller for DirectoryInstaller {
    async fn open_session(&self, params: SessionParams) -> Result<Box<dyn InstallSession>, Error> {
        validate_package_name(&params.package_name)?;

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| Error::io_with_path(&e, &staging))?;

        debug!(package = %params.package_name, staging = %staging.display(), "install session opened");
        Ok(Box::new(DirectorySession {
            package_dir: self.package_dir(&params.package_name),
            staging,
            params,
            written: Vec::new(),
            tx: self.tx.clone(),
        }))
    }
}

#[async_trait]
impl PackageQuery for DirectoryInstaller {
    async fn installed_version(&self, package: &str) -> Result<Option<i64>, Error> {
        if validate_package_name(package).is_err() {
            return Ok(None);
        }
        Ok(self.receipt(package).await?.map(|r| r.version_code))
    }
}

struct DirectorySession {
    package_dir: PathBuf,
    staging: PathBuf,
    params: SessionParams,
    written: Vec<String>,
    tx: LifecycleSender,
}

/// Rejected commit: status plus the installer's message
struct Rejection(InstallStatus, String);

impl DirectorySession {
    async fn check_compatibility(&self) -> Result<(), Rejection> {
        let existing = read_receipt(&self.package_dir)
            .await
            .map_err(|e| Rejection(InstallStatus::Failure, e.to_string()))?;

        if let Some(existing) = existing {
            if !existing.signature.is_empty()
                && !self.params.signature.is_empty()
                && existing.signature != self.params.signature
            {
                return Err(Rejection(
                    InstallStatus::Incompatible,
                    format!(
                        "{UPDATE_INCOMPATIBLE}: signatures do not match the installed {}",
                        self.params.package_name
                    ),
                ));
            }
            if self.params.version_code < existing.version_code {
                return Err(Rejection(
                    InstallStatus::Incompatible,
                    format!(
                        "{VERSION_DOWNGRADE}: installed version {} is newer than {}",
                        existing.version_code, self.params.version_code
                    ),
                ));
            }
        }

        if self.written.is_empty() {
            return Err(Rejection(
                InstallStatus::Invalid,
                "INSTALL_FAILED_INVALID_APK: session contains no files".to_string(),
            ));
        }
        Ok(())
    }

    async fn apply(&self) -> Result<(), Rejection> {
        self.check_compatibility().await?;

        let io_failure = |e: std::io::Error| Rejection(InstallStatus::Failure, e.to_string());
        let files_dir = self.package_dir.join(FILES_DIR);

        tokio::fs::create_dir_all(&self.package_dir)
            .await
            .map_err(io_failure)?;
        if files_dir.exists() {
            tokio::fs::remove_dir_all(&files_dir)
                .await
                .map_err(io_failure)?;
        }
        tokio::fs::rename(&self.staging, &files_dir)
            .await
            .map_err(io_failure)?;

        let receipt = InstallReceipt {
            package: self.params.package_name.clone(),
            version_code: self.params.version_code,
            signature: self.params.signature.clone(),
            installer_of_record: self.params.attribution.as_str().to_string(),
            files: self.written.clone(),
            installed_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&receipt)
            .map_err(|e| Rejection(InstallStatus::Failure, e.to_string()))?;
        tokio::fs::write(self.package_dir.join(RECEIPT_FILE), json)
            .await
            .map_err(io_failure)?;
        Ok(())
    }
}

#[async_trait]
impl InstallSession for DirectorySession {
    async fn write(&mut self, name: &str, source: &Path) -> Result<(), Error> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(PlatformError::SessionError {
                message: format!("invalid artifact name `{name}`"),
            }
            .into());
        }
        let target = self.staging.join(name);
        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| Error::io_with_path(&e, source))?;
        self.written.push(name.to_string());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        debug!(package = %self.params.package_name, files = self.written.len(), "install session committed");
        tokio::spawn(async move {
            let package = self.params.package_name.clone();
            let event = match self.apply().await {
                Ok(()) => {
                    info!(package = %package, version_code = self.params.version_code, "package installed");
                    PackageLifecycleEvent::Added { package }
                }
                Err(Rejection(status, message)) => {
                    warn!(package = %package, ?status, %message, "install session rejected");
                    let _ = tokio::fs::remove_dir_all(&self.staging).await;
                    PackageLifecycleEvent::InstallFailed {
                        package,
                        status,
                        message,
                    }
                }
            };
            let _ = self.tx.send(event);
        });
        Ok(())
    }

    async fn abandon(self: Box<Self>) {
        let _ = tokio::fs::remove_dir_all(&self.staging).await;
        debug!(package = %self.params.package_name, "install session abandoned");
    }
}
