//! Package installation contract
//!
//! A session is opened per job, every cached artifact is written into it and
//! the session is committed. The commit outcome is not returned: it arrives
//! later as a `PackageLifecycleEvent`, the way an OS broadcast would.

use async_trait::async_trait;
use berth_errors::Error;
use berth_types::Origin;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc;

/// Marker the installer puts in the status message of an incompatible update
pub const UPDATE_INCOMPATIBLE: &str = "INSTALL_FAILED_UPDATE_INCOMPATIBLE";
/// Marker for an attempted version downgrade
pub const VERSION_DOWNGRADE: &str = "INSTALL_FAILED_VERSION_DOWNGRADE";

/// Parameters for opening an install session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub package_name: String,
    pub version_code: i64,
    pub signature: String,
    /// Catalog the package came from; recorded as installer of record
    pub attribution: Origin,
}

/// Status code delivered with a commit outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Success,
    Failure,
    Blocked,
    Aborted,
    Invalid,
    Conflict,
    Storage,
    Incompatible,
}

impl InstallStatus {
    /// Numeric code as reported by the OS installer
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Blocked => 2,
            Self::Aborted => 3,
            Self::Invalid => 4,
            Self::Conflict => 5,
            Self::Storage => 6,
            Self::Incompatible => 7,
        }
    }

    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::Blocked,
            3 => Self::Aborted,
            4 => Self::Invalid,
            5 => Self::Conflict,
            6 => Self::Storage,
            7 => Self::Incompatible,
            _ => Self::Failure,
        }
    }

    /// Whether the outcome means an existing install has an incompatible
    /// signature or a newer version
    #[must_use]
    pub fn is_signature_conflict(self, message: &str) -> bool {
        self == Self::Incompatible
            || message.contains(UPDATE_INCOMPATIBLE)
            || message.contains(VERSION_DOWNGRADE)
    }
}

/// Package lifecycle broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLifecycleEvent {
    /// Package installed or replaced
    Added { package: String },
    Removed { package: String },
    /// Commit of an install session failed
    InstallFailed {
        package: String,
        status: InstallStatus,
        message: String,
    },
}

impl PackageLifecycleEvent {
    #[must_use]
    pub fn package(&self) -> &str {
        match self {
            Self::Added { package }
            | Self::Removed { package }
            | Self::InstallFailed { package, .. } => package,
        }
    }
}

pub type LifecycleSender = mpsc::UnboundedSender<PackageLifecycleEvent>;
pub type LifecycleReceiver = mpsc::UnboundedReceiver<PackageLifecycleEvent>;

/// Opens install sessions
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn open_session(&self, params: SessionParams) -> Result<Box<dyn InstallSession>, Error>;
}

/// One atomic package installation
#[async_trait]
pub trait InstallSession: Send {
    /// Stream one artifact into the session under `name`
    async fn write(&mut self, name: &str, source: &Path) -> Result<(), Error>;

    /// Hand the session to the installer. The outcome is broadcast later.
    async fn commit(self: Box<Self>) -> Result<(), Error>;

    /// Discard everything written so far
    async fn abandon(self: Box<Self>);
}

/// Read access to what is currently installed
#[async_trait]
pub trait PackageQuery: Send + Sync {
    /// Installed version code, `None` when the package is not installed
    async fn installed_version(&self, package: &str) -> Result<Option<i64>, Error>;
}
