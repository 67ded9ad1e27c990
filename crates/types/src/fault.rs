//! Records of packages whose installs keep failing for structural reasons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a package was marked faulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReason {
    /// Existing installation is signed with a different key
    SignatureMismatch,
    /// New artifacts carry a lower version than the installed package
    VersionDowngrade,
}

impl FaultReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignatureMismatch => "signature_mismatch",
            Self::VersionDowngrade => "version_downgrade",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "signature_mismatch" => Some(Self::SignatureMismatch),
            "version_downgrade" => Some(Self::VersionDowngrade),
            _ => None,
        }
    }

    /// Classify an installer status message
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        if message.contains("DOWNGRADE") {
            Self::VersionDowngrade
        } else {
            Self::SignatureMismatch
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package that must not be silently retried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultyPackageRecord {
    pub package_name: String,
    pub reason: FaultReason,
    pub recorded_at: DateTime<Utc>,
}
