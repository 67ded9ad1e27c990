use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-shot user-facing notifications
///
/// Each is emitted once per occurrence and never replayed to late
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoticeEvent {
    /// Paid package requested while signed in anonymously
    PurchaseRequiresAccount { package: String },

    /// Paid package requires a purchase flow before download
    PurchaseFlowRequired { package: String },

    /// Catalog resolution failed for a package
    LoadError { package: String, message: String },

    /// Not enough free space; `missing` bytes must be freed
    LowStorage { package: String, missing: u64 },

    /// No network connection at admission time
    NetworkUnavailable { package: String },

    /// Installed package signature differs from the update's
    SignatureMismatch { package: String },

    /// Every package of an update-all batch reached a terminal state
    UpdatesCompleted {
        count: usize,
        packages: Vec<String>,
        completed_at: DateTime<Utc>,
    },
}
