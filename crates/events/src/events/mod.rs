use serde::{Deserialize, Serialize};

use crate::EventSource;
use berth_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code, when the error has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod download;
pub mod general;
pub mod install;
pub mod notice;
pub mod queue;

pub use download::*;
pub use general::*;
pub use install::*;
pub use notice::*;
pub use queue::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Job admission and status transitions
    Queue(QueueEvent),

    /// Artifact downloads
    Download(DownloadEvent),

    /// Installer sessions and outcomes
    Install(InstallEvent),

    /// One-shot user notifications
    Notice(NoticeEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Queue(_) => EventSource::QUEUE,
            Self::Download(_) => EventSource::DOWNLOAD,
            Self::Install(_) => EventSource::INSTALL,
            Self::Notice(_) => EventSource::NOTICE,
        }
    }

    /// Job id this event belongs to, used as correlation id
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Queue(
                QueueEvent::JobQueued { job_id, .. }
                | QueueEvent::StatusChanged { job_id, .. }
                | QueueEvent::Cancelled { job_id }
                | QueueEvent::Finished { job_id, .. },
            )
            | Self::Download(
                DownloadEvent::Dispatched { job_id, .. }
                | DownloadEvent::Progress { job_id, .. }
                | DownloadEvent::Completed { job_id, .. }
                | DownloadEvent::Failed { job_id, .. },
            )
            | Self::Install(
                InstallEvent::SessionOpened { job_id, .. }
                | InstallEvent::SessionCommitted { job_id, .. }
                | InstallEvent::Completed { job_id, .. }
                | InstallEvent::Failed { job_id, .. },
            ) => Some(job_id),
            Self::General(_) | Self::Notice(_) => None,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Download(DownloadEvent::Failed { .. })
            | Self::Install(InstallEvent::Failed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Notice(
                NoticeEvent::LowStorage { .. }
                | NoticeEvent::NetworkUnavailable { .. }
                | NoticeEvent::SignatureMismatch { .. }
                | NoticeEvent::LoadError { .. },
            ) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Download(DownloadEvent::Progress { .. } | DownloadEvent::Dispatched { .. })
            | Self::Queue(QueueEvent::StatusChanged { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }
}
