//! Installation pipeline error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum InstallError {
    #[error("download transport failed for {package}: {message}")]
    DownloadTransportFailed { package: String, message: String },

    #[error("install session failed for {package}: {message}")]
    SessionFailed { package: String, message: String },

    #[error("incompatible update for {package}: {message}")]
    SignatureConflict { package: String, message: String },

    #[error("install blocked by policy for {package}: {message}")]
    Blocked { package: String, message: String },

    #[error("unsupported job type for {job_id}: {job_type}")]
    UnsupportedJobType { job_id: String, job_type: String },

    #[error("invalid job {job_id}: {message}")]
    InvalidJob { job_id: String, message: String },

    #[error("web app install failed for {job_id}: {message}")]
    WebAppFailed { job_id: String, message: String },
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SignatureConflict { .. } => {
                Some("Uninstall the existing package before installing this build.")
            }
            Self::DownloadTransportFailed { .. } | Self::SessionFailed { .. } => {
                Some("Retry the job from the queue.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DownloadTransportFailed { .. }
                | Self::SessionFailed { .. }
                | Self::WebAppFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::DownloadTransportFailed { .. } => "install.download_transport_failed",
            Self::SessionFailed { .. } => "install.session_failed",
            Self::SignatureConflict { .. } => "install.signature_conflict",
            Self::Blocked { .. } => "install.blocked",
            Self::UnsupportedJobType { .. } => "install.unsupported_job_type",
            Self::InvalidJob { .. } => "install.invalid_job",
            Self::WebAppFailed { .. } => "install.webapp_failed",
        };
        Some(code)
    }
}
