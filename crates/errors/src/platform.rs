//! Errors raised by the OS collaborator implementations

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Errors that can occur while talking to the platform
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("filesystem operation failed: {operation} - {message}")]
    FilesystemOperationFailed { operation: String, message: String },

    #[error("transport request failed: {message}")]
    TransportFailed { message: String },

    #[error("install session error: {message}")]
    SessionError { message: String },

    #[error("platform capability not available: {capability}")]
    CapabilityUnavailable { capability: String },

    #[error("shortcut publishing failed: {message}")]
    ShortcutFailed { message: String },
}

impl UserFacingError for PlatformError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::FilesystemOperationFailed { .. } => "platform.filesystem_failed",
            Self::TransportFailed { .. } => "platform.transport_failed",
            Self::SessionError { .. } => "platform.session_error",
            Self::CapabilityUnavailable { .. } => "platform.capability_unavailable",
            Self::ShortcutFailed { .. } => "platform.shortcut_failed",
        };
        Some(code)
    }
}
