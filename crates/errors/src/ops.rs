//! Service wiring and work-queue errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OpsError {
    #[error("missing component: {component}")]
    MissingComponent { component: String },

    #[error("work queue {queue} is not running")]
    QueueStopped { queue: String },

    #[error("invalid job file {path}: {message}")]
    InvalidJobFile { path: String, message: String },
}

impl UserFacingError for OpsError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidJobFile { .. } => {
                Some("Job files are TOML with one [[jobs]] table per job.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::MissingComponent { .. } => "ops.missing_component",
            Self::QueueStopped { .. } => "ops.queue_stopped",
            Self::InvalidJobFile { .. } => "ops.invalid_job_file",
        };
        Some(code)
    }
}
