//! Job record state error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("invalid job transition from {from} via {transition}")]
    InvalidTransition { from: String, transition: String },

    #[error("job invariant violated for {job_id}: {message}")]
    InvariantViolation { job_id: String, message: String },

    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("database error: {message}")]
    DatabaseError { message: String },

    #[error("corrupted job record {id}: {message}")]
    CorruptedRecord { id: String, message: String },

    #[error("migration failed: {message}")]
    MigrationFailed { message: String },
}

impl UserFacingError for StateError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidTransition { .. } => "state.invalid_transition",
            Self::InvariantViolation { .. } => "state.invariant_violation",
            Self::JobNotFound { .. } => "state.job_not_found",
            Self::DatabaseError { .. } => "state.database_error",
            Self::CorruptedRecord { .. } => "state.corrupted_record",
            Self::MigrationFailed { .. } => "state.migration_failed",
        };
        Some(code)
    }
}
