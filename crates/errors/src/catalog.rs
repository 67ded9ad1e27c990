//! Catalog resolution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("purchase required for {package}")]
    PurchaseRequired { package: String },

    #[error("purchase requires a signed-in account: {package}")]
    AccountRequired { package: String },

    #[error("download resolution failed for {package}: {message}")]
    ResolutionFailed { package: String, message: String },
}

impl UserFacingError for CatalogError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PurchaseRequired { .. } => Some("Complete the purchase, then enqueue again."),
            Self::AccountRequired { .. } => Some("Sign in with an account to buy paid packages."),
            Self::ResolutionFailed { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::ResolutionFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::PurchaseRequired { .. } => "catalog.purchase_required",
            Self::AccountRequired { .. } => "catalog.account_required",
            Self::ResolutionFailed { .. } => "catalog.resolution_failed",
        };
        Some(code)
    }
}
