//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Kind | HTTP Status |
//! |------|-------------|
//! | NotFound | 404 |
//! | Conflict | 409 |
//! | Forbidden | 403 |
//! | InvalidState | 400 |
//! | Validation | 400 |
//! | SignatureInvalid | 400 |
//! | UpstreamFailure | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Errors raised by the subscription service and the webhook boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// A plan, user or subscription does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The catalog has no active free plan (seed data missing).
    #[error("Free plan is missing from the plan catalog")]
    FreePlanMissing,

    /// The user already holds a live subscription to the requested plan.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The user's role may not hold or manage billing.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The subscription is not in the state the operation requires.
    #[error("Cannot {operation}: {reason}")]
    InvalidState {
        operation: &'static str,
        reason: String,
    },

    /// Request input failed validation.
    #[error("Field '{field}' is invalid: {message}")]
    Validation { field: String, message: String },

    /// A gateway or storage call failed.
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Webhook authentication failed.
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),
}

/// Coarse classification of [`BillingError`], one per taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillingErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    InvalidState,
    Validation,
    UpstreamFailure,
    SignatureInvalid,
}

impl BillingError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        BillingError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn plan_not_found(plan_id: impl Into<String>) -> Self {
        Self::not_found("Plan", plan_id)
    }

    pub fn user_not_found(user_id: impl Into<String>) -> Self {
        Self::not_found("User", user_id)
    }

    pub fn subscription_not_found(user_id: impl Into<String>) -> Self {
        Self::not_found("Subscription for user", user_id)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BillingError::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        BillingError::Forbidden(message.into())
    }

    pub fn invalid_state(operation: &'static str, reason: impl Into<String>) -> Self {
        BillingError::InvalidState {
            operation,
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        BillingError::UpstreamFailure(message.into())
    }

    pub fn signature_invalid(message: impl Into<String>) -> Self {
        BillingError::SignatureInvalid(message.into())
    }

    pub fn kind(&self) -> BillingErrorKind {
        match self {
            BillingError::NotFound { .. } | BillingError::FreePlanMissing => {
                BillingErrorKind::NotFound
            }
            BillingError::Conflict(_) => BillingErrorKind::Conflict,
            BillingError::Forbidden(_) => BillingErrorKind::Forbidden,
            BillingError::InvalidState { .. } => BillingErrorKind::InvalidState,
            BillingError::Validation { .. } => BillingErrorKind::Validation,
            BillingError::UpstreamFailure(_) => BillingErrorKind::UpstreamFailure,
            BillingError::SignatureInvalid(_) => BillingErrorKind::SignatureInvalid,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::NotFound { .. } => "NOT_FOUND",
            BillingError::FreePlanMissing => "FREE_PLAN_MISSING",
            BillingError::Conflict(_) => "SUBSCRIPTION_CONFLICT",
            BillingError::Forbidden(_) => "FORBIDDEN",
            BillingError::InvalidState { .. } => "INVALID_SUBSCRIPTION_STATE",
            BillingError::Validation { .. } => "VALIDATION_FAILED",
            BillingError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            BillingError::SignatureInvalid(_) => "INVALID_WEBHOOK_SIGNATURE",
        }
    }

    /// User-facing message. Upstream details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            BillingError::UpstreamFailure(_) => {
                "The billing provider could not complete the request".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => BillingError::Validation {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            _ => BillingError::UpstreamFailure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_missing_is_not_found() {
        assert_eq!(BillingError::FreePlanMissing.kind(), BillingErrorKind::NotFound);
    }

    #[test]
    fn not_found_message_names_resource() {
        let err = BillingError::plan_not_found("price_pro");
        assert_eq!(err.to_string(), "Plan not found: price_pro");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn invalid_state_message_names_operation() {
        let err = BillingError::invalid_state("cancel subscription", "subscription is past_due");
        assert_eq!(
            err.to_string(),
            "Cannot cancel subscription: subscription is past_due"
        );
        assert_eq!(err.kind(), BillingErrorKind::InvalidState);
    }

    #[test]
    fn upstream_message_hides_details() {
        let err = BillingError::upstream("stripe returned 502: bad gateway");
        assert!(!err.message().contains("502"));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn database_errors_become_upstream_failures() {
        let err: BillingError = DomainError::database("load plan", "timeout").into();
        assert_eq!(err.kind(), BillingErrorKind::UpstreamFailure);
    }

    #[test]
    fn domain_validation_errors_stay_validation() {
        let err: BillingError = DomainError::validation("plan_id", "must not be empty").into();
        assert_eq!(
            err,
            BillingError::Validation {
                field: "plan_id".to_string(),
                message: "must not be empty".to_string(),
            }
        );
    }
}
