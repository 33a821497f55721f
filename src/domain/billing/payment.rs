//! Append-only payment ledger records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId, ValidationError};

/// Outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Ledger identifier for an invoice's payment.
///
/// Uses the gateway payment-intent id when the invoice carries one, otherwise a
/// value derived from the invoice id so redelivered events collide on the same key.
pub fn payment_record_id(payment_intent_id: Option<&str>, invoice_id: &str) -> String {
    match payment_intent_id {
        Some(pi) if !pi.is_empty() => pi.to_string(),
        _ => format!("inv_{}", invoice_id),
    }
}

/// Ledger identifier for a failed attempt on an invoice.
///
/// Kept apart from [`payment_record_id`] because the gateway reuses the same
/// payment intent when it retries, and the later success must still be recorded.
pub fn failed_payment_record_id(payment_intent_id: Option<&str>, invoice_id: &str) -> String {
    format!("{}:failed", payment_record_id(payment_intent_id, invoice_id))
}

/// One payment attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: UserId,
    pub subscription_id: String,
    pub invoice_id: String,
    /// Smallest currency unit.
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_prefers_payment_intent() {
        assert_eq!(payment_record_id(Some("pi_123"), "in_9"), "pi_123");
    }

    #[test]
    fn record_id_falls_back_to_invoice() {
        assert_eq!(payment_record_id(None, "in_9"), "inv_in_9");
        assert_eq!(payment_record_id(Some(""), "in_9"), "inv_in_9");
    }

    #[test]
    fn fallback_is_deterministic() {
        assert_eq!(
            payment_record_id(None, "in_42"),
            payment_record_id(None, "in_42")
        );
    }

    #[test]
    fn failed_attempt_does_not_collide_with_success() {
        assert_ne!(
            failed_payment_record_id(Some("pi_1"), "in_1"),
            payment_record_id(Some("pi_1"), "in_1")
        );
        assert_eq!(failed_payment_record_id(None, "in_1"), "inv_in_1:failed");
    }

    #[test]
    fn status_parses_stored_values() {
        assert_eq!("failed".parse::<PaymentStatus>().unwrap(), PaymentStatus::Failed);
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
