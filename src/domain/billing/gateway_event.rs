//! Verified payment gateway events.
//!
//! The gateway adapter turns raw webhook payloads into these types after the
//! signature has been checked. Each modeled kind carries its own typed payload;
//! kinds outside the modeled set arrive as [`GatewayEventKind::Unrecognized`].
//! A modeled kind whose object does not decode arrives as
//! [`GatewayEventKind::Malformed`].

use std::fmt;

use serde::Serialize;

use crate::domain::foundation::Timestamp;

/// A signature-verified gateway event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayEvent {
    /// Gateway event id (evt_...).
    pub id: String,
    pub created_at: Option<Timestamp>,
    pub kind: GatewayEventKind,
}

impl GatewayEvent {
    pub fn new(id: impl Into<String>, kind: GatewayEventKind) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            kind,
        }
    }

    /// Wire name of the event kind (e.g. `invoice.paid`).
    pub fn event_type(&self) -> &str {
        self.kind.event_type()
    }
}

/// Closed set of event kinds the reconciler understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "object")]
pub enum GatewayEventKind {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionCreated(SubscriptionSnapshot),
    SubscriptionUpdated(SubscriptionSnapshot),
    SubscriptionDeleted(SubscriptionSnapshot),
    InvoicePaid(InvoiceSnapshot),
    InvoicePaymentFailed(InvoiceSnapshot),
    Unrecognized { event_type: String },
    /// Authentic event of a modeled kind whose object failed to decode.
    Malformed { event_type: String, reason: String },
}

impl GatewayEventKind {
    pub const CHECKOUT_COMPLETED: &'static str = "checkout.session.completed";
    pub const SUBSCRIPTION_CREATED: &'static str = "customer.subscription.created";
    pub const SUBSCRIPTION_UPDATED: &'static str = "customer.subscription.updated";
    pub const SUBSCRIPTION_DELETED: &'static str = "customer.subscription.deleted";
    pub const INVOICE_PAID: &'static str = "invoice.paid";
    pub const INVOICE_PAYMENT_FAILED: &'static str = "invoice.payment_failed";

    pub fn event_type(&self) -> &str {
        match self {
            GatewayEventKind::CheckoutCompleted(_) => Self::CHECKOUT_COMPLETED,
            GatewayEventKind::SubscriptionCreated(_) => Self::SUBSCRIPTION_CREATED,
            GatewayEventKind::SubscriptionUpdated(_) => Self::SUBSCRIPTION_UPDATED,
            GatewayEventKind::SubscriptionDeleted(_) => Self::SUBSCRIPTION_DELETED,
            GatewayEventKind::InvoicePaid(_) => Self::INVOICE_PAID,
            GatewayEventKind::InvoicePaymentFailed(_) => Self::INVOICE_PAYMENT_FAILED,
            GatewayEventKind::Unrecognized { event_type } => event_type,
            GatewayEventKind::Malformed { event_type, .. } => event_type,
        }
    }
}

/// Payload of `checkout.session.completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub customer_email: Option<String>,
}

/// Payload of the `customer.subscription.*` kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub customer_id: String,
    /// Raw gateway status; map with `map_gateway_status`.
    pub status: String,
    /// Price of the first subscription item.
    pub price_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
}

/// Payload of the `invoice.*` kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceSnapshot {
    pub id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
    pub collection_method: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub billing_reason: BillingReason,
}

/// Why the gateway produced an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum BillingReason {
    /// First invoice of a new subscription.
    SubscriptionCreate,
    /// Renewal at the start of a new billing cycle.
    SubscriptionCycle,
    SubscriptionUpdate,
    Manual,
    Other(String),
}

impl BillingReason {
    pub fn parse(reason: Option<&str>) -> Self {
        match reason.unwrap_or_default() {
            "subscription_create" => BillingReason::SubscriptionCreate,
            "subscription_cycle" => BillingReason::SubscriptionCycle,
            "subscription_update" => BillingReason::SubscriptionUpdate,
            "manual" => BillingReason::Manual,
            other => BillingReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BillingReason::SubscriptionCreate => "subscription_create",
            BillingReason::SubscriptionCycle => "subscription_cycle",
            BillingReason::SubscriptionUpdate => "subscription_update",
            BillingReason::Manual => "manual",
            BillingReason::Other(reason) => reason,
        }
    }

    /// Only cycle renewals start a fresh usage period.
    pub fn is_cycle_renewal(&self) -> bool {
        matches!(self, BillingReason::SubscriptionCycle)
    }
}

impl fmt::Display for BillingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BillingReason> for String {
    fn from(reason: BillingReason) -> Self {
        reason.as_str().to_string()
    }
}

/// Builder for subscription event payloads in tests.
#[cfg(test)]
pub struct SubscriptionSnapshotBuilder {
    snapshot: SubscriptionSnapshot,
}

#[cfg(test)]
impl SubscriptionSnapshotBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            snapshot: SubscriptionSnapshot {
                id: id.into(),
                customer_id: "cus_test".to_string(),
                status: "active".to_string(),
                price_id: Some("price_home".to_string()),
                current_period_start: Timestamp::from_unix_secs(1_704_067_200),
                current_period_end: Timestamp::from_unix_secs(1_706_745_600),
                cancel_at_period_end: false,
            },
        }
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.snapshot.customer_id = customer_id.into();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.snapshot.status = status.into();
        self
    }

    pub fn price(mut self, price_id: impl Into<String>) -> Self {
        self.snapshot.price_id = Some(price_id.into());
        self
    }

    pub fn cancel_at_period_end(mut self, cancel: bool) -> Self {
        self.snapshot.cancel_at_period_end = cancel;
        self
    }

    pub fn build(self) -> SubscriptionSnapshot {
        self.snapshot
    }
}

/// Builder for invoice event payloads in tests.
#[cfg(test)]
pub struct InvoiceSnapshotBuilder {
    invoice: InvoiceSnapshot,
}

#[cfg(test)]
impl InvoiceSnapshotBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            invoice: InvoiceSnapshot {
                id: id.into(),
                customer_id: Some("cus_test".to_string()),
                subscription_id: Some("sub_test".to_string()),
                payment_intent_id: Some("pi_test".to_string()),
                amount_paid: 999,
                amount_due: 999,
                currency: "usd".to_string(),
                collection_method: Some("charge_automatically".to_string()),
                hosted_invoice_url: Some("https://invoice.example.com/in".to_string()),
                billing_reason: BillingReason::SubscriptionCycle,
            },
        }
    }

    pub fn customer(mut self, customer_id: Option<&str>) -> Self {
        self.invoice.customer_id = customer_id.map(String::from);
        self
    }

    pub fn subscription(mut self, subscription_id: Option<&str>) -> Self {
        self.invoice.subscription_id = subscription_id.map(String::from);
        self
    }

    pub fn payment_intent(mut self, payment_intent_id: Option<&str>) -> Self {
        self.invoice.payment_intent_id = payment_intent_id.map(String::from);
        self
    }

    pub fn billing_reason(mut self, reason: BillingReason) -> Self {
        self.invoice.billing_reason = reason;
        self
    }

    pub fn build(self) -> InvoiceSnapshot {
        self.invoice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_reason_parses_known_values() {
        assert_eq!(
            BillingReason::parse(Some("subscription_cycle")),
            BillingReason::SubscriptionCycle
        );
        assert_eq!(
            BillingReason::parse(Some("subscription_create")),
            BillingReason::SubscriptionCreate
        );
        assert_eq!(
            BillingReason::parse(Some("upcoming")),
            BillingReason::Other("upcoming".to_string())
        );
        assert_eq!(BillingReason::parse(None), BillingReason::Other(String::new()));
    }

    #[test]
    fn only_cycle_is_a_renewal() {
        assert!(BillingReason::SubscriptionCycle.is_cycle_renewal());
        assert!(!BillingReason::SubscriptionCreate.is_cycle_renewal());
        assert!(!BillingReason::Manual.is_cycle_renewal());
    }

    #[test]
    fn event_type_names_match_wire_format() {
        let event = GatewayEvent::new(
            "evt_1",
            GatewayEventKind::InvoicePaid(InvoiceSnapshotBuilder::new("in_1").build()),
        );
        assert_eq!(event.event_type(), "invoice.paid");

        let other = GatewayEvent::new(
            "evt_2",
            GatewayEventKind::Unrecognized {
                event_type: "customer.updated".to_string(),
            },
        );
        assert_eq!(other.event_type(), "customer.updated");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = GatewayEvent::new(
            "evt_3",
            GatewayEventKind::SubscriptionDeleted(SubscriptionSnapshotBuilder::new("sub_1").build()),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "SubscriptionDeleted");
        assert_eq!(json["kind"]["object"]["id"], "sub_1");
    }
}
