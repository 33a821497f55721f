//! Billing domain - plans, subscriptions and the payment ledger.
//!
//! # Module Organization
//!
//! - `plan` - Plan catalog entries, tiers and limits
//! - `subscription` - Local subscription mirror and gateway status mapping
//! - `payment` - Append-only payment ledger records
//! - `profile` - Billing mirror on the user profile
//! - `gateway_event` - Verified gateway events, one typed payload per kind
//! - `entitlements` - Plan-limit gating
//! - `errors` - Billing error taxonomy

mod entitlements;
mod errors;
mod gateway_event;
mod payment;
mod plan;
mod profile;
mod subscription;

pub use entitlements::{Entitlements, LimitDecision, LimitedResource};
pub use errors::{BillingError, BillingErrorKind};
pub use gateway_event::{
    BillingReason, CheckoutCompleted, GatewayEvent, GatewayEventKind, InvoiceSnapshot,
    SubscriptionSnapshot,
};
#[cfg(test)]
pub use gateway_event::{InvoiceSnapshotBuilder, SubscriptionSnapshotBuilder};
pub use payment::{failed_payment_record_id, payment_record_id, PaymentRecord, PaymentStatus};
pub use plan::{
    BillingInterval, PlanLimits, PlanTier, SubscriptionPlan, DEFAULT_CUSTOM_MODULE_LIMIT,
    DEFAULT_MODULE_LIMIT, DEFAULT_STUDENT_LIMIT,
};
pub use profile::{BillingMirror, RenewalUpdate, UserProfile, UserRole};
pub use subscription::{
    map_gateway_status, CustomerSubscription, SubscriptionChange, SubscriptionStatus,
};
