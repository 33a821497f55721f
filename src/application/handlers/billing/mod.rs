//! Billing handlers.
//!
//! ## Event Processing
//! - `BillingEventReconciler` - applies verified gateway events to local state
//! - `WebhookIntakeHandler` - signature check, event ledger, reconcile
//!
//! ## Commands
//! - Creating checkout and portal sessions
//! - Cancelling and reactivating subscriptions
//! - Syncing the plan catalog
//! - Counting custom modules against the current period
//!
//! ## Queries
//! - Plans, current subscription, payment history
//! - Plan-limit checks

mod cancel_subscription;
mod check_plan_limit;
mod create_checkout_session;
mod create_portal_session;
mod get_current_subscription;
mod get_payment_history;
mod get_plans;
mod reactivate_subscription;
mod reconciler;
mod record_custom_module;
mod sync_plan_catalog;
mod webhook_intake;

#[cfg(test)]
pub(crate) mod test_support;

// Event processing
pub use reconciler::{BillingEventReconciler, ReconcileOutcome};
pub use webhook_intake::{WebhookIntakeCommand, WebhookIntakeHandler};

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_checkout_session::{
    CreateCheckoutSessionCommand, CreateCheckoutSessionHandler, CreateCheckoutSessionResult,
};
pub use create_portal_session::{
    CreatePortalSessionCommand, CreatePortalSessionHandler, CreatePortalSessionResult,
};
pub use reactivate_subscription::{
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionResult,
};
pub use record_custom_module::{
    RecordCustomModuleCommand, RecordCustomModuleHandler, RecordCustomModuleResult,
};
pub use sync_plan_catalog::{
    plan_from_price, SyncPlanCatalogCommand, SyncPlanCatalogHandler, SyncPlanCatalogResult,
};

// Queries
pub use check_plan_limit::{CheckPlanLimitHandler, CheckPlanLimitQuery};
pub use get_current_subscription::{
    GetCurrentSubscriptionHandler, GetCurrentSubscriptionQuery, GetCurrentSubscriptionResult,
};
pub use get_payment_history::{
    GetPaymentHistoryHandler, GetPaymentHistoryQuery, GetPaymentHistoryResult,
};
pub use get_plans::{GetPlansHandler, GetPlansQuery, GetPlansResult};
