//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, check_limit, create_checkout, create_portal_session,
    get_payment_history, get_plans, get_subscription, handle_stripe_webhook,
    reactivate_subscription, record_custom_module, sync_plans, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## Public
/// - `GET /plans` - Active plans
///
/// ## User Endpoints (require `X-User-Id`)
/// - `GET /subscription` - Plan in effect and subscription row
/// - `POST /checkout` - Start a hosted checkout
/// - `POST /subscription/cancel` - Cancel at period end
/// - `POST /subscription/reactivate` - Undo a pending cancellation
/// - `POST /portal` - Open the customer portal
/// - `GET /payments` - Recent payments
/// - `GET /limits/:resource` - Plan-limit check
/// - `POST /usage/custom-modules` - Count a custom module
///
/// ## Admin Endpoints
/// - `POST /plans/sync` - Re-import the gateway catalog
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/plans", get(get_plans))
        .route("/subscription", get(get_subscription))
        .route("/checkout", post(create_checkout))
        .route("/subscription/cancel", post(cancel_subscription))
        .route("/subscription/reactivate", post(reactivate_subscription))
        .route("/portal", post(create_portal_session))
        .route("/payments", get(get_payment_history))
        .route("/limits/:resource", get(check_limit))
        .route("/usage/custom-modules", post(record_custom_module))
        .route("/plans/sync", post(sync_plans))
}

/// Create the Stripe webhook router.
///
/// Kept apart from the billing routes: webhooks carry no user identity and are
/// authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Billing and webhook routes mounted at `/billing` and `/webhooks`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/webhooks", webhook_routes())
}
