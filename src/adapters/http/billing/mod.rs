//! HTTP adapter for billing endpoints.
//!
//! Exposes the subscription service and the Stripe webhook receiver.

mod dto;
mod handlers;
mod routes;

pub use dto::*;
pub use handlers::{
    AuthenticatedUser, AuthenticationRequired, BillingApiError, BillingAppState, BillingSettings,
    STRIPE_SIGNATURE_HEADER,
};
pub use routes::{billing_router, billing_routes, webhook_routes};
