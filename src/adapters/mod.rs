//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `http` - Axum routes for the subscription service and Stripe webhooks
//! - `memory` - In-memory repositories for tests and local runs
//! - `postgres` - sqlx-backed repositories
//! - `stripe` - Stripe REST client, webhook verification and a mock gateway

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use stripe::{MockPaymentGateway, StripePaymentGateway};
