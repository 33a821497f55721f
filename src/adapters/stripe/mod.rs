//! Stripe payment gateway adapter.
//!
//! - `StripePaymentGateway` - REST client and webhook authentication
//! - `MockPaymentGateway` - in-process double for tests and local runs
//! - `stripe_types` - the subset of Stripe objects the billing core reads

mod mock_payment_gateway;
mod stripe_adapter;
mod stripe_types;

pub use mock_payment_gateway::{GatewayCall, MockPaymentGateway};
pub use stripe_adapter::{StripeConfig, StripePaymentGateway};
pub use stripe_types::{SignatureError, SignatureHeader};
