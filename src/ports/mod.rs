//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! ## Gateway Port
//!
//! - `PaymentGateway` - Customer, checkout, subscription, portal and webhook calls
//!
//! ## Storage Ports
//!
//! - `SubscriptionRepository` - Local subscription mirror
//! - `PlanRepository` - Plan catalog
//! - `PaymentHistoryRepository` - Append-only payment ledger
//! - `ProfileRepository` - Billing fields of user profiles
//! - `WebhookEventRepository` - Webhook idempotency ledger

mod payment_gateway;
mod payment_history_repository;
mod plan_repository;
mod profile_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use payment_gateway::{
    CatalogPrice, CatalogProduct, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest,
    GatewayCustomer, GatewayError, GatewayErrorCode, GatewayPayment, GatewaySubscription,
    PaymentGateway, PortalSession,
};
pub use payment_history_repository::PaymentHistoryRepository;
pub use plan_repository::PlanRepository;
pub use profile_repository::ProfileRepository;
pub use subscription_repository::SubscriptionRepository;
pub use webhook_event_repository::{
    SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookOutcome, WebhookResult,
};
