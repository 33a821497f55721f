//! Payment gateway port.
//!
//! The gateway is the single writer of truth for subscription state. The
//! subscription service only ever asks it for transitions; the resulting state
//! comes back through verified webhook events.
//!
//! Implementations are injected as `Arc<dyn PaymentGateway>` so tests can drive
//! the reconciler and service without a live gateway.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::billing::{BillingError, GatewayEvent};
use crate::domain::foundation::{Timestamp, UserId};

/// Port for the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway customer for a user.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, GatewayError>;

    /// Create a hosted checkout session for a subscription price.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Fetch the live state of a subscription.
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Schedule (`true`) or withdraw (`false`) cancellation at period end.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// List a customer's payment intents, newest first.
    async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<GatewayPayment>, GatewayError>;

    /// Create a self-service billing portal session.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, GatewayError>;

    /// List catalog prices with their products expanded.
    async fn list_catalog_prices(&self) -> Result<Vec<CatalogPrice>, GatewayError>;

    /// Authenticate a raw webhook payload and decode it.
    ///
    /// Returns `GatewayErrorCode::InvalidWebhook` when the signature, timestamp
    /// or payload is not acceptable.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, GatewayError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// Request Types
// ════════════════════════════════════════════════════════════════════════════════

/// Request to create a gateway customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCustomerRequest {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
}

/// Request to create a subscription checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutRequest {
    pub user_id: UserId,
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response Types
// ════════════════════════════════════════════════════════════════════════════════

/// Gateway customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCustomer {
    pub id: String,
    pub email: Option<String>,
}

/// Hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Billing portal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Live subscription state as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer_id: String,
    /// Raw gateway status.
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
}

/// One payment attempt as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayPayment {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: Option<Timestamp>,
}

/// Catalog price with its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPrice {
    pub id: String,
    pub active: bool,
    pub unit_amount: Option<i64>,
    pub currency: String,
    /// `recurring.interval`; `None` for one-time prices.
    pub interval: Option<String>,
    pub product: CatalogProduct,
}

/// Catalog product carrying plan metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub name: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Gateway error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    /// Transport failure talking to the gateway.
    NetworkError,
    /// The gateway answered with an error.
    ProviderError,
    /// The requested gateway object does not exist.
    NotFound,
    /// Webhook signature, timestamp or payload rejected.
    InvalidWebhook,
}

impl GatewayErrorCode {
    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayErrorCode::NetworkError)
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::ProviderError => "provider_error",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::InvalidWebhook => "invalid_webhook",
        };
        f.write_str(s)
    }
}

/// Error returned by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidWebhook, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        match err.code {
            GatewayErrorCode::InvalidWebhook => BillingError::SignatureInvalid(err.message),
            _ => BillingError::UpstreamFailure(err.to_string()),
        }
    }
}
