//! Configurable `PaymentGateway` double.
//!
//! Used by unit tests, the integration tests in `tests/`, and local runs
//! without Stripe credentials. Supports canned responses, per-method error
//! injection and a call log for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::billing::GatewayEvent;
use crate::ports::{
    CatalogPrice, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest,
    GatewayCustomer, GatewayError, GatewayPayment, GatewaySubscription, PaymentGateway,
    PortalSession,
};

/// Recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub method: &'static str,
    pub args: Vec<String>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, GatewaySubscription>,
    payments: HashMap<String, Vec<GatewayPayment>>,
    catalog: Vec<CatalogPrice>,
    webhook_events: HashMap<String, GatewayEvent>,
    method_errors: HashMap<&'static str, GatewayError>,
    calls: Vec<GatewayCall>,
    customer_seq: u32,
    session_seq: u32,
}

/// In-process payment gateway.
///
/// `verify_webhook` accepts a payload only when the signature string was
/// registered with [`MockPaymentGateway::register_webhook`].
#[derive(Default)]
pub struct MockPaymentGateway {
    state: Mutex<MockState>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_subscription(&self, subscription: GatewaySubscription) {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn set_payments(&self, customer_id: &str, payments: Vec<GatewayPayment>) {
        self.state
            .lock()
            .unwrap()
            .payments
            .insert(customer_id.to_string(), payments);
    }

    pub fn set_catalog(&self, prices: Vec<CatalogPrice>) {
        self.state.lock().unwrap().catalog = prices;
    }

    /// Make `verify_webhook(_, signature)` return `event`.
    pub fn register_webhook(&self, signature: &str, event: GatewayEvent) {
        self.state
            .lock()
            .unwrap()
            .webhook_events
            .insert(signature.to_string(), event);
    }

    /// Fail every call to `method` with `error`.
    pub fn fail_method(&self, method: &'static str, error: GatewayError) {
        self.state
            .lock()
            .unwrap()
            .method_errors
            .insert(method, error);
    }

    pub fn clear_errors(&self) {
        self.state.lock().unwrap().method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    pub fn was_called(&self, method: &str) -> bool {
        !self.calls_to(method).is_empty()
    }

    fn record(&self, method: &'static str, args: Vec<String>) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall { method, args });
        match state.method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, GatewayError> {
        self.record(
            "create_customer",
            vec![request.user_id.to_string(), request.email.clone()],
        )?;
        let mut state = self.state.lock().unwrap();
        state.customer_seq += 1;
        Ok(GatewayCustomer {
            id: format!("cus_mock_{}", state.customer_seq),
            email: Some(request.email),
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.record(
            "create_checkout_session",
            vec![
                request.user_id.to_string(),
                request.customer_id.clone(),
                request.price_id.clone(),
            ],
        )?;
        let mut state = self.state.lock().unwrap();
        state.session_seq += 1;
        let id = format!("cs_mock_{}", state.session_seq);
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/c/pay/{}", id),
            id,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.record("retrieve_subscription", vec![subscription_id.to_string()])?;
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("Subscription"))
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.record(
            "set_cancel_at_period_end",
            vec![subscription_id.to_string(), cancel_at_period_end.to_string()],
        )?;
        let mut state = self.state.lock().unwrap();
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))?;
        subscription.cancel_at_period_end = cancel_at_period_end;
        Ok(subscription.clone())
    }

    async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        self.record(
            "list_payment_intents",
            vec![customer_id.to_string(), limit.to_string()],
        )?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .get(customer_id)
            .map(|payments| payments.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, GatewayError> {
        self.record(
            "create_portal_session",
            vec![customer_id.to_string(), return_url.to_string()],
        )?;
        Ok(PortalSession {
            id: format!("bps_mock_{}", customer_id),
            url: format!("https://billing.stripe.test/p/session/{}", customer_id),
        })
    }

    async fn list_catalog_prices(&self) -> Result<Vec<CatalogPrice>, GatewayError> {
        self.record("list_catalog_prices", Vec::new())?;
        Ok(self.state.lock().unwrap().catalog.clone())
    }

    async fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        self.record("verify_webhook", vec![signature.to_string()])?;
        self.state
            .lock()
            .unwrap()
            .webhook_events
            .get(signature)
            .cloned()
            .ok_or_else(|| GatewayError::invalid_webhook("Invalid signature"))
    }
}
