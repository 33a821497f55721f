//! Stripe implementation of the `PaymentGateway` port.
//!
//! Talks to the Stripe REST API with form-encoded requests and authenticates
//! webhook deliveries.
//!
//! # Security
//!
//! - HMAC-SHA256 over `"{t}.{payload}"`, compared in constant time
//! - Events older than 5 minutes, or more than 60 seconds in the future, are rejected
//! - Keys are held as `secrecy::SecretString`

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::PaymentConfig;
use crate::domain::billing::{GatewayEvent, GatewayEventKind};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CatalogPrice, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest,
    GatewayCustomer, GatewayError, GatewayPayment, GatewaySubscription, PaymentGateway,
    PortalSession,
};

use super::stripe_types::{
    SignatureHeader, StripeCheckoutSession, StripeCustomer, StripeEvent,
    StripeInvoice, StripeList, StripePaymentIntent, StripePortalSession, StripePrice,
    StripeSubscription,
};

type HmacSha256 = Hmac<Sha256>;

const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Stripe caps list pages at 100 objects.
const MAX_PAGE_SIZE: u32 = 100;

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    api_key: SecretString,
    webhook_secret: SecretString,
    api_base_url: String,
    require_livemode: bool,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
        }
    }

    /// Point the client at another host (stripe-mock, a recorder).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Reject webhook events sent in test mode.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

impl From<&PaymentConfig> for StripeConfig {
    fn from(config: &PaymentConfig) -> Self {
        StripeConfig::new(&config.stripe_api_key, &config.stripe_webhook_secret)
            .with_base_url(&config.stripe_api_base_url)
            .with_require_livemode(config.require_livemode)
    }
}

/// Stripe payment gateway.
pub struct StripePaymentGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(query)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;
        Self::decode(path, response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::not_found(path));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(path = %path, status = %status, error = %body, "Stripe API call failed");
            return Err(GatewayError::provider(format!(
                "Stripe API error ({}): {}",
                status, body
            )));
        }
        response.json::<T>().await.map_err(|e| {
            GatewayError::provider(format!("Failed to parse Stripe response: {}", e))
        })
    }

    /// Checks the signature header against the payload and the clock.
    fn verify_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), GatewayError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "Webhook event too old - possible replay"
            );
            return Err(GatewayError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }
        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event timestamp in the future"
            );
            return Err(GatewayError::invalid_webhook("Event timestamp in future"));
        }

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
            .map_err(|e| GatewayError::invalid_webhook(format!("Unusable webhook secret: {}", e)))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let matched = header
            .signatures
            .iter()
            .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate.as_slice())));

        if !matched {
            tracing::warn!(
                event_timestamp = header.timestamp,
                candidates = header.signatures.len(),
                "Webhook signature mismatch"
            );
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }
        Ok(())
    }

    /// Decodes an authenticated payload into a typed event.
    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
        let event: StripeEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            GatewayError::invalid_webhook(format!("Invalid JSON: {}", e))
        })?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(GatewayError::invalid_webhook(
                "Test mode events not allowed",
            ));
        }

        let object = event.data.object;
        let decoded = match event.event_type.as_str() {
            GatewayEventKind::CHECKOUT_COMPLETED => decode_object::<StripeCheckoutSession>(object)
                .map(|session| GatewayEventKind::CheckoutCompleted(session.into())),
            GatewayEventKind::SUBSCRIPTION_CREATED => decode_object::<StripeSubscription>(object)
                .map(|sub| GatewayEventKind::SubscriptionCreated(sub.into())),
            GatewayEventKind::SUBSCRIPTION_UPDATED => decode_object::<StripeSubscription>(object)
                .map(|sub| GatewayEventKind::SubscriptionUpdated(sub.into())),
            GatewayEventKind::SUBSCRIPTION_DELETED => decode_object::<StripeSubscription>(object)
                .map(|sub| GatewayEventKind::SubscriptionDeleted(sub.into())),
            GatewayEventKind::INVOICE_PAID => decode_object::<StripeInvoice>(object)
                .map(|invoice| GatewayEventKind::InvoicePaid(invoice.into())),
            GatewayEventKind::INVOICE_PAYMENT_FAILED => decode_object::<StripeInvoice>(object)
                .map(|invoice| GatewayEventKind::InvoicePaymentFailed(invoice.into())),
            other => Ok(GatewayEventKind::Unrecognized {
                event_type: other.to_string(),
            }),
        };

        // The signature already checked out, so a shape mismatch is schema drift, not forgery.
        let kind = decoded.unwrap_or_else(|e| {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Verified webhook object did not decode"
            );
            GatewayEventKind::Malformed {
                event_type: event.event_type.clone(),
                reason: e.to_string(),
            }
        });

        Ok(GatewayEvent {
            id: event.id,
            created_at: Timestamp::from_unix_secs(event.created),
            kind,
        })
    }
}

fn decode_object<T: DeserializeOwned>(object: serde_json::Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(object)
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, GatewayError> {
        let mut form = vec![
            ("email", request.email),
            ("metadata[user_id]", request.user_id.to_string()),
        ];
        if let Some(name) = request.name {
            form.push(("name", name));
        }

        let customer: StripeCustomer = self.post("customers", &form).await?;
        Ok(GatewayCustomer {
            id: customer.id,
            email: customer.email,
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = [
            ("mode", "subscription".to_string()),
            ("customer", request.customer_id),
            ("line_items[0][price]", request.price_id),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("client_reference_id", request.user_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let session: StripeCheckoutSession = self.post("checkout/sessions", &form).await?;
        let url = session
            .url
            .ok_or_else(|| GatewayError::provider("Checkout session has no URL"))?;
        Ok(CheckoutSession { id: session.id, url })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let sub: StripeSubscription = self
            .get(&format!("subscriptions/{}", subscription_id), &[])
            .await?;
        Ok(sub.into())
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<GatewaySubscription, GatewayError> {
        let sub: StripeSubscription = self
            .post(
                &format!("subscriptions/{}", subscription_id),
                &[("cancel_at_period_end", cancel_at_period_end.to_string())],
            )
            .await?;
        Ok(sub.into())
    }

    async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let query = [
            ("customer", customer_id.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("expand[]", "data.latest_charge".to_string()),
        ];
        let page: StripeList<StripePaymentIntent> = self.get("payment_intents", &query).await?;
        Ok(page.data.into_iter().map(GatewayPayment::from).collect())
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, GatewayError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", return_url.to_string()),
        ];
        let portal: StripePortalSession = self.post("billing_portal/sessions", &form).await?;
        Ok(PortalSession {
            id: portal.id,
            url: portal.url,
        })
    }

    async fn list_catalog_prices(&self) -> Result<Vec<CatalogPrice>, GatewayError> {
        let mut prices = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query = vec![
                ("limit", MAX_PAGE_SIZE.to_string()),
                ("expand[]", "data.product".to_string()),
            ];
            if let Some(cursor) = &starting_after {
                query.push(("starting_after", cursor.clone()));
            }

            let page: StripeList<StripePrice> = self.get("prices", &query).await?;
            starting_after = page.data.last().map(|p| p.id.clone());

            for price in page.data {
                let price_id = price.id.clone();
                match price.into_catalog_price() {
                    Some(catalog_price) => prices.push(catalog_price),
                    None => tracing::warn!(price_id = %price_id, "Price returned without expanded product"),
                }
            }

            if !page.has_more || starting_after.is_none() {
                break;
            }
        }

        Ok(prices)
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            GatewayError::invalid_webhook(e.to_string())
        })?;

        self.verify_signature(payload, &header)?;
        let event = self.parse_event(payload)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type(),
            "Webhook signature verified"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::BillingReason;
    use crate::ports::GatewayErrorCode;
    use crate::adapters::stripe::stripe_types::hex_encode;
    use std::sync::{Arc, Mutex};

    const SECRET: &str = "whsec_test_secret";

    fn gateway() -> StripePaymentGateway {
        StripePaymentGateway::new(StripeConfig::new("sk_test_key", SECRET))
    }

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex_encode(&mac.finalize().into_bytes()))
    }

    fn envelope(event_type: &str, object: serde_json::Value) -> String {
        serde_json::json!({
            "id": "evt_test",
            "type": event_type,
            "created": 1704067200,
            "livemode": false,
            "data": { "object": object }
        })
        .to_string()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_from_payment_settings() {
        let settings = PaymentConfig {
            stripe_api_key: "sk_live_x".to_string(),
            stripe_webhook_secret: "whsec_x".to_string(),
            stripe_api_base_url: "http://localhost:12111/".to_string(),
            require_livemode: true,
            ..Default::default()
        };
        let config = StripeConfig::from(&settings);
        assert_eq!(config.api_base_url, "http://localhost:12111");
        assert!(config.require_livemode);
    }

    #[test]
    fn urls_are_versioned() {
        assert_eq!(gateway().url("prices"), "https://api.stripe.com/v1/prices");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Verification Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn accepts_fresh_valid_signature() {
        let payload = r#"{"id":"evt_test"}"#;
        let header = SignatureHeader::parse(&sign(SECRET, chrono::Utc::now().timestamp(), payload)).unwrap();
        assert!(gateway().verify_signature(payload.as_bytes(), &header).is_ok());
    }

    #[test]
    fn rejects_signature_from_other_secret() {
        let payload = r#"{"id":"evt_test"}"#;
        let header = SignatureHeader::parse(&sign("whsec_other", chrono::Utc::now().timestamp(), payload)).unwrap();

        let err = gateway().verify_signature(payload.as_bytes(), &header).unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::InvalidWebhook);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn signature_mismatch_log_omits_valid_signature() {
        let payload = r#"{"id":"evt_test"}"#;
        let now = chrono::Utc::now().timestamp();
        let valid = sign(SECRET, now, payload);
        let valid_hex = valid.split("v1=").nth(1).unwrap().to_string();
        let header = SignatureHeader::parse(&sign("whsec_other", now, payload)).unwrap();

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, || {
            gateway().verify_signature(payload.as_bytes(), &header)
        });

        assert!(result.is_err());
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Webhook signature mismatch"));
        assert!(!output.contains(&valid_hex));
    }

    #[test]
    fn accepts_any_matching_signature_during_rotation() {
        let payload = r#"{"id":"evt_test"}"#;
        let now = chrono::Utc::now().timestamp();
        let good = sign(SECRET, now, payload);
        let good_hex = good.split("v1=").nth(1).unwrap();
        let header = SignatureHeader::parse(&format!("t={},v1={},v1={}", now, "00".repeat(32), good_hex)).unwrap();

        assert!(gateway().verify_signature(payload.as_bytes(), &header).is_ok());
    }

    #[test]
    fn rejects_expired_timestamp() {
        let payload = r#"{"id":"evt_test"}"#;
        let old = chrono::Utc::now().timestamp() - 600;
        let header = SignatureHeader::parse(&sign(SECRET, old, payload)).unwrap();

        let err = gateway().verify_signature(payload.as_bytes(), &header).unwrap_err();
        assert!(err.message.contains("too old"));
    }

    #[test]
    fn tolerates_small_clock_skew_only() {
        let payload = r#"{"id":"evt_test"}"#;
        let now = chrono::Utc::now().timestamp();

        let skewed = SignatureHeader::parse(&sign(SECRET, now + 30, payload)).unwrap();
        assert!(gateway().verify_signature(payload.as_bytes(), &skewed).is_ok());

        let future = SignatureHeader::parse(&sign(SECRET, now + 120, payload)).unwrap();
        let err = gateway().verify_signature(payload.as_bytes(), &future).unwrap_err();
        assert!(err.message.contains("future"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Event Parsing Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parses_subscription_created() {
        let payload = envelope(
            "customer.subscription.created",
            serde_json::json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "current_period_start": 1704067200,
                "current_period_end": 1706745600,
                "cancel_at_period_end": false,
                "items": {"data": [{"price": {"id": "price_home"}}]}
            }),
        );

        let event = gateway().parse_event(payload.as_bytes()).unwrap();
        assert_eq!(event.id, "evt_test");
        match event.kind {
            GatewayEventKind::SubscriptionCreated(sub) => {
                assert_eq!(sub.id, "sub_1");
                assert_eq!(sub.price_id.as_deref(), Some("price_home"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn parses_invoice_paid_with_billing_reason() {
        let payload = envelope(
            "invoice.paid",
            serde_json::json!({
                "id": "in_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "payment_intent": "pi_1",
                "amount_paid": 999,
                "amount_due": 999,
                "currency": "usd",
                "billing_reason": "subscription_create"
            }),
        );

        let event = gateway().parse_event(payload.as_bytes()).unwrap();
        match event.kind {
            GatewayEventKind::InvoicePaid(invoice) => {
                assert_eq!(invoice.billing_reason, BillingReason::SubscriptionCreate);
                assert_eq!(invoice.amount_paid, 999);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn unknown_types_become_unrecognized() {
        let payload = envelope("customer.updated", serde_json::json!({"id": "cus_1"}));
        let event = gateway().parse_event(payload.as_bytes()).unwrap();
        assert_eq!(
            event.kind,
            GatewayEventKind::Unrecognized {
                event_type: "customer.updated".to_string()
            }
        );
    }

    #[test]
    fn malformed_object_becomes_malformed_event() {
        let payload = envelope("invoice.paid", serde_json::json!({"id": 42}));

        let event = gateway().parse_event(payload.as_bytes()).unwrap();

        assert_eq!(event.id, "evt_test");
        match event.kind {
            GatewayEventKind::Malformed { event_type, reason } => {
                assert_eq!(event_type, "invoice.paid");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[tokio::test]
    async fn verify_webhook_accepts_signed_event_with_unexpected_shape() {
        let payload = envelope("customer.subscription.updated", serde_json::json!({"id": "sub_1"}));
        let signature = sign(SECRET, chrono::Utc::now().timestamp(), &payload);

        let event = gateway()
            .verify_webhook(payload.as_bytes(), &signature)
            .await
            .unwrap();

        assert!(matches!(event.kind, GatewayEventKind::Malformed { .. }));
        assert_eq!(event.event_type(), "customer.subscription.updated");
    }

    #[test]
    fn livemode_enforcement_rejects_test_events() {
        let gateway = StripePaymentGateway::new(
            StripeConfig::new("sk_live_key", SECRET).with_require_livemode(true),
        );
        let payload = envelope("customer.updated", serde_json::json!({}));
        let err = gateway.parse_event(payload.as_bytes()).unwrap_err();
        assert!(err.message.contains("Test mode"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // verify_webhook Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verify_webhook_end_to_end() {
        let payload = envelope(
            "checkout.session.completed",
            serde_json::json!({
                "id": "cs_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "customer_email": "parent@example.com"
            }),
        );
        let signature = sign(SECRET, chrono::Utc::now().timestamp(), &payload);

        let event = gateway()
            .verify_webhook(payload.as_bytes(), &signature)
            .await
            .unwrap();
        assert_eq!(event.event_type(), "checkout.session.completed");
    }

    #[tokio::test]
    async fn verify_webhook_rejects_malformed_header() {
        let err = gateway()
            .verify_webhook(b"{}", "malformed_header")
            .await
            .unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::InvalidWebhook);
    }

    #[tokio::test]
    async fn verify_webhook_rejects_invalid_json() {
        let payload = "not valid json";
        let signature = sign(SECRET, chrono::Utc::now().timestamp(), payload);
        let err = gateway()
            .verify_webhook(payload.as_bytes(), &signature)
            .await
            .unwrap_err();
        assert!(err.message.contains("Invalid JSON"));
    }
}
