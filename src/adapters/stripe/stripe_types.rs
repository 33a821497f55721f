//! Stripe wire types.
//!
//! Only the fields the billing core reads are modeled. Everything else in the
//! Stripe payloads is ignored by serde.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::billing::{
    BillingReason, CheckoutCompleted, InvoiceSnapshot, SubscriptionSnapshot,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CatalogPrice, CatalogProduct, GatewayPayment, GatewaySubscription,
};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Header
// ════════════════════════════════════════════════════════════════════════════════

/// Why a `Stripe-Signature` header could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing Stripe-Signature header")]
    Empty,

    #[error("Malformed signature element '{0}'")]
    MalformedElement(String),

    #[error("Missing timestamp (t=) in signature")]
    MissingTimestamp,

    #[error("Invalid timestamp in signature")]
    InvalidTimestamp,

    #[error("No v1 signature in header")]
    MissingV1Signature,

    #[error("Signature is not valid hex")]
    InvalidHex,
}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
///
/// Stripe sends one `v1` entry per active signing secret while a secret is
/// being rolled, so all of them are kept. Other schemes (`v0`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(SignatureError::Empty);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();

        for element in header.split(',') {
            let (key, value) = element
                .split_once('=')
                .ok_or_else(|| SignatureError::MalformedElement(element.to_string()))?;

            match key.trim() {
                "t" => {
                    let parsed = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| SignatureError::InvalidTimestamp)?;
                    timestamp = Some(parsed);
                }
                "v1" => signatures.push(hex_decode(value.trim()).ok_or(SignatureError::InvalidHex)?),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

pub(crate) fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: StripeEventData,
    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Objects
// ════════════════════════════════════════════════════════════════════════════════

/// A reference that Stripe sends either as a bare id or as the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T> Expandable<T> {
    pub fn object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
}

impl From<StripeCheckoutSession> for CheckoutCompleted {
    fn from(session: StripeCheckoutSession) -> Self {
        // Sessions created for an existing customer carry the email only in
        // `customer_details`.
        let customer_email = session
            .customer_email
            .or_else(|| session.customer_details.and_then(|d| d.email));
        CheckoutCompleted {
            session_id: session.id,
            customer_id: session.customer,
            subscription_id: session.subscription,
            customer_email,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRecurring {
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub recurring: Option<StripeRecurring>,
    pub product: Expandable<StripeProduct>,
}

fn default_true() -> bool {
    true
}

impl StripePrice {
    /// Converts into a catalog price. Requires the product to be expanded.
    pub fn into_catalog_price(self) -> Option<CatalogPrice> {
        let product = match self.product {
            Expandable::Object(product) => *product,
            Expandable::Id(_) => return None,
        };
        Some(CatalogPrice {
            id: self.id,
            active: self.active,
            unit_amount: self.unit_amount,
            currency: self.currency,
            interval: self.recurring.map(|r| r.interval),
            product: CatalogProduct {
                name: product.name,
                description: product.description,
                metadata: product.metadata,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: StripeItemPrice,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

/// Price as embedded in subscription items; the product stays unexpanded.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeItemPrice {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub items: Option<StripeList<StripeSubscriptionItem>>,
}

impl StripeSubscription {
    fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.as_ref().and_then(|items| items.data.first())
    }

    pub fn price_id(&self) -> Option<String> {
        self.first_item().map(|item| item.price.id.clone())
    }

    /// Billing period bounds. Newer API versions report them per item.
    pub fn period(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        let item = self.first_item();
        let start = self
            .current_period_start
            .or_else(|| item.and_then(|i| i.current_period_start));
        let end = self
            .current_period_end
            .or_else(|| item.and_then(|i| i.current_period_end));
        (
            start.and_then(Timestamp::from_unix_secs),
            end.and_then(Timestamp::from_unix_secs),
        )
    }
}

impl From<StripeSubscription> for SubscriptionSnapshot {
    fn from(sub: StripeSubscription) -> Self {
        let price_id = sub.price_id();
        let (current_period_start, current_period_end) = sub.period();
        SubscriptionSnapshot {
            id: sub.id,
            customer_id: sub.customer,
            status: sub.status,
            price_id,
            current_period_start,
            current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
        }
    }
}

impl From<StripeSubscription> for GatewaySubscription {
    fn from(sub: StripeSubscription) -> Self {
        let snapshot = SubscriptionSnapshot::from(sub);
        GatewaySubscription {
            id: snapshot.id,
            customer_id: snapshot.customer_id,
            status: snapshot.status,
            price_id: snapshot.price_id,
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    pub collection_method: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub billing_reason: Option<String>,
}

impl From<StripeInvoice> for InvoiceSnapshot {
    fn from(invoice: StripeInvoice) -> Self {
        InvoiceSnapshot {
            billing_reason: BillingReason::parse(invoice.billing_reason.as_deref()),
            id: invoice.id,
            customer_id: invoice.customer,
            subscription_id: invoice.subscription,
            payment_intent_id: invoice.payment_intent,
            amount_paid: invoice.amount_paid,
            amount_due: invoice.amount_due,
            currency: invoice.currency,
            collection_method: invoice.collection_method,
            hosted_invoice_url: invoice.hosted_invoice_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCharge {
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub created: i64,
    pub latest_charge: Option<Expandable<StripeCharge>>,
}

impl From<StripePaymentIntent> for GatewayPayment {
    fn from(intent: StripePaymentIntent) -> Self {
        let receipt_url = intent
            .latest_charge
            .as_ref()
            .and_then(Expandable::object)
            .and_then(|charge| charge.receipt_url.clone());
        GatewayPayment {
            id: intent.id,
            amount_cents: intent.amount,
            currency: intent.currency,
            status: intent.status,
            description: intent.description,
            receipt_url,
            created_at: Timestamp::from_unix_secs(intent.created),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}
