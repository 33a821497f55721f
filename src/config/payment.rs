//! Payment gateway configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Stripe credentials and the URLs handed to hosted Stripe pages.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: String,

    pub stripe_webhook_secret: String,

    #[serde(default = "default_api_base_url")]
    pub stripe_api_base_url: String,

    /// Reject test-mode webhook events.
    #[serde(default)]
    pub require_livemode: bool,

    #[serde(default = "default_success_url")]
    pub checkout_success_url: String,

    #[serde(default = "default_cancel_url")]
    pub checkout_cancel_url: String,

    #[serde(default = "default_portal_return_url")]
    pub portal_return_url: String,

    /// Maximum payments returned by the payment history endpoint.
    #[serde(default = "default_history_limit")]
    pub payment_history_limit: u32,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__STRIPE_WEBHOOK_SECRET",
            ));
        }
        if !self.stripe_api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.require_livemode && !self.is_live_mode() {
            return Err(ValidationError::LivemodeRequiresLiveKey);
        }
        if self.payment_history_limit == 0 || self.payment_history_limit > 100 {
            return Err(ValidationError::InvalidHistoryLimit);
        }

        for (name, url) in [
            ("stripe_api_base_url", &self.stripe_api_base_url),
            ("checkout_success_url", &self.checkout_success_url),
            ("checkout_cancel_url", &self.checkout_cancel_url),
            ("portal_return_url", &self.portal_return_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ValidationError::InvalidUrl(name));
            }
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_api_base_url: default_api_base_url(),
            require_livemode: false,
            checkout_success_url: default_success_url(),
            checkout_cancel_url: default_cancel_url(),
            portal_return_url: default_portal_return_url(),
            payment_history_limit: default_history_limit(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_success_url() -> String {
    "http://localhost:3000/billing/success?session_id={CHECKOUT_SESSION_ID}".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:3000/billing/plans".to_string()
}

fn default_portal_return_url() -> String {
    "http://localhost:3000/billing".to_string()
}

fn default_history_limit() -> u32 {
    20
}
