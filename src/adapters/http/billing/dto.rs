//! HTTP DTOs for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    CancelSubscriptionResult, GetCurrentSubscriptionResult, ReactivateSubscriptionResult,
    SyncPlanCatalogResult,
};
use crate::domain::billing::{
    BillingInterval, CustomerSubscription, LimitDecision, LimitedResource, PlanLimits, PlanTier,
    SubscriptionPlan, SubscriptionStatus,
};
use crate::domain::foundation::Timestamp;
use crate::ports::GatewayPayment;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start checkout for a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Plan id (the gateway price id).
    pub plan_id: String,
}

/// Query string for limit checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitCheckParams {
    /// How many of the resource the user owns now.
    #[serde(default)]
    pub current: u32,
}

/// Query string for payment history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentHistoryParams {
    #[serde(default)]
    pub limit: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub tier: PlanTier,
    pub limits: PlanLimits,
    pub active: bool,
}

impl From<SubscriptionPlan> for PlanResponse {
    fn from(plan: SubscriptionPlan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            price_cents: plan.price_cents,
            currency: plan.currency,
            interval: plan.interval,
            tier: plan.tier,
            limits: plan.limits,
            active: plan.active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub custom_modules_this_period: u32,
}

impl From<CustomerSubscription> for SubscriptionResponse {
    fn from(sub: CustomerSubscription) -> Self {
        Self {
            id: sub.id,
            plan_id: sub.plan_id,
            status: sub.status,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            custom_modules_this_period: sub.custom_modules_this_period,
        }
    }
}

/// Current plan plus the subscription row, `null` for free users.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentSubscriptionResponse {
    pub plan: PlanResponse,
    pub subscription: Option<SubscriptionResponse>,
}

impl From<GetCurrentSubscriptionResult> for CurrentSubscriptionResponse {
    fn from(result: GetCurrentSubscriptionResult) -> Self {
        Self {
            plan: result.plan.into(),
            subscription: result.subscription.map(SubscriptionResponse::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Response to cancel / reactivate. Reflects the request sent to the gateway;
/// the stored subscription converges once the update webhook arrives.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionActionResponse {
    pub subscription_id: String,
    pub cancel_at_period_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_at: Option<Timestamp>,
}

impl From<CancelSubscriptionResult> for SubscriptionActionResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            subscription_id: result.subscription_id,
            cancel_at_period_end: true,
            effective_at: result.effective_at,
        }
    }
}

impl From<ReactivateSubscriptionResult> for SubscriptionActionResponse {
    fn from(result: ReactivateSubscriptionResult) -> Self {
        Self {
            subscription_id: result.subscription_id,
            cancel_at_period_end: false,
            effective_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: Option<Timestamp>,
}

impl From<GatewayPayment> for PaymentResponse {
    fn from(payment: GatewayPayment) -> Self {
        Self {
            id: payment.id,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            status: payment.status,
            description: payment.description,
            receipt_url: payment.receipt_url,
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryResponse {
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitCheckResponse {
    pub resource: LimitedResource,
    pub tier: PlanTier,
    pub limit: u32,
    pub used: u32,
    pub allowed: bool,
}

impl From<LimitDecision> for LimitCheckResponse {
    fn from(decision: LimitDecision) -> Self {
        Self {
            resource: decision.resource,
            tier: decision.tier,
            limit: decision.limit,
            used: decision.used,
            allowed: decision.allowed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub used_this_period: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSyncResponse {
    pub synced: usize,
    pub active: usize,
}

impl From<SyncPlanCatalogResult> for CatalogSyncResponse {
    fn from(result: SyncPlanCatalogResult) -> Self {
        Self {
            synced: result.plans.len(),
            active: result.active_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    pub duplicate: bool,
}

/// Error body returned by every billing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
