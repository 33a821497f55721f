//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command/query handlers.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    BillingEventReconciler, CancelSubscriptionCommand, CancelSubscriptionHandler,
    CheckPlanLimitHandler, CheckPlanLimitQuery, CreateCheckoutSessionCommand,
    CreateCheckoutSessionHandler, CreatePortalSessionCommand, CreatePortalSessionHandler,
    GetCurrentSubscriptionHandler, GetCurrentSubscriptionQuery, GetPaymentHistoryHandler,
    GetPaymentHistoryQuery, GetPlansHandler, GetPlansQuery, ReactivateSubscriptionCommand,
    ReactivateSubscriptionHandler, RecordCustomModuleCommand, RecordCustomModuleHandler,
    SyncPlanCatalogCommand, SyncPlanCatalogHandler, WebhookIntakeCommand, WebhookIntakeHandler,
};
use crate::config::PaymentConfig;
use crate::domain::billing::{BillingError, BillingErrorKind, LimitedResource, UserRole};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{
    PaymentGateway, PaymentHistoryRepository, PlanRepository, ProfileRepository,
    SubscriptionRepository, WebhookEventRepository, WebhookResult,
};

use super::dto::{
    CatalogSyncResponse, CheckoutResponse, CreateCheckoutRequest, CurrentSubscriptionResponse,
    ErrorResponse, LimitCheckParams, LimitCheckResponse, PaymentHistoryParams,
    PaymentHistoryResponse, PaymentResponse, PlanResponse, PlansResponse, PortalResponse,
    SubscriptionActionResponse, UsageResponse, WebhookAckResponse,
};

/// Header carrying the Stripe webhook signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// URLs handed to hosted gateway pages plus the payment history cap.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub portal_return_url: String,
    pub payment_history_limit: u32,
}

impl From<&PaymentConfig> for BillingSettings {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            checkout_success_url: config.checkout_success_url.clone(),
            checkout_cancel_url: config.checkout_cancel_url.clone(),
            portal_return_url: config.portal_return_url.clone(),
            payment_history_limit: config.payment_history_limit,
        }
    }
}

/// Shared state for the billing routes.
///
/// Cloned per request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub payments: Arc<dyn PaymentHistoryRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub settings: BillingSettings,
}

impl BillingAppState {
    pub fn get_plans_handler(&self) -> GetPlansHandler {
        GetPlansHandler::new(self.plans.clone(), self.gateway.clone())
    }

    pub fn current_subscription_handler(&self) -> GetCurrentSubscriptionHandler {
        GetCurrentSubscriptionHandler::new(self.subscriptions.clone(), self.plans.clone())
    }

    pub fn checkout_handler(&self) -> CreateCheckoutSessionHandler {
        CreateCheckoutSessionHandler::new(
            self.subscriptions.clone(),
            self.plans.clone(),
            self.profiles.clone(),
            self.gateway.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.subscriptions.clone(), self.gateway.clone())
    }

    pub fn reactivate_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(self.subscriptions.clone(), self.gateway.clone())
    }

    pub fn portal_handler(&self) -> CreatePortalSessionHandler {
        CreatePortalSessionHandler::new(self.profiles.clone(), self.gateway.clone())
    }

    pub fn payment_history_handler(&self) -> GetPaymentHistoryHandler {
        GetPaymentHistoryHandler::new(self.profiles.clone(), self.gateway.clone())
    }

    pub fn check_limit_handler(&self) -> CheckPlanLimitHandler {
        CheckPlanLimitHandler::new(self.subscriptions.clone(), self.plans.clone())
    }

    pub fn record_custom_module_handler(&self) -> RecordCustomModuleHandler {
        RecordCustomModuleHandler::new(self.subscriptions.clone())
    }

    pub fn sync_catalog_handler(&self) -> SyncPlanCatalogHandler {
        SyncPlanCatalogHandler::new(self.plans.clone(), self.gateway.clone())
    }

    pub fn reconciler(&self) -> BillingEventReconciler {
        BillingEventReconciler::new(
            self.subscriptions.clone(),
            self.plans.clone(),
            self.payments.clone(),
            self.profiles.clone(),
            self.gateway.clone(),
        )
    }

    pub fn webhook_handler(&self) -> WebhookIntakeHandler {
        WebhookIntakeHandler::new(
            self.gateway.clone(),
            self.webhook_events.clone(),
            Arc::new(self.reconciler()),
        )
    }

    fn history_limit(&self, requested: Option<u32>) -> u32 {
        let max = self.settings.payment_history_limit;
        requested.map_or(max, |limit| limit.clamp(1, max))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity, taken from the `X-User-Id` header set by the upstream
/// auth proxy.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /billing/plans - List active plans, cheapest first
pub async fn get_plans(
    State(state): State<BillingAppState>,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state.get_plans_handler().handle(GetPlansQuery).await?;

    Ok(Json(PlansResponse {
        plans: result.plans.into_iter().map(PlanResponse::from).collect(),
    }))
}

/// GET /billing/subscription - Plan in effect plus the subscription row
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let query = GetCurrentSubscriptionQuery {
        user_id: user.user_id,
    };

    let result = state.current_subscription_handler().handle(query).await?;

    Ok(Json(CurrentSubscriptionResponse::from(result)))
}

/// GET /billing/payments - Recent gateway payments for the caller
pub async fn get_payment_history(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Query(params): Query<PaymentHistoryParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let query = GetPaymentHistoryQuery {
        user_id: user.user_id,
        limit: state.history_limit(params.limit),
    };

    let result = state.payment_history_handler().handle(query).await?;

    Ok(Json(PaymentHistoryResponse {
        payments: result.payments.into_iter().map(PaymentResponse::from).collect(),
    }))
}

/// GET /billing/limits/:resource?current=N - Whether one more resource is allowed
pub async fn check_limit(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(resource): Path<String>,
    Query(params): Query<LimitCheckParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let resource = resource
        .parse::<LimitedResource>()
        .map_err(|e| BillingError::validation("resource", e.to_string()))?;

    let query = CheckPlanLimitQuery {
        user_id: user.user_id,
        resource,
        current_count: params.current,
    };

    let decision = state.check_limit_handler().handle(query).await?;

    Ok(Json(LimitCheckResponse::from(decision)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/checkout - Start a hosted checkout for a plan
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateCheckoutSessionCommand {
        user_id: user.user_id,
        plan_id: request.plan_id,
        success_url: state.settings.checkout_success_url.clone(),
        cancel_url: state.settings.checkout_cancel_url.clone(),
    };

    let result = state.checkout_handler().handle(cmd).await?;

    let response = CheckoutResponse {
        session_id: result.session.id,
        checkout_url: result.session.url,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /billing/subscription/cancel - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CancelSubscriptionCommand {
        user_id: user.user_id,
    };

    let result = state.cancel_handler().handle(cmd).await?;

    Ok(Json(SubscriptionActionResponse::from(result)))
}

/// POST /billing/subscription/reactivate - Undo a pending cancellation
pub async fn reactivate_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ReactivateSubscriptionCommand {
        user_id: user.user_id,
    };

    let result = state.reactivate_handler().handle(cmd).await?;

    Ok(Json(SubscriptionActionResponse::from(result)))
}

/// POST /billing/portal - Open a customer portal session
pub async fn create_portal_session(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreatePortalSessionCommand {
        user_id: user.user_id,
        return_url: state.settings.portal_return_url.clone(),
    };

    let result = state.portal_handler().handle(cmd).await?;

    Ok(Json(PortalResponse {
        portal_url: result.session.url,
    }))
}

/// POST /billing/usage/custom-modules - Count one custom module against the period
pub async fn record_custom_module(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = RecordCustomModuleCommand {
        user_id: user.user_id,
    };

    let result = state.record_custom_module_handler().handle(cmd).await?;

    Ok(Json(UsageResponse {
        used_this_period: result.used_this_period,
    }))
}

/// POST /billing/plans/sync - Re-import the gateway catalog (admin only)
pub async fn sync_plans(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let profile = state
        .profiles
        .find_by_id(&user.user_id)
        .await?
        .ok_or_else(|| BillingError::user_not_found(user.user_id.to_string()))?;

    if profile.role != UserRole::Admin {
        return Err(BillingError::forbidden("Only admins can sync the plan catalog").into());
    }

    let result = state
        .sync_catalog_handler()
        .handle(SyncPlanCatalogCommand)
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        synced = result.plans.len(),
        "Plan catalog synced on request"
    );

    Ok(Json(CatalogSyncResponse::from(result)))
}

/// POST /webhooks/stripe - Verify and reconcile a Stripe event
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| BillingError::signature_invalid("Missing Stripe-Signature header"))?;

    let cmd = WebhookIntakeCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };

    let result = state.webhook_handler().handle(cmd).await?;

    Ok(Json(WebhookAckResponse {
        received: true,
        duplicate: result == WebhookResult::AlreadyProcessed,
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl BillingApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            BillingErrorKind::NotFound => StatusCode::NOT_FOUND,
            BillingErrorKind::Conflict => StatusCode::CONFLICT,
            BillingErrorKind::Forbidden => StatusCode::FORBIDDEN,
            BillingErrorKind::InvalidState
            | BillingErrorKind::Validation
            | BillingErrorKind::SignatureInvalid => StatusCode::BAD_REQUEST,
            BillingErrorKind::UpstreamFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(BillingError::from(err))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Billing request failed");
        }

        let body = ErrorResponse::new(self.0.code(), self.0.message());
        (status, Json(body)).into_response()
    }
}
