//! CancelSubscriptionHandler - asks the gateway to cancel at period end.
//!
//! Local state is not touched here. The gateway's `customer.subscription.updated`
//! event carries the new flag back through the reconciler.

use std::sync::Arc;

use crate::domain::billing::{BillingError, CustomerSubscription};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{GatewaySubscription, PaymentGateway, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription_id: String,
    /// When access ends, as reported by the gateway.
    pub effective_at: Option<Timestamp>,
}

pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let subscription = self
            .subscriptions
            .find_by_user(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::subscription_not_found(cmd.user_id.to_string()))?;

        if !subscription.can_cancel() {
            return Err(BillingError::invalid_state(
                "cancel subscription",
                format!("subscription is {}", subscription.status),
            ));
        }

        let updated = request_cancel_flag(self.gateway.as_ref(), &cmd.user_id, &subscription, true)
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription.id,
            "Cancellation at period end requested"
        );

        Ok(CancelSubscriptionResult {
            subscription_id: subscription.id,
            effective_at: updated.current_period_end,
        })
    }
}

/// Sets `cancel_at_period_end` at the gateway, logging failures with the
/// user and subscription they concern.
pub(crate) async fn request_cancel_flag(
    gateway: &dyn PaymentGateway,
    user_id: &UserId,
    subscription: &CustomerSubscription,
    cancel_at_period_end: bool,
) -> Result<GatewaySubscription, BillingError> {
    gateway
        .set_cancel_at_period_end(&subscription.id, cancel_at_period_end)
        .await
        .map_err(|e| {
            tracing::error!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                cancel_at_period_end,
                error = %e,
                "Gateway rejected cancellation change"
            );
            BillingError::from(e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{BillingErrorKind, SubscriptionStatus};
    use crate::ports::GatewayError;

    fn handler(h: &Harness) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(h.subscriptions.clone(), h.gateway.clone())
    }

    fn command() -> CancelSubscriptionCommand {
        CancelSubscriptionCommand { user_id: user_id() }
    }

    async fn seed(h: &Harness, status: SubscriptionStatus) {
        let sub = subscription("sub_1", HOME_PLAN, status);
        h.gateway.add_subscription(GatewaySubscription {
            id: sub.id.clone(),
            customer_id: sub.customer_id.clone(),
            status: status.to_string(),
            price_id: Some(HOME_PLAN.to_string()),
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: false,
        });
        h.subscriptions.insert(sub).await;
    }

    #[tokio::test]
    async fn active_subscription_is_cancelled_at_gateway_only() {
        let h = Harness::new();
        seed(&h, SubscriptionStatus::Active).await;

        let result = handler(&h).handle(command()).await.unwrap();

        assert_eq!(result.subscription_id, "sub_1");
        assert!(result.effective_at.is_some());
        let calls = h.gateway.calls_to("set_cancel_at_period_end");
        assert_eq!(calls[0].args, vec!["sub_1".to_string(), "true".to_string()]);
        let local = h.subscriptions.find_by_id("sub_1").await.unwrap().unwrap();
        assert!(!local.cancel_at_period_end);
    }

    #[tokio::test]
    async fn no_subscription_is_not_found() {
        let h = Harness::new();
        let err = handler(&h).handle(command()).await.unwrap_err();
        assert_eq!(err.kind(), BillingErrorKind::NotFound);
    }

    #[tokio::test]
    async fn past_due_subscription_cannot_cancel() {
        let h = Harness::new();
        seed(&h, SubscriptionStatus::PastDue).await;

        let err = handler(&h).handle(command()).await.unwrap_err();

        assert_eq!(err.kind(), BillingErrorKind::InvalidState);
        assert!(!h.gateway.was_called("set_cancel_at_period_end"));
    }

    #[tokio::test]
    async fn gateway_failure_is_upstream_failure() {
        let h = Harness::new();
        seed(&h, SubscriptionStatus::Active).await;
        h.gateway
            .fail_method("set_cancel_at_period_end", GatewayError::provider("500"));

        let err = handler(&h).handle(command()).await.unwrap_err();
        assert_eq!(err.kind(), BillingErrorKind::UpstreamFailure);
    }
}
