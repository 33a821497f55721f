//! ReactivateSubscriptionHandler - withdraws a scheduled cancellation.

use std::sync::Arc;

use super::cancel_subscription::request_cancel_flag;
use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{PaymentGateway, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionResult {
    pub subscription_id: String,
}

/// Like cancellation, only the gateway is asked; the local row converges
/// when the resulting update event is reconciled.
pub struct ReactivateSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ReactivateSubscriptionHandler {
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
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<ReactivateSubscriptionResult, BillingError> {
        let subscription = self
            .subscriptions
            .find_by_user(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::subscription_not_found(cmd.user_id.to_string()))?;

        if !subscription.can_reactivate() {
            let reason = if subscription.cancel_at_period_end {
                format!("subscription is {}", subscription.status)
            } else {
                "subscription is not scheduled for cancellation".to_string()
            };
            return Err(BillingError::invalid_state("reactivate subscription", reason));
        }

        request_cancel_flag(self.gateway.as_ref(), &cmd.user_id, &subscription, false).await?;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription.id,
            "Scheduled cancellation withdrawn"
        );

        Ok(ReactivateSubscriptionResult {
            subscription_id: subscription.id,
        })
    }
}
