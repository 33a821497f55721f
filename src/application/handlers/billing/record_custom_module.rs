//! RecordCustomModuleHandler - counts a custom module against the current period.
//!
//! The increment is a single atomic update but races with the renewal reset:
//! a module created while a renewal invoice is being reconciled may land in
//! either period.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct RecordCustomModuleCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCustomModuleResult {
    /// Counter after the increment, or `None` when no subscription grants
    /// access and there is nothing to count against.
    pub used_this_period: Option<u32>,
}

pub struct RecordCustomModuleHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl RecordCustomModuleHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(
        &self,
        cmd: RecordCustomModuleCommand,
    ) -> Result<RecordCustomModuleResult, BillingError> {
        let subscription = self
            .subscriptions
            .find_by_user(&cmd.user_id)
            .await?
            .filter(|s| s.status.grants_access());

        let used_this_period = match subscription {
            Some(subscription) => {
                self.subscriptions
                    .increment_period_usage(&subscription.id)
                    .await?
            }
            None => {
                tracing::debug!(user_id = %cmd.user_id, "No paid subscription, custom module not counted");
                None
            }
        };

        Ok(RecordCustomModuleResult { used_this_period })
    }
}
