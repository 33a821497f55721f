//! GetCurrentSubscriptionHandler - the user's plan and subscription, free plan by default.

use std::sync::Arc;

use crate::domain::billing::{BillingError, CustomerSubscription, PlanTier, SubscriptionPlan};
use crate::domain::foundation::UserId;
use crate::ports::{PlanRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct GetCurrentSubscriptionQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct GetCurrentSubscriptionResult {
    pub plan: SubscriptionPlan,
    /// `None` when the user has never subscribed.
    pub subscription: Option<CustomerSubscription>,
}

pub struct GetCurrentSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl GetCurrentSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
        }
    }

    pub async fn handle(
        &self,
        query: GetCurrentSubscriptionQuery,
    ) -> Result<GetCurrentSubscriptionResult, BillingError> {
        let subscription = match self.subscriptions.find_by_user(&query.user_id).await? {
            Some(subscription) => subscription,
            None => {
                return Ok(GetCurrentSubscriptionResult {
                    plan: free_plan(self.plans.as_ref()).await?,
                    subscription: None,
                })
            }
        };

        let plan = self
            .plans
            .find_by_id(&subscription.plan_id)
            .await?
            .ok_or_else(|| BillingError::plan_not_found(&subscription.plan_id))?;

        Ok(GetCurrentSubscriptionResult {
            plan,
            subscription: Some(subscription),
        })
    }
}

/// Loads the seeded free plan. Its absence is a catalog seed defect.
pub(crate) async fn free_plan(plans: &dyn PlanRepository) -> Result<SubscriptionPlan, BillingError> {
    match plans.find_active_by_tier(&PlanTier::Free).await? {
        Some(plan) => Ok(plan),
        None => {
            tracing::error!("Free plan is missing from the catalog");
            Err(BillingError::FreePlanMissing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPlanRepository;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{BillingErrorKind, SubscriptionStatus};

    fn handler(h: &Harness) -> GetCurrentSubscriptionHandler {
        GetCurrentSubscriptionHandler::new(h.subscriptions.clone(), h.plans.clone())
    }

    fn query() -> GetCurrentSubscriptionQuery {
        GetCurrentSubscriptionQuery { user_id: user_id() }
    }

    #[tokio::test]
    async fn user_without_subscription_gets_free_plan() {
        let h = Harness::new();

        let result = handler(&h).handle(query()).await.unwrap();

        assert_eq!(result.plan.tier, PlanTier::Free);
        assert!(result.subscription.is_none());
    }

    #[tokio::test]
    async fn subscribed_user_gets_their_plan() {
        let h = Harness::new();
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;

        let result = handler(&h).handle(query()).await.unwrap();

        assert_eq!(result.plan.id, HOME_PLAN);
        assert_eq!(result.subscription.unwrap().id, "sub_1");
    }

    #[tokio::test]
    async fn canceled_subscription_is_still_reported() {
        let h = Harness::new();
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Canceled))
            .await;

        let result = handler(&h).handle(query()).await.unwrap();

        assert_eq!(
            result.subscription.unwrap().status,
            SubscriptionStatus::Canceled
        );
    }

    #[tokio::test]
    async fn missing_free_plan_is_not_found() {
        let h = Harness::new();
        let handler = GetCurrentSubscriptionHandler::new(
            h.subscriptions.clone(),
            Arc::new(InMemoryPlanRepository::new()),
        );

        let err = handler.handle(query()).await.unwrap_err();

        assert_eq!(err, BillingError::FreePlanMissing);
        assert_eq!(err.kind(), BillingErrorKind::NotFound);
    }
}
