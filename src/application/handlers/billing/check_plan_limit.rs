//! CheckPlanLimitHandler - may the user create one more limited resource?

use std::sync::Arc;

use super::get_current_subscription::free_plan;
use crate::domain::billing::{BillingError, Entitlements, LimitDecision, LimitedResource};
use crate::domain::foundation::UserId;
use crate::ports::{PlanRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct CheckPlanLimitQuery {
    pub user_id: UserId,
    pub resource: LimitedResource,
    /// How many of `resource` the user owns now. For custom modules this is
    /// only used when no subscription grants access.
    pub current_count: u32,
}

/// The effective plan is the subscribed plan while the subscription grants
/// access (active, trialing or past due) and the free plan otherwise.
pub struct CheckPlanLimitHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl CheckPlanLimitHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
        }
    }

    pub async fn handle(&self, query: CheckPlanLimitQuery) -> Result<LimitDecision, BillingError> {
        let entitlements = self.entitlements(&query).await?;
        let decision = entitlements.check(query.resource, query.current_count);

        if !decision.allowed {
            tracing::debug!(
                user_id = %query.user_id,
                resource = %decision.resource,
                limit = decision.limit,
                used = decision.used,
                "Plan limit reached"
            );
        }

        Ok(decision)
    }

    async fn entitlements(&self, query: &CheckPlanLimitQuery) -> Result<Entitlements, BillingError> {
        let subscription = self
            .subscriptions
            .find_by_user(&query.user_id)
            .await?
            .filter(|s| s.status.grants_access());

        if let Some(subscription) = subscription {
            match self.plans.find_by_id(&subscription.plan_id).await? {
                Some(plan) => {
                    return Ok(Entitlements {
                        tier: plan.tier,
                        limits: plan.limits,
                        custom_modules_this_period: subscription.custom_modules_this_period,
                    })
                }
                None => tracing::warn!(
                    user_id = %query.user_id,
                    plan_id = %subscription.plan_id,
                    "Subscribed plan missing from catalog, using free limits"
                ),
            }
        }

        let plan = free_plan(self.plans.as_ref()).await?;
        Ok(Entitlements {
            tier: plan.tier,
            limits: plan.limits,
            custom_modules_this_period: query.current_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{PlanTier, SubscriptionStatus};

    fn handler(h: &Harness) -> CheckPlanLimitHandler {
        CheckPlanLimitHandler::new(h.subscriptions.clone(), h.plans.clone())
    }

    fn query(resource: LimitedResource, current_count: u32) -> CheckPlanLimitQuery {
        CheckPlanLimitQuery {
            user_id: user_id(),
            resource,
            current_count,
        }
    }

    #[tokio::test]
    async fn free_user_gets_default_limits() {
        let h = Harness::new();

        let decision = handler(&h)
            .handle(query(LimitedResource::Students, 3))
            .await
            .unwrap();

        assert_eq!(decision.tier, PlanTier::Free);
        assert_eq!(decision.limit, 3);
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn subscriber_uses_plan_limits_and_period_counter() {
        let h = Harness::new();
        let mut sub = subscription("sub_1", HOME_PLAN, SubscriptionStatus::PastDue);
        sub.custom_modules_this_period = 5;
        h.subscriptions.insert(sub).await;

        let students = handler(&h)
            .handle(query(LimitedResource::Students, 3))
            .await
            .unwrap();
        let custom = handler(&h)
            .handle(query(LimitedResource::CustomModules, 0))
            .await
            .unwrap();

        assert!(students.allowed);
        assert_eq!(students.tier, PlanTier::Home);
        assert_eq!(custom.used, 5);
        assert!(!custom.allowed);
    }

    #[tokio::test]
    async fn canceled_subscription_falls_back_to_free() {
        let h = Harness::new();
        h.subscriptions
            .insert(subscription("sub_1", PRO_PLAN, SubscriptionStatus::Canceled))
            .await;

        let decision = handler(&h)
            .handle(query(LimitedResource::Modules, 2))
            .await
            .unwrap();

        assert_eq!(decision.tier, PlanTier::Free);
        assert!(decision.allowed);
    }
}
