//! In-memory plan catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{PlanTier, SubscriptionPlan};
use crate::domain::foundation::DomainError;
use crate::ports::PlanRepository;

#[derive(Default)]
pub struct InMemoryPlanRepository {
    plans: RwLock<HashMap<String, SubscriptionPlan>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = SubscriptionPlan>) -> Self {
        Self {
            plans: RwLock::new(plans.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn list_active(&self) -> Result<Vec<SubscriptionPlan>, DomainError> {
        let plans = self.plans.read().await;
        let mut active: Vec<SubscriptionPlan> =
            plans.values().filter(|p| p.active).cloned().collect();
        active.sort_by(|a, b| a.price_cents.cmp(&b.price_cents).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn upsert(&self, plan: &SubscriptionPlan) -> Result<(), DomainError> {
        self.plans
            .write()
            .await
            .insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn find_by_id(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self.plans.read().await.get(plan_id).cloned())
    }

    async fn find_active_by_tier(
        &self,
        tier: &PlanTier,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self
            .list_active()
            .await?
            .into_iter()
            .find(|p| &p.tier == tier))
    }
}
