//! Plan catalog repository port.

use async_trait::async_trait;

use crate::domain::billing::{PlanTier, SubscriptionPlan};
use crate::domain::foundation::DomainError;

/// Repository port for `SubscriptionPlan` rows.
///
/// Plans are written only by the catalog sync and seed data. They are never
/// deleted; a plan leaves the catalog by being upserted with `active = false`.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Active plans ordered by price, cheapest first.
    async fn list_active(&self) -> Result<Vec<SubscriptionPlan>, DomainError>;

    /// Insert or replace a plan keyed by its id.
    async fn upsert(&self, plan: &SubscriptionPlan) -> Result<(), DomainError>;

    /// Find a plan by id, active or not.
    async fn find_by_id(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, DomainError>;

    /// Find the first active plan with this tier.
    async fn find_active_by_tier(
        &self,
        tier: &PlanTier,
    ) -> Result<Option<SubscriptionPlan>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn PlanRepository) {}
    }
}
