//! GetPlansHandler - lists active plans, seeding from the gateway when empty.

use std::sync::Arc;

use super::sync_plan_catalog::{SyncPlanCatalogCommand, SyncPlanCatalogHandler};
use crate::domain::billing::{BillingError, SubscriptionPlan};
use crate::ports::{PaymentGateway, PlanRepository};

#[derive(Debug, Clone, Default)]
pub struct GetPlansQuery;

#[derive(Debug, Clone)]
pub struct GetPlansResult {
    pub plans: Vec<SubscriptionPlan>,
}

/// Concurrent callers hitting an empty table may both sync. The sync is an
/// idempotent upsert, so the second run only rewrites the same rows.
pub struct GetPlansHandler {
    plans: Arc<dyn PlanRepository>,
    sync: SyncPlanCatalogHandler,
}

impl GetPlansHandler {
    pub fn new(plans: Arc<dyn PlanRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            sync: SyncPlanCatalogHandler::new(plans.clone(), gateway),
            plans,
        }
    }

    pub async fn handle(&self, _query: GetPlansQuery) -> Result<GetPlansResult, BillingError> {
        let plans = self.plans.list_active().await?;
        if !plans.is_empty() {
            return Ok(GetPlansResult { plans });
        }

        tracing::info!("No plans stored, syncing catalog from gateway");
        self.sync.handle(SyncPlanCatalogCommand).await?;

        Ok(GetPlansResult {
            plans: self.plans.list_active().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::adapters::memory::InMemoryPlanRepository;
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::ports::{CatalogPrice, CatalogProduct};
    use std::collections::HashMap;

    #[tokio::test]
    async fn stored_plans_are_returned_without_sync() {
        let h = Harness::new();
        let handler = GetPlansHandler::new(h.plans.clone(), h.gateway.clone());

        let result = handler.handle(GetPlansQuery).await.unwrap();

        assert_eq!(result.plans.len(), 3);
        assert_eq!(result.plans[0].id, "free");
        assert!(!h.gateway.was_called("list_catalog_prices"));
    }

    #[tokio::test]
    async fn empty_table_triggers_one_sync() {
        let plans = Arc::new(InMemoryPlanRepository::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.set_catalog(vec![CatalogPrice {
            id: "price_home".to_string(),
            active: true,
            unit_amount: Some(799),
            currency: "usd".to_string(),
            interval: Some("month".to_string()),
            product: CatalogProduct {
                name: "Home".to_string(),
                description: None,
                metadata: HashMap::from([("tier".to_string(), "home".to_string())]),
            },
        }]);
        let handler = GetPlansHandler::new(plans, gateway.clone());

        let first = handler.handle(GetPlansQuery).await.unwrap();
        let second = handler.handle(GetPlansQuery).await.unwrap();

        assert_eq!(first.plans.len(), 1);
        assert_eq!(second.plans.len(), 1);
        assert_eq!(gateway.calls_to("list_catalog_prices").len(), 1);
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_list() {
        let handler = GetPlansHandler::new(
            Arc::new(InMemoryPlanRepository::new()),
            Arc::new(MockPaymentGateway::new()),
        );
        assert!(handler.handle(GetPlansQuery).await.unwrap().plans.is_empty());
    }
}
