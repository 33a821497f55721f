//! SyncPlanCatalogHandler - refreshes the local plan table from the gateway catalog.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::domain::billing::{BillingError, BillingInterval, PlanLimits, SubscriptionPlan};
use crate::ports::{CatalogPrice, PaymentGateway, PlanRepository};

/// Command to pull the gateway price list into the plan table.
#[derive(Debug, Clone, Default)]
pub struct SyncPlanCatalogCommand;

#[derive(Debug, Clone)]
pub struct SyncPlanCatalogResult {
    pub plans: Vec<SubscriptionPlan>,
}

impl SyncPlanCatalogResult {
    pub fn active_count(&self) -> usize {
        self.plans.iter().filter(|p| p.active).count()
    }
}

/// Upserts one plan per gateway price.
///
/// Prices the gateway reports inactive are stored with `active = false`; plans
/// are never deleted, so historical subscriptions keep resolving.
pub struct SyncPlanCatalogHandler {
    plans: Arc<dyn PlanRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SyncPlanCatalogHandler {
    pub fn new(plans: Arc<dyn PlanRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { plans, gateway }
    }

    pub async fn handle(
        &self,
        _cmd: SyncPlanCatalogCommand,
    ) -> Result<SyncPlanCatalogResult, BillingError> {
        let prices = self.gateway.list_catalog_prices().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to list gateway catalog");
            BillingError::from(e)
        })?;

        let plans: Vec<SubscriptionPlan> = prices.into_iter().map(plan_from_price).collect();

        try_join_all(plans.iter().map(|plan| self.plans.upsert(plan))).await?;

        let result = SyncPlanCatalogResult { plans };
        tracing::info!(
            synced = result.plans.len(),
            active = result.active_count(),
            "Plan catalog synced"
        );
        Ok(result)
    }
}

/// Maps a gateway price onto a plan, applying metadata defaults.
pub fn plan_from_price(price: CatalogPrice) -> SubscriptionPlan {
    let metadata = &price.product.metadata;
    SubscriptionPlan {
        tier: SubscriptionPlan::tier_from_metadata(metadata),
        limits: PlanLimits::from_metadata(metadata),
        interval: BillingInterval::parse(price.interval.as_deref().unwrap_or("month")),
        price_cents: price.unit_amount.unwrap_or(0),
        id: price.id,
        name: price.product.name,
        description: price.product.description,
        currency: price.currency,
        active: price.active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPlanRepository;
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::PlanTier;
    use crate::ports::{CatalogProduct, GatewayError};
    use std::collections::HashMap;

    fn price(id: &str, active: bool, metadata: &[(&str, &str)]) -> CatalogPrice {
        CatalogPrice {
            id: id.to_string(),
            active,
            unit_amount: Some(1500),
            currency: "usd".to_string(),
            interval: Some("year".to_string()),
            product: CatalogProduct {
                name: "Classroom".to_string(),
                description: Some("For one classroom".to_string()),
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
            },
        }
    }

    #[test]
    fn price_metadata_maps_to_limits() {
        let plan = plan_from_price(price(
            "price_pro",
            true,
            &[("tier", "pro"), ("studentLimit", "40"), ("customModuleLimit", "12")],
        ));

        assert_eq!(plan.tier, PlanTier::Pro);
        assert_eq!(plan.limits.student_limit, 40);
        assert_eq!(plan.limits.module_limit, 3);
        assert_eq!(plan.limits.custom_module_limit, 12);
        assert_eq!(plan.interval, BillingInterval::Year);
        assert_eq!(plan.price_cents, 1500);
    }

    #[test]
    fn missing_metadata_defaults_to_free() {
        let plan = plan_from_price(price("price_x", true, &[]));
        assert_eq!(plan.tier, PlanTier::Free);
        assert_eq!(plan.limits, PlanLimits::default());
    }

    #[tokio::test]
    async fn inactive_prices_are_deactivated_not_dropped() {
        let plans = Arc::new(InMemoryPlanRepository::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.set_catalog(vec![
            price("price_home", true, &[("tier", "home")]),
            price("price_old", false, &[("tier", "home")]),
        ]);
        let handler = SyncPlanCatalogHandler::new(plans.clone(), gateway);

        let result = handler.handle(SyncPlanCatalogCommand).await.unwrap();

        assert_eq!(result.plans.len(), 2);
        assert_eq!(result.active_count(), 1);
        let old = plans.find_by_id("price_old").await.unwrap().unwrap();
        assert!(!old.active);
        assert_eq!(plans.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gateway_failure_is_upstream_failure() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.fail_method("list_catalog_prices", GatewayError::provider("503"));
        let handler = SyncPlanCatalogHandler::new(Arc::new(InMemoryPlanRepository::new()), gateway);

        let err = handler.handle(SyncPlanCatalogCommand).await.unwrap_err();
        assert!(matches!(err, BillingError::UpstreamFailure(_)));
    }
}
