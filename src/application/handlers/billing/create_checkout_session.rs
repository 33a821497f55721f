//! CreateCheckoutSessionHandler - starts a hosted checkout for a plan.

use std::sync::Arc;

use crate::domain::billing::{BillingError, UserProfile};
use crate::domain::foundation::UserId;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, PaymentGateway, PlanRepository,
    ProfileRepository, SubscriptionRepository,
};

#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionCommand {
    pub user_id: UserId,
    pub plan_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionResult {
    pub session: CheckoutSession,
    /// Gateway customer the session bills.
    pub customer_id: String,
}

/// Handler for starting checkout.
///
/// Buying a plan the user already holds live (active or trialing) is a
/// conflict. A row stuck in `incomplete` for the same plan does not block a
/// retry, and its customer is reused.
pub struct CreateCheckoutSessionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    profiles: Arc<dyn ProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CreateCheckoutSessionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        profiles: Arc<dyn ProfileRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            profiles,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutSessionCommand,
    ) -> Result<CreateCheckoutSessionResult, BillingError> {
        if cmd.plan_id.trim().is_empty() {
            return Err(BillingError::validation("plan_id", "must not be empty"));
        }

        // 1. Plan and profile must exist
        let plan = self
            .plans
            .find_by_id(&cmd.plan_id)
            .await?
            .filter(|plan| plan.active)
            .ok_or_else(|| BillingError::plan_not_found(&cmd.plan_id))?;

        let profile = self
            .profiles
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::user_not_found(cmd.user_id.to_string()))?;

        if !profile.role.can_hold_billing() {
            return Err(BillingError::forbidden("Students cannot purchase subscriptions"));
        }

        // 2. Reject a second live subscription to the same plan
        let existing = self.subscriptions.find_by_user(&cmd.user_id).await?;
        if let Some(existing) = &existing {
            if existing.is_live_for_plan(&plan.id) {
                return Err(BillingError::conflict(format!(
                    "Already subscribed to plan {}",
                    plan.id
                )));
            }
        }

        // 3. Pick the gateway customer
        let customer_id = match existing {
            Some(existing) => existing.customer_id,
            None => self.customer_for_profile(&profile).await?,
        };

        // 4. Open the session
        let session = self
            .gateway
            .create_checkout_session(CreateCheckoutRequest {
                user_id: cmd.user_id.clone(),
                customer_id: customer_id.clone(),
                price_id: plan.id.clone(),
                success_url: cmd.success_url,
                cancel_url: cmd.cancel_url,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %cmd.user_id,
                    plan_id = %plan.id,
                    error = %e,
                    "Failed to create checkout session"
                );
                BillingError::from(e)
            })?;

        tracing::info!(
            user_id = %cmd.user_id,
            plan_id = %plan.id,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CreateCheckoutSessionResult {
            session,
            customer_id,
        })
    }

    /// Stored customer id, or a new gateway customer linked to the profile.
    async fn customer_for_profile(&self, profile: &UserProfile) -> Result<String, BillingError> {
        if let Some(customer_id) = &profile.customer_id {
            return Ok(customer_id.clone());
        }

        let customer = self
            .gateway
            .create_customer(CreateCustomerRequest {
                user_id: profile.id.clone(),
                email: profile.email.clone(),
                name: profile.display_name.clone(),
            })
            .await
            .map_err(|e| {
                tracing::error!(user_id = %profile.id, error = %e, "Failed to create gateway customer");
                BillingError::from(e)
            })?;

        self.profiles.set_customer_id(&profile.id, &customer.id).await?;
        tracing::info!(user_id = %profile.id, customer_id = %customer.id, "Linked gateway customer");

        Ok(customer.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{BillingErrorKind, SubscriptionStatus, UserRole};
    use crate::ports::GatewayError;

    fn handler(h: &Harness) -> CreateCheckoutSessionHandler {
        CreateCheckoutSessionHandler::new(
            h.subscriptions.clone(),
            h.plans.clone(),
            h.profiles.clone(),
            h.gateway.clone(),
        )
    }

    fn command(plan_id: &str) -> CreateCheckoutSessionCommand {
        CreateCheckoutSessionCommand {
            user_id: user_id(),
            plan_id: plan_id.to_string(),
            success_url: "https://app.test/billing/success".to_string(),
            cancel_url: "https://app.test/billing/plans".to_string(),
        }
    }

    #[tokio::test]
    async fn new_customer_is_created_and_linked() {
        let h = Harness::new().with_profile(UserRole::Teacher, None).await;

        let result = handler(&h).handle(command(HOME_PLAN)).await.unwrap();

        assert_eq!(result.customer_id, "cus_mock_1");
        assert!(result.session.url.starts_with("https://checkout.stripe.test/"));
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.customer_id.as_deref(), Some("cus_mock_1"));
    }

    #[tokio::test]
    async fn stored_customer_is_reused() {
        let h = Harness::new().with_profile(UserRole::Parent, Some("cus_saved")).await;

        let result = handler(&h).handle(command(HOME_PLAN)).await.unwrap();

        assert_eq!(result.customer_id, "cus_saved");
        assert!(!h.gateway.was_called("create_customer"));
    }

    #[tokio::test]
    async fn incomplete_subscription_allows_retry_with_same_customer() {
        let h = Harness::new().with_profile(UserRole::Teacher, Some("cus_profile")).await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Incomplete))
            .await;

        let result = handler(&h).handle(command(HOME_PLAN)).await.unwrap();

        assert_eq!(result.customer_id, CUSTOMER);
        let calls = h.gateway.calls_to("create_checkout_session");
        assert_eq!(calls[0].args[1], CUSTOMER);
    }

    #[tokio::test]
    async fn active_subscription_to_same_plan_conflicts() {
        let h = Harness::new().with_profile(UserRole::Teacher, Some(CUSTOMER)).await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;

        let err = handler(&h).handle(command(HOME_PLAN)).await.unwrap_err();

        assert_eq!(err.kind(), BillingErrorKind::Conflict);
        assert!(!h.gateway.was_called("create_checkout_session"));
    }

    #[tokio::test]
    async fn active_subscription_to_other_plan_allows_switch() {
        let h = Harness::new().with_profile(UserRole::Teacher, Some(CUSTOMER)).await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;

        assert!(handler(&h).handle(command(PRO_PLAN)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_plan_is_not_found() {
        let h = Harness::new().with_profile(UserRole::Teacher, None).await;

        let err = handler(&h).handle(command("price_missing")).await.unwrap_err();

        assert_eq!(err, BillingError::plan_not_found("price_missing"));
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let h = Harness::new();
        let err = handler(&h).handle(command(HOME_PLAN)).await.unwrap_err();
        assert_eq!(err.kind(), BillingErrorKind::NotFound);
    }

    #[tokio::test]
    async fn students_cannot_check_out() {
        let h = Harness::new().with_profile(UserRole::Student, None).await;
        let err = handler(&h).handle(command(HOME_PLAN)).await.unwrap_err();
        assert_eq!(err.kind(), BillingErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn gateway_failure_is_upstream_failure() {
        let h = Harness::new().with_profile(UserRole::Teacher, Some(CUSTOMER)).await;
        h.gateway
            .fail_method("create_checkout_session", GatewayError::network("reset"));

        let err = handler(&h).handle(command(HOME_PLAN)).await.unwrap_err();
        assert_eq!(err.kind(), BillingErrorKind::UpstreamFailure);
    }
}
