//! GetPaymentHistoryHandler - recent gateway payments for the user's customer.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{GatewayPayment, PaymentGateway, ProfileRepository};

#[derive(Debug, Clone)]
pub struct GetPaymentHistoryQuery {
    pub user_id: UserId,
    pub limit: u32,
}

#[derive(Debug, Clone, Default)]
pub struct GetPaymentHistoryResult {
    pub payments: Vec<GatewayPayment>,
}

/// No linked customer means no history, which is an empty list rather than
/// an error.
pub struct GetPaymentHistoryHandler {
    profiles: Arc<dyn ProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl GetPaymentHistoryHandler {
    pub fn new(profiles: Arc<dyn ProfileRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { profiles, gateway }
    }

    pub async fn handle(
        &self,
        query: GetPaymentHistoryQuery,
    ) -> Result<GetPaymentHistoryResult, BillingError> {
        let customer_id = match self.profiles.find_by_id(&query.user_id).await? {
            Some(profile) => profile.customer_id,
            None => None,
        };
        let customer_id = match customer_id {
            Some(customer_id) => customer_id,
            None => return Ok(GetPaymentHistoryResult::default()),
        };

        let payments = self
            .gateway
            .list_payment_intents(&customer_id, query.limit)
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %query.user_id,
                    customer_id = %customer_id,
                    error = %e,
                    "Failed to list payments"
                );
                BillingError::from(e)
            })?;

        Ok(GetPaymentHistoryResult { payments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::UserRole;

    fn query(limit: u32) -> GetPaymentHistoryQuery {
        GetPaymentHistoryQuery {
            user_id: user_id(),
            limit,
        }
    }

    fn payment(id: &str) -> GatewayPayment {
        GatewayPayment {
            id: id.to_string(),
            amount_cents: 999,
            currency: "usd".to_string(),
            status: "succeeded".to_string(),
            description: Some("Subscription update".to_string()),
            receipt_url: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn no_customer_returns_empty_list() {
        let h = Harness::new().with_profile(UserRole::Teacher, None).await;
        let handler = GetPaymentHistoryHandler::new(h.profiles.clone(), h.gateway.clone());

        let result = handler.handle(query(20)).await.unwrap();

        assert!(result.payments.is_empty());
        assert!(!h.gateway.was_called("list_payment_intents"));
    }

    #[tokio::test]
    async fn payments_are_listed_with_limit() {
        let h = Harness::new().with_profile(UserRole::Teacher, Some(CUSTOMER)).await;
        h.gateway
            .set_payments(CUSTOMER, vec![payment("pi_1"), payment("pi_2"), payment("pi_3")]);
        let handler = GetPaymentHistoryHandler::new(h.profiles.clone(), h.gateway.clone());

        let result = handler.handle(query(2)).await.unwrap();

        assert_eq!(result.payments.len(), 2);
        assert_eq!(result.payments[0].id, "pi_1");
    }
}
