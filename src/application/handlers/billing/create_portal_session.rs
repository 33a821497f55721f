//! CreatePortalSessionHandler - opens the gateway's self-service billing portal.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{PaymentGateway, PortalSession, ProfileRepository};

#[derive(Debug, Clone)]
pub struct CreatePortalSessionCommand {
    pub user_id: UserId,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatePortalSessionResult {
    pub session: PortalSession,
}

pub struct CreatePortalSessionHandler {
    profiles: Arc<dyn ProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CreatePortalSessionHandler {
    pub fn new(profiles: Arc<dyn ProfileRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { profiles, gateway }
    }

    pub async fn handle(
        &self,
        cmd: CreatePortalSessionCommand,
    ) -> Result<CreatePortalSessionResult, BillingError> {
        let profile = self
            .profiles
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::user_not_found(cmd.user_id.to_string()))?;

        if !profile.role.can_hold_billing() {
            return Err(BillingError::forbidden("Students cannot manage billing"));
        }

        let customer_id = profile
            .customer_id
            .ok_or_else(|| BillingError::not_found("Billing account for user", cmd.user_id.to_string()))?;

        let session = self
            .gateway
            .create_portal_session(&customer_id, &cmd.return_url)
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %cmd.user_id,
                    customer_id = %customer_id,
                    error = %e,
                    "Failed to create portal session"
                );
                BillingError::from(e)
            })?;

        Ok(CreatePortalSessionResult { session })
    }
}
