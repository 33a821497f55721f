//! WebhookIntakeHandler - verifies, deduplicates and reconciles gateway webhooks.
//!
//! Steps:
//! 1. Verify the signature and parse the payload through the gateway port
//! 2. Skip events already recorded with a final outcome
//! 3. Run the reconciler
//! 4. Record the outcome (success, ignored or failed)
//!
//! Two concurrent deliveries of the same event race on the ledger insert; the
//! loser gets `AlreadyExists` and reports `AlreadyProcessed`. A `failed` record
//! is not final, so the gateway's next redelivery is processed again.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::reconciler::{BillingEventReconciler, ReconcileOutcome};
use crate::domain::billing::BillingError;
use crate::ports::{
    PaymentGateway, SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookResult,
};

/// Raw webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookIntakeCommand {
    pub payload: Vec<u8>,
    /// Value of the `Stripe-Signature` header.
    pub signature: String,
}

pub struct WebhookIntakeHandler {
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn WebhookEventRepository>,
    reconciler: Arc<BillingEventReconciler>,
}

impl WebhookIntakeHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn WebhookEventRepository>,
        reconciler: Arc<BillingEventReconciler>,
    ) -> Self {
        Self {
            gateway,
            events,
            reconciler,
        }
    }

    pub async fn handle(&self, cmd: WebhookIntakeCommand) -> Result<WebhookResult, BillingError> {
        let event = self
            .gateway
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected webhook with invalid signature");
                BillingError::signature_invalid(e.message)
            })?;

        if let Some(existing) = self.events.find_by_event_id(&event.id).await? {
            if existing.outcome.is_final() {
                tracing::debug!(
                    event_id = %event.id,
                    outcome = %existing.outcome,
                    "Webhook event already processed"
                );
                return Ok(WebhookResult::AlreadyProcessed);
            }
            tracing::info!(event_id = %event.id, "Retrying previously failed webhook event");
        }

        let outcome = self.reconciler.process_event(&event).await;

        let payload = serde_json::from_slice(&cmd.payload).unwrap_or(serde_json::Value::Null);
        let record = match &outcome {
            ReconcileOutcome::Applied => {
                WebhookEventRecord::success(&event.id, event.event_type(), payload)
            }
            ReconcileOutcome::Skipped { reason } => {
                WebhookEventRecord::ignored(&event.id, event.event_type(), reason, payload)
            }
            ReconcileOutcome::Ignored => WebhookEventRecord::ignored(
                &event.id,
                event.event_type(),
                "Unhandled event type",
                payload,
            ),
            ReconcileOutcome::Failed { error } => {
                WebhookEventRecord::failed(&event.id, event.event_type(), error, payload)
            }
        };

        match self.events.save(record).await? {
            SaveResult::Inserted => Ok(WebhookResult::Processed),
            SaveResult::AlreadyExists => Ok(WebhookResult::AlreadyProcessed),
        }
    }

    /// Drops ledger entries processed before `cutoff`. Returns how many were removed.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, BillingError> {
        let removed = self.events.delete_before(cutoff).await?;
        tracing::info!(removed, cutoff = %cutoff, "Purged webhook event ledger");
        Ok(removed)
    }
}
