//! BillingEventReconciler - applies verified gateway events to local billing state.
//!
//! Events may arrive out of order, more than once, or concurrently with other
//! deliveries for the same subscription. Each kind therefore maps to a single
//! idempotent storage primitive:
//!
//! - subscription created: insert-or-update keyed by the gateway subscription id
//! - subscription updated / deleted: conditional update, never an insert
//! - invoice events: insert-if-absent into the payment ledger
//!
//! The profile mirror is a separate, independently failing step. A mirror
//! failure is logged and never rolls back the subscription write.

use std::sync::Arc;

use crate::domain::billing::{
    failed_payment_record_id, map_gateway_status, payment_record_id, BillingError, BillingMirror,
    CheckoutCompleted, CustomerSubscription, GatewayEvent, GatewayEventKind, InvoiceSnapshot,
    PaymentRecord, PaymentStatus, RenewalUpdate, SubscriptionChange, SubscriptionSnapshot,
    SubscriptionStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    PaymentGateway, PaymentHistoryRepository, PlanRepository, ProfileRepository, SaveResult,
    SubscriptionRepository,
};

/// What processing one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local state changed (or was confirmed unchanged by an idempotent write).
    Applied,
    /// A precondition failed; nothing was written.
    Skipped { reason: String },
    /// The event kind is outside the modeled set.
    Ignored,
    /// A storage or gateway call failed part way through.
    Failed { error: String },
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied)
    }
}

pub struct BillingEventReconciler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    payments: Arc<dyn PaymentHistoryRepository>,
    profiles: Arc<dyn ProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl BillingEventReconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        payments: Arc<dyn PaymentHistoryRepository>,
        profiles: Arc<dyn ProfileRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            payments,
            profiles,
            gateway,
        }
    }

    /// Applies one verified event. Never returns an error; failures are
    /// logged and reported as [`ReconcileOutcome::Failed`].
    pub async fn process_event(&self, event: &GatewayEvent) -> ReconcileOutcome {
        let result = match &event.kind {
            GatewayEventKind::CheckoutCompleted(session) => {
                self.checkout_completed(event, session).await
            }
            GatewayEventKind::SubscriptionCreated(snapshot) => {
                self.subscription_created(event, snapshot).await
            }
            GatewayEventKind::SubscriptionUpdated(snapshot) => {
                self.subscription_updated(event, snapshot).await
            }
            GatewayEventKind::SubscriptionDeleted(snapshot) => {
                self.subscription_deleted(event, snapshot).await
            }
            GatewayEventKind::InvoicePaid(invoice) => self.invoice_paid(event, invoice).await,
            GatewayEventKind::InvoicePaymentFailed(invoice) => {
                self.invoice_payment_failed(event, invoice).await
            }
            GatewayEventKind::Unrecognized { event_type } => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event_type,
                    "Ignoring unhandled billing event"
                );
                Ok(ReconcileOutcome::Ignored)
            }
            GatewayEventKind::Malformed { reason, .. } => {
                Ok(skip(event, &format!("event object could not be decoded: {}", reason)))
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type(),
                    error = %error,
                    "Failed to process billing event"
                );
                ReconcileOutcome::Failed {
                    error: error.to_string(),
                }
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Checkout
    // ════════════════════════════════════════════════════════════════════════════

    async fn checkout_completed(
        &self,
        event: &GatewayEvent,
        session: &CheckoutCompleted,
    ) -> Result<ReconcileOutcome, BillingError> {
        let (customer_id, subscription_id, email) = match (
            session.customer_id.as_deref(),
            session.subscription_id.as_deref(),
            session.customer_email.as_deref(),
        ) {
            (Some(customer), Some(subscription), Some(email)) => (customer, subscription, email),
            _ => return Ok(skip(event, "checkout session is missing customer, subscription or email")),
        };

        match self.profiles.find_by_email(email).await? {
            Some(profile) => {
                tracing::info!(
                    event_id = %event.id,
                    user_id = %profile.id,
                    customer_id = %customer_id,
                    subscription_id = %subscription_id,
                    "Checkout completed, waiting for subscription event"
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => Ok(skip(event, "no user with the checkout email")),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscriptions
    // ════════════════════════════════════════════════════════════════════════════

    async fn subscription_created(
        &self,
        event: &GatewayEvent,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<ReconcileOutcome, BillingError> {
        let plan = match snapshot.price_id.as_deref() {
            Some(price_id) => self.plans.find_by_id(price_id).await?,
            None => None,
        };
        let plan = match plan {
            Some(plan) => plan,
            None => return Ok(skip(event, "subscription price is not a known plan")),
        };

        let profile = match self.profiles.find_by_customer_id(&snapshot.customer_id).await? {
            Some(profile) => profile,
            None => return Ok(skip(event, "no user for the subscription customer")),
        };

        let now = Timestamp::now();
        let subscription = CustomerSubscription {
            id: snapshot.id.clone(),
            user_id: profile.id.clone(),
            plan_id: plan.id.clone(),
            customer_id: snapshot.customer_id.clone(),
            status: map_gateway_status(&snapshot.status),
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            custom_modules_this_period: 0,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions.upsert(&subscription).await?;

        tracing::info!(
            event_id = %event.id,
            user_id = %profile.id,
            subscription_id = %subscription.id,
            plan_id = %plan.id,
            status = %subscription.status,
            "Subscription recorded"
        );

        self.write_mirror(
            &profile.id,
            BillingMirror {
                status: subscription.status,
                plan_tier: Some(plan.tier),
                renewal: snapshot.current_period_end.into(),
            },
        )
        .await;

        Ok(ReconcileOutcome::Applied)
    }

    async fn subscription_updated(
        &self,
        event: &GatewayEvent,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<ReconcileOutcome, BillingError> {
        let plan = match snapshot.price_id.as_deref() {
            Some(price_id) => {
                let plan = self.plans.find_by_id(price_id).await?;
                if plan.is_none() {
                    tracing::warn!(
                        event_id = %event.id,
                        subscription_id = %snapshot.id,
                        price_id = %price_id,
                        "Updated subscription references an unknown plan, keeping stored plan"
                    );
                }
                plan
            }
            None => None,
        };

        let change = SubscriptionChange {
            status: map_gateway_status(&snapshot.status),
            plan_id: plan.as_ref().map(|p| p.id.clone()),
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
        };

        let updated = match self.subscriptions.apply_change(&snapshot.id, &change).await? {
            Some(updated) => updated,
            None => return Ok(skip(event, "update for unknown subscription dropped")),
        };

        self.write_mirror_for_row(
            &updated.user_id,
            &updated.id,
            BillingMirror {
                status: updated.status,
                plan_tier: plan.map(|p| p.tier),
                renewal: updated.current_period_end.into(),
            },
        )
        .await;

        Ok(ReconcileOutcome::Applied)
    }

    async fn subscription_deleted(
        &self,
        event: &GatewayEvent,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<ReconcileOutcome, BillingError> {
        let canceled = match self
            .subscriptions
            .apply_change(&snapshot.id, &SubscriptionChange::canceled())
            .await?
        {
            Some(canceled) => canceled,
            None => return Ok(skip(event, "deletion for unknown subscription dropped")),
        };

        tracing::info!(
            event_id = %event.id,
            user_id = %canceled.user_id,
            subscription_id = %canceled.id,
            "Subscription canceled, reverting to free tier"
        );

        self.write_mirror_for_row(&canceled.user_id, &canceled.id, BillingMirror::reverted_to_free())
            .await;

        Ok(ReconcileOutcome::Applied)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoices
    // ════════════════════════════════════════════════════════════════════════════

    async fn invoice_paid(
        &self,
        event: &GatewayEvent,
        invoice: &InvoiceSnapshot,
    ) -> Result<ReconcileOutcome, BillingError> {
        let (customer_id, subscription_id) = match invoice_parties(invoice) {
            Some(parties) => parties,
            None => return Ok(skip(event, "invoice is missing customer or subscription")),
        };
        let profile = match self.profiles.find_by_customer_id(customer_id).await? {
            Some(profile) => profile,
            None => return Ok(skip(event, "no user for the invoice customer")),
        };

        let record = PaymentRecord {
            id: payment_record_id(invoice.payment_intent_id.as_deref(), &invoice.id),
            user_id: profile.id.clone(),
            subscription_id: subscription_id.to_string(),
            invoice_id: invoice.id.clone(),
            amount_cents: invoice.amount_paid,
            currency: invoice.currency.clone(),
            status: PaymentStatus::Succeeded,
            payment_method: invoice.collection_method.clone(),
            receipt_url: invoice.hosted_invoice_url.clone(),
            created_at: Timestamp::now(),
        };

        match self.payments.insert_if_absent(&record).await? {
            SaveResult::AlreadyExists => {
                tracing::info!(
                    event_id = %event.id,
                    payment_id = %record.id,
                    "Payment already recorded, usage counter left as is"
                );
            }
            SaveResult::Inserted if invoice.billing_reason.is_cycle_renewal() => {
                if self.subscriptions.reset_period_usage(subscription_id).await? {
                    tracing::info!(
                        event_id = %event.id,
                        subscription_id = %subscription_id,
                        "New billing period, usage counter reset"
                    );
                } else {
                    tracing::warn!(
                        event_id = %event.id,
                        subscription_id = %subscription_id,
                        "Renewal invoice for unknown subscription, no counter to reset"
                    );
                }
            }
            SaveResult::Inserted => {}
        }

        self.refresh_from_gateway(&profile.id, subscription_id).await;

        Ok(ReconcileOutcome::Applied)
    }

    async fn invoice_payment_failed(
        &self,
        event: &GatewayEvent,
        invoice: &InvoiceSnapshot,
    ) -> Result<ReconcileOutcome, BillingError> {
        let (customer_id, subscription_id) = match invoice_parties(invoice) {
            Some(parties) => parties,
            None => return Ok(skip(event, "invoice is missing customer or subscription")),
        };
        let profile = match self.profiles.find_by_customer_id(customer_id).await? {
            Some(profile) => profile,
            None => return Ok(skip(event, "no user for the invoice customer")),
        };

        let record = PaymentRecord {
            id: failed_payment_record_id(invoice.payment_intent_id.as_deref(), &invoice.id),
            user_id: profile.id.clone(),
            subscription_id: subscription_id.to_string(),
            invoice_id: invoice.id.clone(),
            amount_cents: invoice.amount_due,
            currency: invoice.currency.clone(),
            status: PaymentStatus::Failed,
            payment_method: invoice.collection_method.clone(),
            receipt_url: invoice.hosted_invoice_url.clone(),
            created_at: Timestamp::now(),
        };
        self.payments.insert_if_absent(&record).await?;

        let past_due = self
            .subscriptions
            .set_status(subscription_id, SubscriptionStatus::PastDue)
            .await?;

        tracing::warn!(
            event_id = %event.id,
            user_id = %profile.id,
            subscription_id = %subscription_id,
            "Invoice payment failed, subscription past due"
        );

        match past_due {
            Some(row) => {
                self.write_mirror_for_row(&row.user_id, &row.id, BillingMirror::past_due())
                    .await
            }
            None => {
                tracing::warn!(
                    event_id = %event.id,
                    subscription_id = %subscription_id,
                    "Payment failed for unknown subscription"
                );
                self.write_mirror(&profile.id, BillingMirror::past_due()).await;
            }
        }

        Ok(ReconcileOutcome::Applied)
    }

    /// Re-reads the live subscription and mirrors it as active.
    ///
    /// Gateway or storage failures here are logged; the payment is already
    /// recorded and the next subscription event converges the mirror.
    async fn refresh_from_gateway(&self, user_id: &UserId, subscription_id: &str) {
        let live = match self.gateway.retrieve_subscription(subscription_id).await {
            Ok(live) => live,
            Err(error) => {
                tracing::error!(
                    user_id = %user_id,
                    subscription_id = %subscription_id,
                    error = %error,
                    "Failed to refresh subscription from gateway"
                );
                return;
            }
        };

        let plan_tier = match live.price_id.as_deref() {
            Some(price_id) => match self.plans.find_by_id(price_id).await {
                Ok(plan) => plan.map(|p| p.tier),
                Err(error) => {
                    tracing::error!(
                        subscription_id = %subscription_id,
                        error = %error,
                        "Failed to resolve plan for refreshed subscription"
                    );
                    None
                }
            },
            None => None,
        };

        let renewal = match live.current_period_end {
            Some(end) => RenewalUpdate::Set(end),
            None => RenewalUpdate::Keep,
        };

        self.write_mirror_for_row(
            user_id,
            subscription_id,
            BillingMirror {
                status: SubscriptionStatus::Active,
                plan_tier,
                renewal,
            },
        )
        .await;
    }

    /// Mirrors the row an event touched, unless the user has another row that
    /// [`SubscriptionRepository::find_by_user`] resolves to. The profile always
    /// follows the resolved row so it converges with what reads report.
    async fn write_mirror_for_row(
        &self,
        user_id: &UserId,
        subscription_id: &str,
        mirror: BillingMirror,
    ) {
        let current = match self.subscriptions.find_by_user(user_id).await {
            Ok(current) => current,
            Err(error) => {
                tracing::error!(
                    user_id = %user_id,
                    subscription_id = %subscription_id,
                    error = %error,
                    "Failed to resolve current subscription for mirror"
                );
                return;
            }
        };

        let mirror = match current {
            Some(current) if current.id != subscription_id => {
                tracing::info!(
                    user_id = %user_id,
                    subscription_id = %subscription_id,
                    current_subscription_id = %current.id,
                    "Event touched a superseded subscription, mirroring the current one"
                );
                self.mirror_of(&current).await
            }
            _ => mirror,
        };

        self.write_mirror(user_id, mirror).await;
    }

    async fn mirror_of(&self, row: &CustomerSubscription) -> BillingMirror {
        if row.status == SubscriptionStatus::Canceled {
            return BillingMirror::reverted_to_free();
        }

        let plan_tier = match self.plans.find_by_id(&row.plan_id).await {
            Ok(plan) => plan.map(|p| p.tier),
            Err(error) => {
                tracing::error!(
                    subscription_id = %row.id,
                    plan_id = %row.plan_id,
                    error = %error,
                    "Failed to resolve plan for current subscription"
                );
                None
            }
        };

        BillingMirror {
            status: row.status,
            plan_tier,
            renewal: row.current_period_end.into(),
        }
    }

    async fn write_mirror(&self, user_id: &UserId, mirror: BillingMirror) {
        match self.profiles.update_billing_mirror(user_id, &mirror).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id = %user_id, "No profile to mirror billing state onto");
            }
            Err(error) => {
                tracing::error!(
                    user_id = %user_id,
                    status = %mirror.status,
                    error = %error,
                    "Failed to mirror billing state onto profile"
                );
            }
        }
    }
}

fn invoice_parties(invoice: &InvoiceSnapshot) -> Option<(&str, &str)> {
    match (
        invoice.customer_id.as_deref(),
        invoice.subscription_id.as_deref(),
    ) {
        (Some(customer), Some(subscription)) => Some((customer, subscription)),
        _ => None,
    }
}

fn skip(event: &GatewayEvent, reason: &str) -> ReconcileOutcome {
    tracing::warn!(
        event_id = %event.id,
        event_type = %event.event_type(),
        reason = %reason,
        "Skipping billing event"
    );
    ReconcileOutcome::Skipped {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::{
        BillingReason, InvoiceSnapshotBuilder, PlanTier, SubscriptionSnapshotBuilder, UserRole,
    };
    use crate::ports::{GatewayError, GatewaySubscription};

    fn reconciler(h: &Harness) -> BillingEventReconciler {
        BillingEventReconciler::new(
            h.subscriptions.clone(),
            h.plans.clone(),
            h.payments.clone(),
            h.profiles.clone(),
            h.gateway.clone(),
        )
    }

    fn created(id: &str, snapshot: SubscriptionSnapshot) -> GatewayEvent {
        GatewayEvent::new(id, GatewayEventKind::SubscriptionCreated(snapshot))
    }

    fn updated(id: &str, snapshot: SubscriptionSnapshot) -> GatewayEvent {
        GatewayEvent::new(id, GatewayEventKind::SubscriptionUpdated(snapshot))
    }

    async fn harness() -> Harness {
        Harness::new()
            .with_profile(UserRole::Teacher, Some(CUSTOMER))
            .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Created Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn created_event_inserts_row_and_mirrors_profile() {
        let h = harness().await;
        let event = created("evt_1", SubscriptionSnapshotBuilder::new("sub_1").build());

        let outcome = reconciler(&h).process_event(&event).await;

        assert_eq!(outcome, ReconcileOutcome::Applied);
        let sub = h.subscriptions.find_by_id("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.plan_id, HOME_PLAN);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.custom_modules_this_period, 0);

        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Home);
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Active));
        assert_eq!(profile.renewal_date, sub.current_period_end);
    }

    #[tokio::test]
    async fn created_event_twice_yields_one_row() {
        let h = harness().await;
        let r = reconciler(&h);
        let event = created("evt_1", SubscriptionSnapshotBuilder::new("sub_1").build());

        assert!(r.process_event(&event).await.is_applied());
        assert!(r.process_event(&event).await.is_applied());

        assert_eq!(h.subscriptions.len().await, 1);
    }

    #[tokio::test]
    async fn created_event_with_unknown_plan_is_skipped() {
        let h = harness().await;
        let event = created(
            "evt_1",
            SubscriptionSnapshotBuilder::new("sub_1").price("price_gone").build(),
        );

        let outcome = reconciler(&h).process_event(&event).await;

        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
        assert!(h.subscriptions.is_empty().await);
    }

    #[tokio::test]
    async fn created_event_for_unknown_customer_is_skipped() {
        let h = harness().await;
        let event = created(
            "evt_1",
            SubscriptionSnapshotBuilder::new("sub_1").customer("cus_other").build(),
        );

        let outcome = reconciler(&h).process_event(&event).await;

        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
        assert!(h.subscriptions.is_empty().await);
    }

    #[tokio::test]
    async fn mirror_failure_does_not_undo_subscription_write() {
        let h = harness().await;
        h.profiles.fail_mirror_updates(true);
        let event = created("evt_1", SubscriptionSnapshotBuilder::new("sub_1").build());

        let outcome = reconciler(&h).process_event(&event).await;

        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert!(h.subscriptions.find_by_id("sub_1").await.unwrap().is_some());
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Free);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Updated / Deleted Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn update_for_unknown_subscription_never_inserts() {
        let h = harness().await;
        let event = updated("evt_2", SubscriptionSnapshotBuilder::new("sub_missing").build());

        let outcome = reconciler(&h).process_event(&event).await;

        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
        assert!(h.subscriptions.is_empty().await);
    }

    #[tokio::test]
    async fn update_switches_plan_and_flags() {
        let h = harness().await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;
        let event = updated(
            "evt_2",
            SubscriptionSnapshotBuilder::new("sub_1")
                .price(PRO_PLAN)
                .cancel_at_period_end(true)
                .build(),
        );

        reconciler(&h).process_event(&event).await;

        let sub = h.subscriptions.find_by_id("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.plan_id, PRO_PLAN);
        assert!(sub.cancel_at_period_end);
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Pro);
    }

    #[tokio::test]
    async fn update_with_unknown_price_keeps_plan_and_tier() {
        let h = harness().await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;
        let event = updated(
            "evt_2",
            SubscriptionSnapshotBuilder::new("sub_1")
                .price("price_unknown")
                .status("past_due")
                .build(),
        );

        assert!(reconciler(&h).process_event(&event).await.is_applied());

        let sub = h.subscriptions.find_by_id("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.plan_id, HOME_PLAN);
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Free);
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::PastDue));
    }

    #[tokio::test]
    async fn unknown_gateway_status_is_stored_as_incomplete() {
        let h = harness().await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;
        let event = updated(
            "evt_2",
            SubscriptionSnapshotBuilder::new("sub_1").status("paused").build(),
        );

        reconciler(&h).process_event(&event).await;

        let sub = h.subscriptions.find_by_id("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Incomplete);
    }

    #[tokio::test]
    async fn deletion_cancels_row_and_reverts_profile() {
        let h = harness().await;
        h.subscriptions
            .insert(subscription("sub_1", HOME_PLAN, SubscriptionStatus::Active))
            .await;
        let event = GatewayEvent::new(
            "evt_3",
            GatewayEventKind::SubscriptionDeleted(SubscriptionSnapshotBuilder::new("sub_1").build()),
        );

        assert!(reconciler(&h).process_event(&event).await.is_applied());

        let sub = h.subscriptions.find_by_id("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert!(sub.current_period_end.is_none());
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Free);
        assert!(profile.renewal_date.is_none());
    }

    async fn switched_to_pro(h: &Harness) -> BillingEventReconciler {
        let r = reconciler(h);
        r.process_event(&created("evt_1", SubscriptionSnapshotBuilder::new("sub_home").build()))
            .await;
        r.process_event(&created(
            "evt_2",
            SubscriptionSnapshotBuilder::new("sub_pro").price(PRO_PLAN).build(),
        ))
        .await;
        r
    }

    #[tokio::test]
    async fn deleting_superseded_row_keeps_current_plan_on_profile() {
        let h = harness().await;
        let r = switched_to_pro(&h).await;
        let event = GatewayEvent::new(
            "evt_3",
            GatewayEventKind::SubscriptionDeleted(
                SubscriptionSnapshotBuilder::new("sub_home").build(),
            ),
        );

        assert!(r.process_event(&event).await.is_applied());

        let old = h.subscriptions.find_by_id("sub_home").await.unwrap().unwrap();
        assert_eq!(old.status, SubscriptionStatus::Canceled);
        let current = h.subscriptions.find_by_user(&user_id()).await.unwrap().unwrap();
        assert_eq!(current.id, "sub_pro");
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Pro);
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Active));
        assert_eq!(profile.renewal_date, current.current_period_end);
    }

    #[tokio::test]
    async fn update_to_superseded_row_mirrors_current_subscription() {
        let h = harness().await;
        let r = switched_to_pro(&h).await;
        let event = updated(
            "evt_3",
            SubscriptionSnapshotBuilder::new("sub_home").status("canceled").build(),
        );

        assert!(r.process_event(&event).await.is_applied());

        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Pro);
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Active));
    }

    #[tokio::test]
    async fn deleting_last_row_after_switch_reverts_to_free() {
        let h = harness().await;
        let r = switched_to_pro(&h).await;
        for (id, sub) in [("evt_3", "sub_home"), ("evt_4", "sub_pro")] {
            r.process_event(&GatewayEvent::new(
                id,
                GatewayEventKind::SubscriptionDeleted(SubscriptionSnapshotBuilder::new(sub).build()),
            ))
            .await;
        }

        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Free);
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Canceled));
        assert!(profile.renewal_date.is_none());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoice Tests
    // ════════════════════════════════════════════════════════════════════════════

    async fn with_counter(h: &Harness, used: u32) {
        let mut sub = subscription("sub_test", HOME_PLAN, SubscriptionStatus::Active);
        sub.custom_modules_this_period = used;
        h.subscriptions.insert(sub).await;
    }

    fn paid(id: &str, invoice: InvoiceSnapshot) -> GatewayEvent {
        GatewayEvent::new(id, GatewayEventKind::InvoicePaid(invoice))
    }

    #[tokio::test]
    async fn renewal_invoice_resets_usage_counter() {
        let h = harness().await;
        with_counter(&h, 4).await;

        let event = paid("evt_4", InvoiceSnapshotBuilder::new("in_1").build());
        assert!(reconciler(&h).process_event(&event).await.is_applied());

        let sub = h.subscriptions.find_by_id("sub_test").await.unwrap().unwrap();
        assert_eq!(sub.custom_modules_this_period, 0);
        assert_eq!(h.payments.all().await.len(), 1);
    }

    #[tokio::test]
    async fn first_invoice_does_not_reset_usage_counter() {
        let h = harness().await;
        with_counter(&h, 4).await;

        let event = paid(
            "evt_4",
            InvoiceSnapshotBuilder::new("in_1")
                .billing_reason(BillingReason::SubscriptionCreate)
                .build(),
        );
        reconciler(&h).process_event(&event).await;

        let sub = h.subscriptions.find_by_id("sub_test").await.unwrap().unwrap();
        assert_eq!(sub.custom_modules_this_period, 4);
    }

    #[tokio::test]
    async fn redelivered_invoice_does_not_reset_again() {
        let h = harness().await;
        with_counter(&h, 0).await;
        let r = reconciler(&h);
        let event = paid("evt_4", InvoiceSnapshotBuilder::new("in_1").build());

        r.process_event(&event).await;
        h.subscriptions.increment_period_usage("sub_test").await.unwrap();
        r.process_event(&event).await;

        let sub = h.subscriptions.find_by_id("sub_test").await.unwrap().unwrap();
        assert_eq!(sub.custom_modules_this_period, 1);
        assert_eq!(h.payments.all().await.len(), 1);
    }

    #[tokio::test]
    async fn invoice_without_payment_intent_uses_invoice_key() {
        let h = harness().await;
        with_counter(&h, 0).await;
        let event = paid(
            "evt_4",
            InvoiceSnapshotBuilder::new("in_9").payment_intent(None).build(),
        );

        reconciler(&h).process_event(&event).await;

        assert_eq!(h.payments.all().await[0].id, "inv_in_9");
    }

    #[tokio::test]
    async fn invoice_without_subscription_is_skipped() {
        let h = harness().await;
        let event = paid(
            "evt_4",
            InvoiceSnapshotBuilder::new("in_1").subscription(None).build(),
        );

        let outcome = reconciler(&h).process_event(&event).await;

        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
        assert!(h.payments.all().await.is_empty());
    }

    #[tokio::test]
    async fn paid_invoice_refreshes_mirror_from_gateway() {
        let h = harness().await;
        with_counter(&h, 0).await;
        let period_end = Timestamp::from_unix_secs(1_709_251_200);
        h.gateway.add_subscription(GatewaySubscription {
            id: "sub_test".to_string(),
            customer_id: CUSTOMER.to_string(),
            status: "active".to_string(),
            price_id: Some(PRO_PLAN.to_string()),
            current_period_start: None,
            current_period_end: period_end,
            cancel_at_period_end: false,
        });

        reconciler(&h)
            .process_event(&paid("evt_4", InvoiceSnapshotBuilder::new("in_1").build()))
            .await;

        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Active));
        assert_eq!(profile.plan_tier, PlanTier::Pro);
        assert_eq!(profile.renewal_date, period_end);
    }

    #[tokio::test]
    async fn gateway_refresh_failure_keeps_payment() {
        let h = harness().await;
        with_counter(&h, 3).await;
        h.gateway
            .fail_method("retrieve_subscription", GatewayError::network("timeout"));

        let outcome = reconciler(&h)
            .process_event(&paid("evt_4", InvoiceSnapshotBuilder::new("in_1").build()))
            .await;

        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert_eq!(h.payments.all().await.len(), 1);
        let sub = h.subscriptions.find_by_id("sub_test").await.unwrap().unwrap();
        assert_eq!(sub.custom_modules_this_period, 0);
    }

    #[tokio::test]
    async fn failed_invoice_marks_past_due() {
        let h = harness().await;
        with_counter(&h, 0).await;
        let event = GatewayEvent::new(
            "evt_5",
            GatewayEventKind::InvoicePaymentFailed(InvoiceSnapshotBuilder::new("in_1").build()),
        );

        assert!(reconciler(&h).process_event(&event).await.is_applied());
        reconciler(&h).process_event(&event).await;

        let payments = h.payments.all().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        let sub = h.subscriptions.find_by_id("sub_test").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        let profile = h.profiles.find_by_id(&user_id()).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::PastDue));
    }

    #[tokio::test]
    async fn success_after_failure_is_recorded_separately() {
        let h = harness().await;
        with_counter(&h, 0).await;
        let r = reconciler(&h);
        let invoice = InvoiceSnapshotBuilder::new("in_1").build();

        r.process_event(&GatewayEvent::new(
            "evt_5",
            GatewayEventKind::InvoicePaymentFailed(invoice.clone()),
        ))
        .await;
        r.process_event(&paid("evt_6", invoice)).await;

        assert_eq!(h.payments.all().await.len(), 2);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Other Event Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_completed_does_not_write() {
        let h = harness().await;
        let event = GatewayEvent::new(
            "evt_0",
            GatewayEventKind::CheckoutCompleted(CheckoutCompleted {
                session_id: "cs_1".to_string(),
                customer_id: Some(CUSTOMER.to_string()),
                subscription_id: Some("sub_1".to_string()),
                customer_email: Some("TEACHER@example.com".to_string()),
            }),
        );

        assert!(reconciler(&h).process_event(&event).await.is_applied());
        assert!(h.subscriptions.is_empty().await);
    }

    #[tokio::test]
    async fn checkout_without_email_is_skipped() {
        let h = harness().await;
        let event = GatewayEvent::new(
            "evt_0",
            GatewayEventKind::CheckoutCompleted(CheckoutCompleted {
                session_id: "cs_1".to_string(),
                customer_id: Some(CUSTOMER.to_string()),
                subscription_id: Some("sub_1".to_string()),
                customer_email: None,
            }),
        );

        let outcome = reconciler(&h).process_event(&event).await;
        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn malformed_events_are_skipped_without_writes() {
        let h = harness().await;
        let event = GatewayEvent::new(
            "evt_9",
            GatewayEventKind::Malformed {
                event_type: "invoice.paid".to_string(),
                reason: "invalid type: integer `42`".to_string(),
            },
        );

        let outcome = reconciler(&h).process_event(&event).await;

        match outcome {
            ReconcileOutcome::Skipped { reason } => assert!(reason.contains("integer `42`")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(h.payments.all().await.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_events_are_ignored() {
        let h = harness().await;
        let event = GatewayEvent::new(
            "evt_9",
            GatewayEventKind::Unrecognized {
                event_type: "customer.updated".to_string(),
            },
        );

        assert_eq!(
            reconciler(&h).process_event(&event).await,
            ReconcileOutcome::Ignored
        );
    }
}
