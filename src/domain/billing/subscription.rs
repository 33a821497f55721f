//! Local mirror of a gateway subscription.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId, ValidationError};

/// Local subscription status.
///
/// A subset of the gateway's richer status set; see [`map_gateway_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    Unpaid,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 6] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::Unpaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Returns true if the subscribed plan's entitlements apply.
    ///
    /// Past-due subscriptions keep access while the gateway retries payment.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }

    /// Returns true for the statuses that block buying the same plan again.
    pub fn is_live(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::invalid_format("status", format!("unknown status '{}'", s)))
    }
}

/// Maps a gateway subscription status onto the local enumeration.
///
/// `trialing` is treated as `active`. Statuses already in the local set pass
/// through. Anything else maps to `incomplete` and logs a warning. Never fails.
pub fn map_gateway_status(gateway_status: &str) -> SubscriptionStatus {
    if gateway_status == "trialing" {
        return SubscriptionStatus::Active;
    }
    match gateway_status.parse::<SubscriptionStatus>() {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(
                gateway_status = %gateway_status,
                "Unmapped gateway subscription status, treating as incomplete"
            );
            SubscriptionStatus::Incomplete
        }
    }
}

/// Local mirror of one gateway subscription.
///
/// `id` equals the gateway subscription id and is the idempotency key for
/// creation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSubscription {
    pub id: String,
    pub user_id: UserId,
    /// Equals the gateway price id.
    pub plan_id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    /// Custom modules created in the current billing period.
    pub custom_modules_this_period: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CustomerSubscription {
    /// Returns true if this row is the user's live subscription to `plan_id`.
    pub fn is_live_for_plan(&self, plan_id: &str) -> bool {
        self.plan_id == plan_id && self.status.is_live()
    }

    /// Returns true if cancellation can be requested.
    pub fn can_cancel(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Returns true if a scheduled cancellation can be withdrawn.
    pub fn can_reactivate(&self) -> bool {
        self.status == SubscriptionStatus::Active && self.cancel_at_period_end
    }

    /// Applies a gateway change in memory, mirroring what storage does.
    pub fn apply(&mut self, change: &SubscriptionChange) {
        self.status = change.status;
        if let Some(plan_id) = &change.plan_id {
            self.plan_id = plan_id.clone();
        }
        self.current_period_start = change.current_period_start;
        self.current_period_end = change.current_period_end;
        self.cancel_at_period_end = change.cancel_at_period_end;
        self.updated_at = Timestamp::now();
    }
}

/// State carried by a subscription-updated or subscription-deleted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub status: SubscriptionStatus,
    /// New plan id, or `None` to keep the stored one.
    pub plan_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
}

impl SubscriptionChange {
    /// The change applied when the gateway reports the subscription deleted.
    pub fn canceled() -> Self {
        Self {
            status: SubscriptionStatus::Canceled,
            plan_id: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
        }
    }
}
