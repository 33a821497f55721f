//! Billing-relevant slice of the user profile.
//!
//! The profile carries a denormalized copy of the user's subscription state. It is
//! a read cache, written best-effort by the reconciler after each subscription change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{PlanTier, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId, ValidationError};

/// Role of a user on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Teacher,
    Parent,
    Student,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Teacher => "teacher",
            UserRole::Parent => "parent",
            UserRole::Student => "student",
        }
    }

    /// Students are managed by a teacher or parent account and never pay.
    pub fn can_hold_billing(&self) -> bool {
        !matches!(self, UserRole::Student)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "teacher" => Ok(UserRole::Teacher),
            "parent" => Ok(UserRole::Parent),
            "student" => Ok(UserRole::Student),
            other => Err(ValidationError::invalid_format(
                "role",
                format!("unknown role '{}'", other),
            )),
        }
    }
}

/// User profile fields the billing core reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub customer_id: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub plan_tier: PlanTier,
    pub renewal_date: Option<Timestamp>,
}

impl UserProfile {
    /// Applies a mirror update in memory, mirroring what storage does.
    pub fn apply_mirror(&mut self, mirror: &BillingMirror) {
        self.subscription_status = Some(mirror.status);
        if let Some(tier) = &mirror.plan_tier {
            self.plan_tier = tier.clone();
        }
        match mirror.renewal {
            RenewalUpdate::Keep => {}
            RenewalUpdate::Set(ts) => self.renewal_date = Some(ts),
            RenewalUpdate::Clear => self.renewal_date = None,
        }
    }
}

/// How a mirror update treats the stored renewal date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalUpdate {
    Keep,
    Set(Timestamp),
    Clear,
}

impl From<Option<Timestamp>> for RenewalUpdate {
    fn from(value: Option<Timestamp>) -> Self {
        match value {
            Some(ts) => RenewalUpdate::Set(ts),
            None => RenewalUpdate::Clear,
        }
    }
}

/// Denormalized subscription state written onto a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingMirror {
    pub status: SubscriptionStatus,
    /// `None` leaves the stored tier untouched.
    pub plan_tier: Option<PlanTier>,
    pub renewal: RenewalUpdate,
}

impl BillingMirror {
    /// Mirror applied when the subscription is gone: free tier, no renewal.
    pub fn reverted_to_free() -> Self {
        Self {
            status: SubscriptionStatus::Canceled,
            plan_tier: Some(PlanTier::Free),
            renewal: RenewalUpdate::Clear,
        }
    }

    /// Mirror applied when a payment fails: only the status moves.
    pub fn past_due() -> Self {
        Self {
            status: SubscriptionStatus::PastDue,
            plan_tier: None,
            renewal: RenewalUpdate::Keep,
        }
    }
}
