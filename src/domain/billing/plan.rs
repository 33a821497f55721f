//! Subscription plans, tiers and per-tier limits.
//!
//! Plans mirror the payment gateway's price catalog. The plan identifier equals
//! the gateway price id, which is what subscription events carry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default student limit when catalog metadata is missing or invalid.
pub const DEFAULT_STUDENT_LIMIT: u32 = 3;

/// Default total module limit when catalog metadata is missing or invalid.
pub const DEFAULT_MODULE_LIMIT: u32 = 3;

/// Default custom module limit when catalog metadata is missing or invalid.
pub const DEFAULT_CUSTOM_MODULE_LIMIT: u32 = 1;

/// Largest limit the catalog accepts; larger metadata values are capped to it.
pub const MAX_PLAN_LIMIT: u32 = i32::MAX as u32;

/// Plan tier label.
///
/// Built-in tiers are ordered `Free < Home < Pro`. Any other label coming from
/// catalog metadata is kept as a custom tier that ranks above the built-ins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PlanTier {
    Free,
    Home,
    Pro,
    Custom(String),
}

impl PlanTier {
    /// Parses a tier label. Blank labels fall back to `Free`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "" | "free" => PlanTier::Free,
            "home" => PlanTier::Home,
            "pro" => PlanTier::Pro,
            other => PlanTier::Custom(other.to_string()),
        }
    }

    /// Returns the stored label for this tier.
    pub fn as_str(&self) -> &str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Home => "home",
            PlanTier::Pro => "pro",
            PlanTier::Custom(label) => label,
        }
    }

    /// Numeric rank for ordering. Higher rank means a larger plan.
    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Home => 1,
            PlanTier::Pro => 2,
            PlanTier::Custom(_) => 3,
        }
    }

    /// Returns true if this tier is a paid tier.
    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for PlanTier {
    fn from(label: String) -> Self {
        PlanTier::parse(&label)
    }
}

impl From<PlanTier> for String {
    fn from(tier: PlanTier) -> Self {
        tier.as_str().to_string()
    }
}

impl PartialOrd for PlanTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlanTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.as_str().cmp(other.as_str()))
    }
}

/// How often a plan bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

impl BillingInterval {
    /// Parses the gateway's `recurring.interval`. Unknown values bill monthly.
    pub fn parse(interval: &str) -> Self {
        match interval.trim().to_lowercase().as_str() {
            "day" => BillingInterval::Day,
            "week" => BillingInterval::Week,
            "year" => BillingInterval::Year,
            _ => BillingInterval::Month,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Day => "day",
            BillingInterval::Week => "week",
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

/// Per-plan usage limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub student_limit: u32,
    pub module_limit: u32,
    pub custom_module_limit: u32,
}

impl PlanLimits {
    /// Reads limits from gateway product metadata.
    ///
    /// Keys are `studentLimit`, `moduleLimit` and `customModuleLimit`; each value is
    /// a string-encoded non-negative integer. Missing or unparseable values use the
    /// conservative defaults; values above [`MAX_PLAN_LIMIT`] are capped.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Self {
        Self {
            student_limit: metadata_u32(metadata, "studentLimit", DEFAULT_STUDENT_LIMIT),
            module_limit: metadata_u32(metadata, "moduleLimit", DEFAULT_MODULE_LIMIT),
            custom_module_limit: metadata_u32(
                metadata,
                "customModuleLimit",
                DEFAULT_CUSTOM_MODULE_LIMIT,
            ),
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            student_limit: DEFAULT_STUDENT_LIMIT,
            module_limit: DEFAULT_MODULE_LIMIT,
            custom_module_limit: DEFAULT_CUSTOM_MODULE_LIMIT,
        }
    }
}

fn metadata_u32(metadata: &HashMap<String, String>, key: &str, default: u32) -> u32 {
    metadata
        .get(key)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(|v| v.min(MAX_PLAN_LIMIT))
        .unwrap_or(default)
}

/// A billing tier definition, owned by the catalog sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Gateway price id.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Price in the smallest currency unit.
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub tier: PlanTier,
    pub limits: PlanLimits,
    pub active: bool,
}

impl SubscriptionPlan {
    /// Reads the tier label from gateway product metadata, defaulting to free.
    pub fn tier_from_metadata(metadata: &HashMap<String, String>) -> PlanTier {
        metadata
            .get("tier")
            .map(|t| PlanTier::parse(t))
            .unwrap_or(PlanTier::Free)
    }
}
