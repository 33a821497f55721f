//! Plan-limit gating.
//!
//! Answers whether a user may create one more limited resource under the plan
//! currently in effect for them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::{PlanLimits, PlanTier};
use crate::domain::foundation::ValidationError;

/// Resources capped by plan limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitedResource {
    Students,
    Modules,
    CustomModules,
}

impl LimitedResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitedResource::Students => "students",
            LimitedResource::Modules => "modules",
            LimitedResource::CustomModules => "custom_modules",
        }
    }
}

impl fmt::Display for LimitedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitedResource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "students" => Ok(LimitedResource::Students),
            "modules" => Ok(LimitedResource::Modules),
            "custom_modules" | "custom-modules" => Ok(LimitedResource::CustomModules),
            other => Err(ValidationError::invalid_format(
                "resource",
                format!("unknown resource '{}'", other),
            )),
        }
    }
}

/// Result of a limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitDecision {
    pub resource: LimitedResource,
    pub tier: PlanTier,
    pub limit: u32,
    pub used: u32,
    pub allowed: bool,
}

/// The limits in effect for a user right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlements {
    pub tier: PlanTier,
    pub limits: PlanLimits,
    /// Per-period custom module counter of the governing subscription.
    pub custom_modules_this_period: u32,
}

impl Entitlements {
    /// Checks whether one more `resource` fits.
    ///
    /// `current` is the caller's count of existing students or modules. Custom
    /// modules are counted per billing period, so the stored counter is used
    /// instead.
    pub fn check(&self, resource: LimitedResource, current: u32) -> LimitDecision {
        let (limit, used) = match resource {
            LimitedResource::Students => (self.limits.student_limit, current),
            LimitedResource::Modules => (self.limits.module_limit, current),
            LimitedResource::CustomModules => (
                self.limits.custom_module_limit,
                self.custom_modules_this_period,
            ),
        };
        LimitDecision {
            resource,
            tier: self.tier.clone(),
            limit,
            used,
            allowed: used < limit,
        }
    }
}
