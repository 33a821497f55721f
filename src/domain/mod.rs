//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `billing` - Plans, subscriptions, payment ledger and entitlement rules

pub mod billing;
pub mod foundation;
