//! Reading Billing - subscription billing core.
//!
//! Reconciles Stripe webhook events into local subscription state and answers
//! plan, entitlement and checkout requests for the reading platform.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
