//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).
//! Gateway events enter through the reconciler rather than a command.

pub mod handlers;

pub use handlers::billing::{BillingEventReconciler, ReconcileOutcome, WebhookIntakeHandler};
