//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! Every write is a single statement. Idempotency and the update-never-creates
//! rule are enforced in SQL (`ON CONFLICT`, `UPDATE ... RETURNING`) rather than
//! by reading first:
//! - `PostgresSubscriptionRepository` - Subscription mirror and usage counter
//! - `PostgresPlanRepository` - Plan catalog
//! - `PostgresPaymentHistoryRepository` - Append-only payment ledger
//! - `PostgresProfileRepository` - Billing columns of user profiles
//! - `PostgresWebhookEventRepository` - Webhook idempotency ledger

mod payment_history_repository;
mod plan_repository;
mod profile_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use payment_history_repository::PostgresPaymentHistoryRepository;
pub use plan_repository::PostgresPlanRepository;
pub use profile_repository::PostgresProfileRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
