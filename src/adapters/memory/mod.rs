//! In-memory repository implementations.
//!
//! Used by tests and by local runs without a database. Each store guards its
//! state with a `tokio::sync::RwLock`.

mod payment_history_repository;
mod plan_repository;
mod profile_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use payment_history_repository::InMemoryPaymentHistoryRepository;
pub use plan_repository::InMemoryPlanRepository;
pub use profile_repository::InMemoryProfileRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
