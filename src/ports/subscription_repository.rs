//! Subscription repository port.
//!
//! Rows are owned by the reconciler; only gateway truth writes them. Every write
//! is a single atomic statement so concurrent deliveries for the same
//! subscription cannot interleave a read and a write.

use async_trait::async_trait;

use crate::domain::billing::{CustomerSubscription, SubscriptionChange, SubscriptionStatus};
use crate::domain::foundation::{DomainError, UserId};

/// Repository port for `CustomerSubscription` rows.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a subscription, or overwrite the gateway-owned fields of an
    /// existing row with the same id.
    ///
    /// The per-period usage counter and the owner of an existing row are kept.
    async fn upsert(&self, subscription: &CustomerSubscription) -> Result<(), DomainError>;

    /// Apply a gateway change to an existing row.
    ///
    /// Returns the updated row, or `None` if no row has this id. Never inserts.
    async fn apply_change(
        &self,
        subscription_id: &str,
        change: &SubscriptionChange,
    ) -> Result<Option<CustomerSubscription>, DomainError>;

    /// Set the status of an existing row. Returns the updated row, or `None`.
    async fn set_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Option<CustomerSubscription>, DomainError>;

    /// Zero the per-period usage counter. Returns false if no row has this id.
    async fn reset_period_usage(&self, subscription_id: &str) -> Result<bool, DomainError>;

    /// Add one to the per-period usage counter. Returns the new value, or
    /// `None` if no row has this id.
    async fn increment_period_usage(&self, subscription_id: &str)
        -> Result<Option<u32>, DomainError>;

    /// Find a subscription by gateway subscription id.
    async fn find_by_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<CustomerSubscription>, DomainError>;

    /// Find the user's governing subscription.
    ///
    /// A user may have several historical rows. Rows whose status grants access
    /// win; ties go to the most recently updated row.
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CustomerSubscription>, DomainError>;
}
