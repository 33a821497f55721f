//! User profile port (billing fields only).
//!
//! Profiles are created elsewhere; the billing core looks them up and keeps
//! the denormalized billing mirror current.

use async_trait::async_trait;

use crate::domain::billing::{BillingMirror, UserProfile};
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, DomainError>;

    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, DomainError>;

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, DomainError>;

    /// Persist the gateway customer id for a user.
    async fn set_customer_id(&self, user_id: &UserId, customer_id: &str)
        -> Result<(), DomainError>;

    /// Write the billing mirror. Returns false if the profile does not exist.
    async fn update_billing_mirror(
        &self,
        user_id: &UserId,
        mirror: &BillingMirror,
    ) -> Result<bool, DomainError>;
}
