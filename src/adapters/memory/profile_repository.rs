//! In-memory profile store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingMirror, UserProfile};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::ProfileRepository;

/// In-memory `ProfileRepository`.
///
/// Mirror writes can be made to fail to exercise the reconciler's
/// independently-failable mirror step.
#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
    fail_mirror_updates: AtomicBool,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    pub fn fail_mirror_updates(&self, fail: bool) {
        self.fail_mirror_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, DomainError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, DomainError> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, DomainError> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .values()
            .find(|p| p.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| DomainError::new(ErrorCode::UserNotFound, "Profile not found"))?;
        profile.customer_id = Some(customer_id.to_string());
        Ok(())
    }

    async fn update_billing_mirror(
        &self,
        user_id: &UserId,
        mirror: &BillingMirror,
    ) -> Result<bool, DomainError> {
        if self.fail_mirror_updates.load(Ordering::SeqCst) {
            return Err(DomainError::database(
                "update billing mirror",
                "simulated failure",
            ));
        }
        let mut profiles = self.profiles.write().await;
        Ok(match profiles.get_mut(user_id) {
            Some(profile) => {
                profile.apply_mirror(mirror);
                true
            }
            None => false,
        })
    }
}
