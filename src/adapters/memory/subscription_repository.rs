//! In-memory subscription repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{CustomerSubscription, SubscriptionChange, SubscriptionStatus};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::SubscriptionRepository;

/// In-memory `SubscriptionRepository` keyed by gateway subscription id.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: RwLock<HashMap<String, CustomerSubscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row directly, bypassing upsert rules.
    pub async fn insert(&self, subscription: CustomerSubscription) {
        self.rows
            .write()
            .await
            .insert(subscription.id.clone(), subscription);
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn upsert(&self, subscription: &CustomerSubscription) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&subscription.id) {
            Some(existing) => {
                existing.plan_id = subscription.plan_id.clone();
                existing.customer_id = subscription.customer_id.clone();
                existing.status = subscription.status;
                existing.current_period_start = subscription.current_period_start;
                existing.current_period_end = subscription.current_period_end;
                existing.cancel_at_period_end = subscription.cancel_at_period_end;
                existing.updated_at = Timestamp::now();
            }
            None => {
                rows.insert(subscription.id.clone(), subscription.clone());
            }
        }
        Ok(())
    }

    async fn apply_change(
        &self,
        subscription_id: &str,
        change: &SubscriptionChange,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(subscription_id).map(|row| {
            row.apply(change);
            row.clone()
        }))
    }

    async fn set_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(subscription_id).map(|row| {
            row.status = status;
            row.updated_at = Timestamp::now();
            row.clone()
        }))
    }

    async fn reset_period_usage(&self, subscription_id: &str) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        Ok(match rows.get_mut(subscription_id) {
            Some(row) => {
                row.custom_modules_this_period = 0;
                row.updated_at = Timestamp::now();
                true
            }
            None => false,
        })
    }

    async fn increment_period_usage(
        &self,
        subscription_id: &str,
    ) -> Result<Option<u32>, DomainError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(subscription_id).map(|row| {
            row.custom_modules_this_period += 1;
            row.updated_at = Timestamp::now();
            row.custom_modules_this_period
        }))
    }

    async fn find_by_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        Ok(self.rows.read().await.get(subscription_id).cloned())
    }

    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| &row.user_id == user_id)
            .max_by_key(|row| (row.status.grants_access(), row.updated_at))
            .cloned())
    }
}
