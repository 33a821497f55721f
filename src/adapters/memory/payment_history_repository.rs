//! In-memory payment ledger.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::PaymentRecord;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{PaymentHistoryRepository, SaveResult};

#[derive(Default)]
pub struct InMemoryPaymentHistoryRepository {
    records: RwLock<Vec<PaymentRecord>>,
}

impl InMemoryPaymentHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in insertion order.
    pub async fn all(&self) -> Vec<PaymentRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl PaymentHistoryRepository for InMemoryPaymentHistoryRepository {
    async fn insert_if_absent(&self, record: &PaymentRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Ok(SaveResult::AlreadyExists);
        }
        records.push(record.clone());
        Ok(SaveResult::Inserted)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<PaymentRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| &r.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
