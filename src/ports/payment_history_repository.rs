//! Payment ledger repository port.

use async_trait::async_trait;

use super::SaveResult;
use crate::domain::billing::PaymentRecord;
use crate::domain::foundation::{DomainError, UserId};

/// Append-only store of payment attempts.
#[async_trait]
pub trait PaymentHistoryRepository: Send + Sync {
    /// Insert a record unless one with the same id exists.
    ///
    /// Uses `ON CONFLICT DO NOTHING` semantics; a redelivered invoice event
    /// yields `SaveResult::AlreadyExists` instead of an error.
    async fn insert_if_absent(&self, record: &PaymentRecord) -> Result<SaveResult, DomainError>;

    /// The user's records, newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<PaymentRecord>, DomainError>;
}
