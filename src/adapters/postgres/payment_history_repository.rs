//! PostgreSQL implementation of PaymentHistoryRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{PaymentRecord, PaymentStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{PaymentHistoryRepository, SaveResult};

pub struct PostgresPaymentHistoryRepository {
    pool: PgPool,
}

impl PostgresPaymentHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    user_id: String,
    subscription_id: String,
    invoice_id: String,
    amount_cents: i64,
    currency: String,
    status: String,
    payment_method: Option<String>,
    receipt_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.user_id)
            .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?;
        let status = row
            .status
            .parse::<PaymentStatus>()
            .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?;

        Ok(PaymentRecord {
            id: row.id,
            user_id,
            subscription_id: row.subscription_id,
            invoice_id: row.invoice_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status,
            payment_method: row.payment_method,
            receipt_url: row.receipt_url,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl PaymentHistoryRepository for PostgresPaymentHistoryRepository {
    async fn insert_if_absent(&self, record: &PaymentRecord) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_history (
                id, user_id, subscription_id, invoice_id, amount_cents, currency,
                status, payment_method, receipt_url, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id.as_str())
        .bind(&record.subscription_id)
        .bind(&record.invoice_id)
        .bind(record.amount_cents)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(&record.payment_method)
        .bind(&record.receipt_url)
        .bind(record.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("record payment", e))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<PaymentRecord>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, subscription_id, invoice_id, amount_cents, currency,
                   status, payment_method, receipt_url, created_at
            FROM payment_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("list payments", e))?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }
}
