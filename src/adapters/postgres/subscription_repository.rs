//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Every write is a single statement so concurrent webhook deliveries for the
//! same subscription never interleave a read with a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{CustomerSubscription, SubscriptionChange, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::SubscriptionRepository;

const COLUMNS: &str = "id, user_id, plan_id, stripe_customer_id, status, current_period_start, \
     current_period_end, cancel_at_period_end, custom_modules_created_this_period, created_at, updated_at";

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    plan_id: String,
    stripe_customer_id: String,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    custom_modules_created_this_period: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for CustomerSubscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, err: String| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid {} on subscription {}: {}", field, row.id, err),
            )
        };

        Ok(CustomerSubscription {
            user_id: UserId::new(row.user_id.clone()).map_err(|e| corrupt("user_id", e.to_string()))?,
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| corrupt("status", e.to_string()))?,
            custom_modules_this_period: u32::try_from(row.custom_modules_created_this_period)
                .map_err(|e| corrupt("usage counter", e.to_string()))?,
            plan_id: row.plan_id,
            customer_id: row.stripe_customer_id,
            current_period_start: row.current_period_start.map(Timestamp::from_datetime),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            id: row.id,
        })
    }
}

fn to_datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

fn counter_column(subscription_id: &str, value: u32) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|_| {
        DomainError::validation(
            "custom_modules_this_period",
            format!("Usage counter on subscription {} is out of range: {}", subscription_id, value),
        )
    })
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn upsert(&self, subscription: &CustomerSubscription) -> Result<(), DomainError> {
        let counter = counter_column(&subscription.id, subscription.custom_modules_this_period)?;
        sqlx::query(
            r#"
            INSERT INTO customer_subscriptions (
                id, user_id, plan_id, stripe_customer_id, status, current_period_start,
                current_period_end, cancel_at_period_end, custom_modules_created_this_period,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (id) DO UPDATE SET
                plan_id = EXCLUDED.plan_id,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(&subscription.id)
        .bind(subscription.user_id.as_str())
        .bind(&subscription.plan_id)
        .bind(&subscription.customer_id)
        .bind(subscription.status.as_str())
        .bind(to_datetime(subscription.current_period_start))
        .bind(to_datetime(subscription.current_period_end))
        .bind(subscription.cancel_at_period_end)
        .bind(counter)
        .bind(subscription.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("upsert subscription", e))?;

        Ok(())
    }

    async fn apply_change(
        &self,
        subscription_id: &str,
        change: &SubscriptionChange,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let sql = format!(
            r#"
            UPDATE customer_subscriptions SET
                status = $2,
                plan_id = COALESCE($3, plan_id),
                current_period_start = $4,
                current_period_end = $5,
                cancel_at_period_end = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        );

        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(subscription_id)
            .bind(change.status.as_str())
            .bind(change.plan_id.as_deref())
            .bind(to_datetime(change.current_period_start))
            .bind(to_datetime(change.current_period_end))
            .bind(change.cancel_at_period_end)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("update subscription", e))?;

        row.map(CustomerSubscription::try_from).transpose()
    }

    async fn set_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let sql = format!(
            "UPDATE customer_subscriptions SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            COLUMNS
        );

        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(subscription_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("set subscription status", e))?;

        row.map(CustomerSubscription::try_from).transpose()
    }

    async fn reset_period_usage(&self, subscription_id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE customer_subscriptions
            SET custom_modules_created_this_period = 0, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("reset usage counter", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_period_usage(
        &self,
        subscription_id: &str,
    ) -> Result<Option<u32>, DomainError> {
        let value: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE customer_subscriptions
            SET custom_modules_created_this_period = custom_modules_created_this_period + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING custom_modules_created_this_period
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("increment usage counter", e))?;

        Ok(value.map(|v| v.max(0) as u32))
    }

    async fn find_by_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let sql = format!("SELECT {} FROM customer_subscriptions WHERE id = $1", COLUMNS);

        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("find subscription", e))?;

        row.map(CustomerSubscription::try_from).transpose()
    }

    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CustomerSubscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM customer_subscriptions
            WHERE user_id = $1
            ORDER BY (status IN ('active', 'trialing', 'past_due')) DESC, updated_at DESC
            LIMIT 1
            "#,
            COLUMNS
        );

        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("find subscription by user", e))?;

        row.map(CustomerSubscription::try_from).transpose()
    }
}
