//! PostgreSQL implementation of ProfileRepository.
//!
//! Only the billing columns of `user_profiles` are written here. Profiles
//! themselves are created by the account service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{
    BillingMirror, PlanTier, RenewalUpdate, SubscriptionStatus, UserProfile, UserRole,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::ProfileRepository;

const COLUMNS: &str = "id, email, display_name, role, stripe_customer_id, subscription_status, \
     subscription_plan_tier, subscription_renewal_date";

pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        filter: &str,
        value: &str,
        operation: &str,
    ) -> Result<Option<UserProfile>, DomainError> {
        let sql = format!("SELECT {} FROM user_profiles WHERE {}", COLUMNS, filter);
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(operation, e))?;

        row.map(UserProfile::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: String,
    email: String,
    display_name: Option<String>,
    role: String,
    stripe_customer_id: Option<String>,
    subscription_status: Option<String>,
    subscription_plan_tier: String,
    subscription_renewal_date: Option<DateTime<Utc>>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = DomainError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let invalid = |e: crate::domain::foundation::ValidationError| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid profile row: {}", e))
        };

        let subscription_status = row
            .subscription_status
            .as_deref()
            .map(str::parse::<SubscriptionStatus>)
            .transpose()
            .map_err(invalid)?;

        Ok(UserProfile {
            id: UserId::new(row.id).map_err(invalid)?,
            role: row.role.parse::<UserRole>().map_err(invalid)?,
            email: row.email,
            display_name: row.display_name,
            customer_id: row.stripe_customer_id,
            subscription_status,
            plan_tier: PlanTier::parse(&row.subscription_plan_tier),
            renewal_date: row.subscription_renewal_date.map(Timestamp::from_datetime),
        })
    }
}

#[async_trait]
impl ProfileRepository for PostgresProfileRepository {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, DomainError> {
        self.find_one("id = $1", user_id.as_str(), "find profile")
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, DomainError> {
        self.find_one("LOWER(email) = LOWER($1)", email, "find profile by email")
            .await
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, DomainError> {
        self.find_one(
            "stripe_customer_id = $1",
            customer_id,
            "find profile by customer",
        )
        .await
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE user_profiles SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id.as_str())
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("link billing customer", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::UserNotFound,
                format!("Profile not found: {}", user_id),
            ));
        }

        Ok(())
    }

    async fn update_billing_mirror(
        &self,
        user_id: &UserId,
        mirror: &BillingMirror,
    ) -> Result<bool, DomainError> {
        let (keep_renewal, renewal) = match mirror.renewal {
            RenewalUpdate::Keep => (true, None),
            RenewalUpdate::Set(ts) => (false, Some(*ts.as_datetime())),
            RenewalUpdate::Clear => (false, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE user_profiles SET
                subscription_status = $2,
                subscription_plan_tier = COALESCE($3, subscription_plan_tier),
                subscription_renewal_date = CASE WHEN $4 THEN subscription_renewal_date ELSE $5 END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_str())
        .bind(mirror.status.as_str())
        .bind(mirror.plan_tier.as_ref().map(PlanTier::as_str))
        .bind(keep_renewal)
        .bind(renewal)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("update billing mirror", e))?;

        Ok(result.rows_affected() > 0)
    }
}
