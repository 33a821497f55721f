//! PostgreSQL implementation of PlanRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::{BillingInterval, PlanLimits, PlanTier, SubscriptionPlan};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::PlanRepository;

const COLUMNS: &str = "id, name, description, price_cents, currency, billing_interval, tier, \
     student_limit, module_limit, custom_module_limit, active";

pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: String,
    name: String,
    description: Option<String>,
    price_cents: i64,
    currency: String,
    billing_interval: String,
    tier: String,
    student_limit: i32,
    module_limit: i32,
    custom_module_limit: i32,
    active: bool,
}

fn limit_column(plan_id: &str, column: &str, value: u32) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|_| {
        DomainError::validation(
            column,
            format!("{} on plan {} is out of range: {}", column, plan_id, value),
        )
    })
}

fn limit(plan_id: &str, column: &str, value: i32) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Negative {} on plan {}", column, plan_id),
        )
    })
}

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let limits = PlanLimits {
            student_limit: limit(&row.id, "student_limit", row.student_limit)?,
            module_limit: limit(&row.id, "module_limit", row.module_limit)?,
            custom_module_limit: limit(&row.id, "custom_module_limit", row.custom_module_limit)?,
        };
        Ok(SubscriptionPlan {
            id: row.id,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            currency: row.currency,
            interval: BillingInterval::parse(&row.billing_interval),
            tier: PlanTier::parse(&row.tier),
            limits,
            active: row.active,
        })
    }
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn list_active(&self) -> Result<Vec<SubscriptionPlan>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscription_plans WHERE active ORDER BY price_cents ASC, id ASC",
            COLUMNS
        );
        let rows: Vec<PlanRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("list plans", e))?;

        rows.into_iter().map(SubscriptionPlan::try_from).collect()
    }

    async fn upsert(&self, plan: &SubscriptionPlan) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscription_plans (
                id, name, description, price_cents, currency, billing_interval, tier,
                student_limit, module_limit, custom_module_limit, active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price_cents = EXCLUDED.price_cents,
                currency = EXCLUDED.currency,
                billing_interval = EXCLUDED.billing_interval,
                tier = EXCLUDED.tier,
                student_limit = EXCLUDED.student_limit,
                module_limit = EXCLUDED.module_limit,
                custom_module_limit = EXCLUDED.custom_module_limit,
                active = EXCLUDED.active,
                updated_at = NOW()
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price_cents)
        .bind(&plan.currency)
        .bind(plan.interval.as_str())
        .bind(plan.tier.as_str())
        .bind(limit_column(&plan.id, "student_limit", plan.limits.student_limit)?)
        .bind(limit_column(&plan.id, "module_limit", plan.limits.module_limit)?)
        .bind(limit_column(
            &plan.id,
            "custom_module_limit",
            plan.limits.custom_module_limit,
        )?)
        .bind(plan.active)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("upsert plan", e))?;

        Ok(())
    }

    async fn find_by_id(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>, DomainError> {
        let sql = format!("SELECT {} FROM subscription_plans WHERE id = $1", COLUMNS);
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("find plan", e))?;

        row.map(SubscriptionPlan::try_from).transpose()
    }

    async fn find_active_by_tier(
        &self,
        tier: &PlanTier,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscription_plans WHERE active AND tier = $1 ORDER BY price_cents ASC, id ASC LIMIT 1",
            COLUMNS
        );
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .bind(tier.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("find plan by tier", e))?;

        row.map(SubscriptionPlan::try_from).transpose()
    }
}
