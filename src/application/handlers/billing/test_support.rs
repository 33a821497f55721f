//! Shared fixtures for billing handler tests.

use std::sync::Arc;

use crate::adapters::memory::{
    InMemoryPaymentHistoryRepository, InMemoryPlanRepository, InMemoryProfileRepository,
    InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
};
use crate::adapters::stripe::MockPaymentGateway;
use crate::domain::billing::{
    BillingInterval, CustomerSubscription, PlanLimits, PlanTier, SubscriptionPlan,
    SubscriptionStatus, UserProfile, UserRole,
};
use crate::domain::foundation::{Timestamp, UserId};

pub const USER: &str = "user-1";
pub const CUSTOMER: &str = "cus_test";
pub const HOME_PLAN: &str = "price_home";
pub const PRO_PLAN: &str = "price_pro";

pub fn user_id() -> UserId {
    UserId::new(USER).unwrap()
}

pub fn free_plan() -> SubscriptionPlan {
    SubscriptionPlan {
        id: "free".to_string(),
        name: "Free".to_string(),
        description: None,
        price_cents: 0,
        currency: "usd".to_string(),
        interval: BillingInterval::Month,
        tier: PlanTier::Free,
        limits: PlanLimits::default(),
        active: true,
    }
}

pub fn paid_plan(id: &str, tier: PlanTier, custom_module_limit: u32) -> SubscriptionPlan {
    SubscriptionPlan {
        id: id.to_string(),
        name: tier.to_string(),
        description: None,
        price_cents: 999,
        currency: "usd".to_string(),
        interval: BillingInterval::Month,
        tier,
        limits: PlanLimits {
            student_limit: 30,
            module_limit: 50,
            custom_module_limit,
        },
        active: true,
    }
}

pub fn profile(role: UserRole, customer_id: Option<&str>) -> UserProfile {
    UserProfile {
        id: user_id(),
        email: "teacher@example.com".to_string(),
        display_name: Some("Ms. Reed".to_string()),
        role,
        customer_id: customer_id.map(String::from),
        subscription_status: None,
        plan_tier: PlanTier::Free,
        renewal_date: None,
    }
}

pub fn subscription(id: &str, plan_id: &str, status: SubscriptionStatus) -> CustomerSubscription {
    CustomerSubscription {
        id: id.to_string(),
        user_id: user_id(),
        plan_id: plan_id.to_string(),
        customer_id: CUSTOMER.to_string(),
        status,
        current_period_start: Timestamp::from_unix_secs(1_704_067_200),
        current_period_end: Timestamp::from_unix_secs(1_706_745_600),
        cancel_at_period_end: false,
        custom_modules_this_period: 0,
        created_at: Timestamp::now(),
        updated_at: Timestamp::now(),
    }
}

/// Every billing collaborator, in memory.
pub struct Harness {
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub plans: Arc<InMemoryPlanRepository>,
    pub payments: Arc<InMemoryPaymentHistoryRepository>,
    pub profiles: Arc<InMemoryProfileRepository>,
    pub webhook_events: Arc<InMemoryWebhookEventRepository>,
    pub gateway: Arc<MockPaymentGateway>,
}

impl Harness {
    /// Free, home and pro plans; no profiles.
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            plans: Arc::new(InMemoryPlanRepository::with_plans([
                free_plan(),
                paid_plan(HOME_PLAN, PlanTier::Home, 5),
                paid_plan(PRO_PLAN, PlanTier::Pro, 20),
            ])),
            payments: Arc::new(InMemoryPaymentHistoryRepository::new()),
            profiles: Arc::new(InMemoryProfileRepository::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
            gateway: Arc::new(MockPaymentGateway::new()),
        }
    }

    pub async fn with_profile(self, role: UserRole, customer_id: Option<&str>) -> Self {
        self.profiles.insert(profile(role, customer_id)).await;
        self
    }
}
