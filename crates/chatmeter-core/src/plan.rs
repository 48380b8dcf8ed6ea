//! Subscription plans and subscriptions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, PlanId, SubscriptionId};

/// A subscription tier with its quota limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan ID.
    pub id: PlanId,

    /// Display name.
    pub name: String,

    /// Price per period in cents.
    pub price_cents: i64,

    /// Length of one subscription period in days.
    pub duration_days: u32,

    /// Chats allowed per UTC hour.
    pub max_chats_per_hour: u32,

    /// Tokens allowed per UTC calendar month.
    pub max_tokens_per_month: u64,

    /// Whether VIP-tier models may be used.
    pub vip_model_access: bool,

    /// Marketing description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Plan {
    /// The catalog seeded into an empty store.
    #[must_use]
    pub fn default_catalog() -> Vec<Self> {
        vec![
            Self {
                id: PlanId(1),
                name: "Basic".into(),
                price_cents: 1000,
                duration_days: 30,
                max_chats_per_hour: 10,
                max_tokens_per_month: 100_000,
                vip_model_access: false,
                description: Some("Standard models for light use".into()),
            },
            Self {
                id: PlanId(2),
                name: "Pro".into(),
                price_cents: 2500,
                duration_days: 30,
                max_chats_per_hour: 50,
                max_tokens_per_month: 1_000_000,
                vip_model_access: false,
                description: Some("Standard models with higher limits".into()),
            },
            Self {
                id: PlanId(3),
                name: "VIP".into(),
                price_cents: 5000,
                duration_days: 30,
                max_chats_per_hour: 200,
                max_tokens_per_month: 5_000_000,
                vip_model_access: true,
                description: Some("All models including VIP tier".into()),
            },
        ]
    }
}

/// Status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Within its period and not superseded.
    Active,
    /// Its end date has passed.
    Expired,
    /// Superseded by a newer subscription before it ended.
    Replaced,
}

/// An account's time-bounded binding to one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: SubscriptionId,

    /// Subscribed account.
    pub account_id: AccountId,

    /// Plan subscribed to.
    pub plan_id: PlanId,

    /// Start of the period.
    pub start_date: DateTime<Utc>,

    /// End of the period (exclusive).
    pub end_date: DateTime<Utc>,

    /// Stored status. Use [`Subscription::status_at`] for gating decisions.
    pub status: SubscriptionStatus,
}

impl Subscription {
    /// Start a subscription to `plan` at `now`.
    #[must_use]
    pub fn start(account_id: AccountId, plan: &Plan, now: DateTime<Utc>) -> Self {
        Self {
            id: SubscriptionId::generate(),
            account_id,
            plan_id: plan.id,
            start_date: now,
            end_date: now + Duration::days(i64::from(plan.duration_days)),
            status: SubscriptionStatus::Active,
        }
    }

    /// Effective status at `now`, applying lazy expiry.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        match self.status {
            SubscriptionStatus::Active if now >= self.end_date => SubscriptionStatus::Expired,
            status => status,
        }
    }

    /// Whether the subscription grants quota at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == SubscriptionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic() -> Plan {
        Plan::default_catalog().remove(0)
    }

    #[test]
    fn default_catalog_has_one_vip_plan() {
        let plans = Plan::default_catalog();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans.iter().filter(|p| p.vip_model_access).count(), 1);
    }

    #[test]
    fn subscription_runs_for_plan_duration() {
        let now = Utc::now();
        let sub = Subscription::start(AccountId::generate(), &basic(), now);
        assert_eq!(sub.end_date - sub.start_date, Duration::days(30));
        assert!(sub.is_active_at(now));
        assert!(sub.is_active_at(now + Duration::days(29)));
    }

    #[test]
    fn subscription_expires_lazily_at_end_date() {
        let now = Utc::now();
        let sub = Subscription::start(AccountId::generate(), &basic(), now);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.status_at(sub.end_date), SubscriptionStatus::Expired);
    }

    #[test]
    fn replaced_subscription_stays_replaced() {
        let now = Utc::now();
        let mut sub = Subscription::start(AccountId::generate(), &basic(), now);
        sub.status = SubscriptionStatus::Replaced;
        assert_eq!(sub.status_at(now), SubscriptionStatus::Replaced);
        assert!(!sub.is_active_at(now));
    }
}
