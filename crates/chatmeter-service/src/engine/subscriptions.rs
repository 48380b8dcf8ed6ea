//! Subscriptions: purchase, lazy expiry and history.

use chrono::{DateTime, Utc};

use chatmeter_core::{
    Account, AccountId, LedgerEntry, MeteringError, Plan, PlanId, Result, Subscription,
    SubscriptionStatus,
};
use chatmeter_store::{SubscriptionChange, SubscriptionSwap};

use super::MeteringEngine;

/// A subscription that grants quota right now, with its plan.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    /// The subscription record.
    pub subscription: Subscription,
    /// Its plan.
    pub plan: Plan,
}

/// Usage of the current subscription period.
#[derive(Debug, Clone)]
pub struct SubscriptionUsage {
    /// The active subscription.
    pub active: ActiveSubscription,
    /// Chats counted in the current hour.
    pub chats_this_hour: u32,
    /// Tokens counted in the current month.
    pub tokens_this_month: u64,
}

impl SubscriptionUsage {
    /// Chats left in the current hour.
    #[must_use]
    pub fn chats_remaining(&self) -> u32 {
        self.active
            .plan
            .max_chats_per_hour
            .saturating_sub(self.chats_this_hour)
    }

    /// Tokens left in the current month.
    #[must_use]
    pub fn tokens_remaining(&self) -> u64 {
        self.active
            .plan
            .max_tokens_per_month
            .saturating_sub(self.tokens_this_month)
    }
}

impl MeteringEngine {
    /// The account's subscription if it is active at `now`.
    ///
    /// A subscription whose period has ended is persisted as `Expired` the
    /// first time it is observed.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store fails.
    pub fn active_subscription(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveSubscription>> {
        let Some(subscription_id) = account.current_subscription else {
            return Ok(None);
        };
        let Some(mut subscription) = self.store.get_subscription(&subscription_id)? else {
            tracing::warn!(
                account_id = %account.id,
                subscription_id = %subscription_id,
                "Current subscription record missing"
            );
            return Ok(None);
        };

        let status = subscription.status_at(now);
        if status != subscription.status {
            subscription.status = status;
            self.store.put_subscription(&subscription)?;
            tracing::info!(
                account_id = %account.id,
                subscription_id = %subscription.id,
                "Subscription expired"
            );
        }
        if status != SubscriptionStatus::Active {
            return Ok(None);
        }

        let plan = self.catalog.get(subscription.plan_id)?;
        Ok(Some(ActiveSubscription { subscription, plan }))
    }

    /// Subscribe an account to a plan, charging its price.
    ///
    /// The previous subscription, if any, is retired. Quota counters are
    /// kept as they are.
    ///
    /// # Errors
    ///
    /// - `AccountInactive` if the account is not active.
    /// - `NotFound` for an unknown account or plan.
    /// - `InsufficientCredit` if the price cannot be paid; nothing changes.
    pub async fn subscribe(
        &self,
        account_id: &AccountId,
        plan_id: PlanId,
    ) -> Result<SubscriptionSwap> {
        let _guard = self.locks.lock(*account_id).await;

        let account = self.account(account_id)?;
        if !account.is_active() {
            return Err(MeteringError::AccountInactive);
        }
        let plan = self.catalog.get(plan_id)?;

        let change = SubscriptionChange {
            subscription: Subscription::start(*account_id, &plan, Utc::now()),
            entry: (plan.price_cents > 0)
                .then(|| LedgerEntry::subscription(plan.price_cents, &plan.name)),
        };
        let swap = self.store.replace_subscription(&change)?;

        tracing::info!(
            account_id = %account_id,
            plan = %plan.name,
            price_cents = plan.price_cents,
            new_balance = swap.account.balance_cents,
            replaced = ?swap.replaced.as_ref().map(|s| s.id),
            "Subscribed"
        );
        Ok(swap)
    }

    /// The current subscription if active.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn current_subscription(&self, account_id: &AccountId) -> Result<Option<ActiveSubscription>> {
        let account = self.account(account_id)?;
        self.active_subscription(&account, Utc::now())
    }

    /// Usage of the active subscription.
    ///
    /// # Errors
    ///
    /// Returns `NoSubscription` when nothing is active.
    pub fn subscription_usage(&self, account_id: &AccountId) -> Result<SubscriptionUsage> {
        let now = Utc::now();
        let account = self.account(account_id)?;
        let active = self
            .active_subscription(&account, now)?
            .ok_or(MeteringError::NoSubscription)?;
        let window = self.quota_window(account_id, now)?;

        Ok(SubscriptionUsage {
            chats_this_hour: window.chats_this_hour(now),
            tokens_this_month: window.tokens_this_month(now),
            active,
        })
    }

    /// Past and present subscriptions, newest first, with effective status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn subscription_history(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Subscription>> {
        self.account(account_id)?;
        let now = Utc::now();
        let mut history = self.store.list_subscriptions(account_id, limit, offset)?;
        for subscription in &mut history {
            subscription.status = subscription.status_at(now);
        }
        Ok(history)
    }
}
