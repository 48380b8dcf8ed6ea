//! Hourly chat and monthly token quotas.

use chrono::{DateTime, Utc};

use chatmeter_core::{AccountId, Plan, QuotaCheck, QuotaWindowState, Result};

use super::MeteringEngine;

/// Quota status for display.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    /// Counters checked against the active plan (zero quota without one).
    pub check: QuotaCheck,
    /// The plan granting the quota, if a subscription is active.
    pub plan: Option<Plan>,
}

impl MeteringEngine {
    /// Stored counters for an account, or fresh ones at `now`.
    pub(crate) fn quota_window(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<QuotaWindowState> {
        Ok(self
            .store
            .get_quota(account_id)?
            .unwrap_or_else(|| QuotaWindowState::new(*account_id, now)))
    }

    /// Whether the account may send a chat now, with current usage.
    ///
    /// An account without an active subscription has zero quota.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn rate_limit_status(&self, account_id: &AccountId) -> Result<RateLimitStatus> {
        let now = Utc::now();
        let account = self.account(account_id)?;
        let window = self.quota_window(account_id, now)?;

        Ok(match self.active_subscription(&account, now)? {
            Some(active) => RateLimitStatus {
                check: window.check(&active.plan, now),
                plan: Some(active.plan),
            },
            None => RateLimitStatus {
                check: QuotaCheck::no_subscription(
                    window.chats_this_hour(now),
                    window.tokens_this_month(now),
                ),
                plan: None,
            },
        })
    }
}
