//! Quota windows.
//!
//! Counters are bucketed by wall-clock boundary in UTC: one bucket per hour
//! for chats, one per calendar month for tokens. A counter whose bucket is
//! not the current one reads as zero, so crossing a boundary resets it with
//! no carryover and no decay.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Plan, RateLimitScope};

/// Whole hours since the Unix epoch.
#[must_use]
pub fn hour_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(3600)
}

/// `year * 12 + zero-based month`.
#[must_use]
pub fn month_bucket(at: DateTime<Utc>) -> i64 {
    i64::from(at.year()) * 12 + i64::from(at.month0())
}

/// Persisted quota counters for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindowState {
    /// Owning account.
    pub account_id: AccountId,

    /// Hour bucket `chats_in_current_hour` belongs to.
    pub hour_bucket: i64,

    /// Chats committed in `hour_bucket`.
    pub chats_in_current_hour: u32,

    /// Month bucket `tokens_in_current_month` belongs to.
    pub month_bucket: i64,

    /// Tokens committed in `month_bucket`.
    pub tokens_in_current_month: u64,
}

impl QuotaWindowState {
    /// Empty counters positioned at `now`.
    #[must_use]
    pub fn new(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            hour_bucket: hour_bucket(now),
            chats_in_current_hour: 0,
            month_bucket: month_bucket(now),
            tokens_in_current_month: 0,
        }
    }

    /// Chats counted against the hour containing `now`.
    #[must_use]
    pub fn chats_this_hour(&self, now: DateTime<Utc>) -> u32 {
        if self.hour_bucket == hour_bucket(now) {
            self.chats_in_current_hour
        } else {
            0
        }
    }

    /// Tokens counted against the month containing `now`.
    #[must_use]
    pub fn tokens_this_month(&self, now: DateTime<Utc>) -> u64 {
        if self.month_bucket == month_bucket(now) {
            self.tokens_in_current_month
        } else {
            0
        }
    }

    /// Record one chat of `tokens` at `now`, resetting stale buckets first.
    pub fn commit(&mut self, now: DateTime<Utc>, tokens: u64) {
        let hour = hour_bucket(now);
        let month = month_bucket(now);

        if self.hour_bucket != hour {
            self.hour_bucket = hour;
            self.chats_in_current_hour = 0;
        }
        if self.month_bucket != month {
            self.month_bucket = month;
            self.tokens_in_current_month = 0;
        }

        self.chats_in_current_hour = self.chats_in_current_hour.saturating_add(1);
        self.tokens_in_current_month = self.tokens_in_current_month.saturating_add(tokens);
    }

    /// Check these counters against `plan` at `now` without mutating them.
    #[must_use]
    pub fn check(&self, plan: &Plan, now: DateTime<Utc>) -> QuotaCheck {
        let chats_this_hour = self.chats_this_hour(now);
        let tokens_this_month = self.tokens_this_month(now);

        let exhausted = if chats_this_hour >= plan.max_chats_per_hour {
            Some(RateLimitScope::Hourly)
        } else if tokens_this_month >= plan.max_tokens_per_month {
            Some(RateLimitScope::Monthly)
        } else {
            None
        };

        QuotaCheck {
            allowed: exhausted.is_none(),
            chats_this_hour,
            tokens_this_month,
            exhausted,
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheck {
    /// Whether another chat may be sent now.
    pub allowed: bool,

    /// Chats already counted this hour.
    pub chats_this_hour: u32,

    /// Tokens already counted this month.
    pub tokens_this_month: u64,

    /// The exhausted window, when a plan limit is the reason for refusal.
    pub exhausted: Option<RateLimitScope>,
}

impl QuotaCheck {
    /// The zero-quota result for an account without an active subscription.
    #[must_use]
    pub const fn no_subscription(chats_this_hour: u32, tokens_this_month: u64) -> Self {
        Self {
            allowed: false,
            chats_this_hour,
            tokens_this_month,
            exhausted: None,
        }
    }
}
