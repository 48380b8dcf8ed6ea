//! Chat usage events for chatmeter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ChatId, TokenCounts, TransactionId};

/// A metered chat, co-written with its `chat_cost` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsageEvent {
    /// Chat record ID.
    pub id: ChatId,

    /// The account charged.
    pub account_id: AccountId,

    /// Model used.
    pub model_name: String,

    /// Prompt tokens.
    pub input_tokens: u64,

    /// Completion tokens.
    pub output_tokens: u64,

    /// Cost charged in cents.
    pub cost_cents: i64,

    /// Where the token counts came from.
    pub token_source: TokenSource,

    /// The ledger transaction that paid for this chat.
    pub transaction_id: TransactionId,

    /// When the chat was committed.
    pub timestamp: DateTime<Utc>,
}

impl ChatUsageEvent {
    /// Total tokens of this chat.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        TokenCounts::new(self.input_tokens, self.output_tokens).total()
    }
}

/// Origin of a chat's token counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Exact counts supplied with the request.
    Reported,
    /// Exact counts returned by the inference collaborator.
    Collaborator,
    /// Estimated from text length.
    Estimated,
}

/// Per-model aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    /// Number of chats.
    pub count: u64,
    /// Total tokens.
    pub tokens: u64,
    /// Total cost in cents.
    pub cost_cents: i64,
}

/// Aggregate chat statistics for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStatistics {
    /// Number of chats.
    pub total_chats: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Total cost in cents.
    pub total_cost_cents: i64,
    /// Breakdown by model name.
    pub model_stats: BTreeMap<String, ModelStats>,
}

impl ChatStatistics {
    /// Aggregate a set of chat events.
    #[must_use]
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ChatUsageEvent>) -> Self {
        let mut stats = Self::default();
        for event in events {
            let tokens = event.total_tokens();
            stats.total_chats += 1;
            stats.total_tokens += tokens;
            stats.total_cost_cents += event.cost_cents;

            let model = stats.model_stats.entry(event.model_name.clone()).or_default();
            model.count += 1;
            model.tokens += tokens;
            model.cost_cents += event.cost_cents;
        }
        stats
    }
}
