//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger, keyed by `account_id || sequence` (big-endian), so an
    /// account's transactions are contiguous and strictly ordered.
    pub const TRANSACTIONS: &str = "transactions";

    /// Subscription plans, keyed by big-endian plan id.
    pub const PLANS: &str = "plans";

    /// Subscriptions, keyed by `subscription_id`.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Index: subscriptions by account, keyed by `account_id || subscription_id`.
    /// Value is empty (index only).
    pub const SUBSCRIPTIONS_BY_ACCOUNT: &str = "subscriptions_by_account";

    /// Chat usage events, keyed by `chat_id`.
    pub const CHATS: &str = "chats";

    /// Index: chats by account, keyed by `account_id || chat_id`.
    /// Value is empty (index only).
    pub const CHATS_BY_ACCOUNT: &str = "chats_by_account";

    /// Quota window counters, keyed by `account_id`.
    pub const QUOTA_WINDOWS: &str = "quota_windows";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::PLANS,
        cf::SUBSCRIPTIONS,
        cf::SUBSCRIPTIONS_BY_ACCOUNT,
        cf::CHATS,
        cf::CHATS_BY_ACCOUNT,
        cf::QUOTA_WINDOWS,
    ]
}
