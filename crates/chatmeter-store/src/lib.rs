//! Storage layer for chatmeter.
//!
//! This crate persists accounts, the credit ledger, plans, subscriptions,
//! chat usage events and quota counters.
//!
//! # Architecture
//!
//! Two backends implement [`Store`]:
//!
//! - [`RocksStore`] (feature `rocksdb-backend`, on by default): column families
//!   with CBOR values, compound operations written through one `WriteBatch`
//! - [`MemoryStore`]: a single lock around plain maps, for tests and
//!   `DATA_DIR=:memory:`
//!
//! Compound operations ([`Store::append_entry`], [`Store::replace_subscription`],
//! [`Store::commit_chat`]) either apply every write or none of them. They do
//! not serialize concurrent callers on the same account; the metering engine
//! holds a per-account lock around each read-modify-write.
//!
//! # Example
//!
//! ```
//! use chatmeter_core::{Account, AccountId, LedgerEntry};
//! use chatmeter_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let account_id = AccountId::generate();
//! store.put_account(&Account::new(account_id, "alice")).unwrap();
//!
//! let (account, tx) = store
//!     .append_entry(&account_id, &LedgerEntry::deposit(500, "Credit purchase"))
//!     .unwrap();
//! assert_eq!(account.balance_cents, 500);
//! assert_eq!(tx.sequence, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use chatmeter_core::{
    Account, AccountId, ChatId, ChatUsageEvent, LedgerEntry, Plan, PlanId, QuotaWindowState,
    Subscription, SubscriptionId, SubscriptionStatus, TokenCounts, TokenSource, Transaction,
    TransactionId, TransactionType,
};

/// Everything written when a chat is metered.
#[derive(Debug, Clone)]
pub struct ChatCommit {
    /// ID of the chat record to create.
    pub chat_id: ChatId,
    /// The account charged.
    pub account_id: AccountId,
    /// Model used.
    pub model_name: String,
    /// Token counts billed.
    pub tokens: TokenCounts,
    /// Where the counts came from.
    pub token_source: TokenSource,
    /// Cost in cents (positive).
    pub cost_cents: i64,
    /// Quota counters with this chat already committed.
    pub quota: QuotaWindowState,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
}

impl ChatCommit {
    /// The `chat_cost` ledger entry for this chat.
    #[must_use]
    pub fn entry(&self) -> LedgerEntry {
        LedgerEntry::chat_cost(
            self.cost_cents,
            &self.model_name,
            self.tokens.input_tokens,
            self.tokens.output_tokens,
        )
    }

    /// The usage event recorded for this chat.
    #[must_use]
    pub fn event(&self, transaction_id: TransactionId) -> ChatUsageEvent {
        ChatUsageEvent {
            id: self.chat_id,
            account_id: self.account_id,
            model_name: self.model_name.clone(),
            input_tokens: self.tokens.input_tokens,
            output_tokens: self.tokens.output_tokens,
            cost_cents: self.cost_cents,
            token_source: self.token_source,
            transaction_id,
            timestamp: self.timestamp,
        }
    }
}

/// Result of [`Store::commit_chat`].
#[derive(Debug, Clone)]
pub struct CommittedChat {
    /// Account after the debit.
    pub account: Account,
    /// The `chat_cost` transaction.
    pub transaction: Transaction,
    /// The stored usage event.
    pub event: ChatUsageEvent,
}

/// A new subscription plus the optional charge for it.
#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    /// The subscription to activate. Its `start_date` is used as "now".
    pub subscription: Subscription,
    /// Debit for the plan price; `None` for free plans.
    pub entry: Option<LedgerEntry>,
}

/// Result of [`Store::replace_subscription`].
#[derive(Debug, Clone)]
pub struct SubscriptionSwap {
    /// Account after the change.
    pub account: Account,
    /// The new subscription, now current.
    pub subscription: Subscription,
    /// The `subscription` transaction, if a charge was made.
    pub transaction: Option<Transaction>,
    /// The previous subscription, with its final status.
    pub replaced: Option<Subscription>,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (`RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// List accounts in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Apply one ledger entry: update the balance and append the transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist and
    /// `StoreError::InsufficientCredits` if the balance would go negative.
    fn append_entry(
        &self,
        account_id: &AccountId,
        entry: &LedgerEntry,
    ) -> Result<(Account, Transaction)>;

    /// List an account's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// Insert or replace a plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_plan(&self, plan: &Plan) -> Result<()>;

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_plan(&self, plan_id: PlanId) -> Result<Option<Plan>>;

    /// List all plans ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_plans(&self) -> Result<Vec<Plan>>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Get a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, subscription_id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// Overwrite a subscription record (used to persist lazy expiry).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// List an account's subscriptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_subscriptions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Subscription>>;

    /// Charge for and activate a subscription, retiring the previous one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist and
    /// `StoreError::InsufficientCredits` if the charge cannot be paid.
    /// Nothing is written on error.
    fn replace_subscription(&self, change: &SubscriptionChange) -> Result<SubscriptionSwap>;

    // =========================================================================
    // Chat Operations
    // =========================================================================

    /// Get the quota counters for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_quota(&self, account_id: &AccountId) -> Result<Option<QuotaWindowState>>;

    /// Debit the chat cost, append the transaction, record the usage event and
    /// store the quota counters, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist and
    /// `StoreError::InsufficientCredits` if the balance is too low.
    fn commit_chat(&self, commit: &ChatCommit) -> Result<CommittedChat>;

    /// Get a chat usage event by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat(&self, chat_id: &ChatId) -> Result<Option<ChatUsageEvent>>;

    /// List an account's chats, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_chats(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatUsageEvent>>;

    /// Total number of chats across all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_chats(&self) -> Result<u64>;
}

/// Apply `entry` to `account` in place and build the resulting transaction.
///
/// Leaves `account` untouched on error.
pub(crate) fn apply_entry(
    account: &mut Account,
    entry: &LedgerEntry,
    now: DateTime<Utc>,
) -> Result<Transaction> {
    if entry.amount_cents == 0 {
        return Err(StoreError::InvalidAmount("ledger entry of zero".into()));
    }

    let balance_after = account
        .balance_cents
        .checked_add(entry.amount_cents)
        .ok_or_else(|| StoreError::InvalidAmount("balance overflow".into()))?;

    if balance_after < 0 {
        return Err(StoreError::InsufficientCredits {
            balance: account.balance_cents,
            required: -entry.amount_cents,
        });
    }

    account.balance_cents = balance_after;
    account.ledger_seq += 1;
    account.updated_at = now;

    match entry.transaction_type {
        TransactionType::Deposit => account.lifetime_deposited_cents += entry.amount_cents,
        TransactionType::ChatCost | TransactionType::Subscription => {
            account.lifetime_spent_cents -= entry.amount_cents;
        }
        TransactionType::Withdrawal => {}
    }

    Ok(Transaction::from_entry(
        account.id,
        account.ledger_seq,
        entry,
        balance_after,
        now,
    ))
}

/// Final status of the subscription being replaced at `now`.
pub(crate) fn retire(previous: &Subscription, now: DateTime<Utc>) -> Subscription {
    let mut retired = previous.clone();
    retired.status = match previous.status_at(now) {
        SubscriptionStatus::Active => SubscriptionStatus::Replaced,
        other => other,
    };
    retired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_past_zero_is_rejected_without_mutation() {
        let mut account = Account::new(AccountId::generate(), "bob");
        account.balance_cents = 100;

        let err = apply_entry(&mut account, &LedgerEntry::chat_cost(150, "gpt-4", 1, 1), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCredits {
                balance: 100,
                required: 150
            }
        ));
        assert_eq!(account.balance_cents, 100);
        assert_eq!(account.ledger_seq, 0);
    }

    #[test]
    fn entries_track_lifetime_totals() {
        let mut account = Account::new(AccountId::generate(), "bob");
        let now = Utc::now();

        let tx = apply_entry(&mut account, &LedgerEntry::deposit(1000, "top-up"), now).unwrap();
        assert_eq!(tx.sequence, 1);
        assert_eq!(tx.balance_after_cents, 1000);

        let tx = apply_entry(&mut account, &LedgerEntry::subscription(400, "Basic"), now).unwrap();
        assert_eq!(tx.sequence, 2);
        assert_eq!(tx.amount_cents, -400);

        assert_eq!(account.balance_cents, 600);
        assert_eq!(account.lifetime_deposited_cents, 1000);
        assert_eq!(account.lifetime_spent_cents, 400);
    }

    #[test]
    fn exact_balance_debit_reaches_zero() {
        let mut account = Account::new(AccountId::generate(), "bob");
        account.balance_cents = 9;

        let tx = apply_entry(&mut account, &LedgerEntry::chat_cost(9, "gpt-4", 1, 1), Utc::now())
            .unwrap();
        assert_eq!(tx.balance_after_cents, 0);
    }

    #[test]
    fn retiring_an_expired_subscription_keeps_expired() {
        let plan = Plan::default_catalog().remove(0);
        let start = Utc::now() - chrono::Duration::days(40);
        let previous = Subscription::start(AccountId::generate(), &plan, start);

        assert_eq!(retire(&previous, Utc::now()).status, SubscriptionStatus::Expired);
        assert_eq!(retire(&previous, start).status, SubscriptionStatus::Replaced);
    }
}
