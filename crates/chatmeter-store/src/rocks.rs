//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use chatmeter_core::{
    Account, AccountId, ChatId, ChatUsageEvent, LedgerEntry, Plan, PlanId, QuotaWindowState,
    Subscription, SubscriptionId, Transaction,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{
    apply_entry, retire, ChatCommit, CommittedChat, Store, SubscriptionChange, SubscriptionSwap,
};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(db_err)?;

        tracing::debug!(path = %path.as_ref().display(), "opened rocksdb store");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db.put_cf(&cf, key, value).map_err(db_err)
    }

    fn require_account(&self, account_id: &AccountId) -> Result<Account> {
        self.get_account(account_id)?
            .ok_or_else(|| StoreError::not_found("account", account_id))
    }

    /// Keys under an account prefix, newest (highest key) first.
    fn scan_account_desc(
        &self,
        cf_name: &str,
        account_id: &AccountId,
        suffix_len: usize,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::account_prefix(account_id);
        let end = keys::account_range_end(account_id, suffix_len);

        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(end.as_slice(), Direction::Reverse));

        for item in iter.skip(offset) {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) || out.len() >= limit {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        self.put(cf::ACCOUNTS, &keys::account_key(&account.id), account)
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.get(cf::ACCOUNTS, &keys::account_key(account_id))
    }

    fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .skip(offset)
            .take(limit)
            .map(|item| {
                let (_, value) = item.map_err(db_err)?;
                Self::deserialize(&value)
            })
            .collect()
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn append_entry(
        &self,
        account_id: &AccountId,
        entry: &LedgerEntry,
    ) -> Result<(Account, Transaction)> {
        let mut account = self.require_account(account_id)?;
        let tx = apply_entry(&mut account, entry, Utc::now())?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(account_id),
            Self::serialize(&account)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(account_id, tx.sequence),
            Self::serialize(&tx)?,
        );
        self.db.write(batch).map_err(db_err)?;

        Ok((account, tx))
    }

    fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.scan_account_desc(cf::TRANSACTIONS, account_id, 8, limit, offset)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect()
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    fn put_plan(&self, plan: &Plan) -> Result<()> {
        self.put(cf::PLANS, &keys::plan_key(plan.id), plan)
    }

    fn get_plan(&self, plan_id: PlanId) -> Result<Option<Plan>> {
        self.get(cf::PLANS, &keys::plan_key(plan_id))
    }

    fn list_plans(&self) -> Result<Vec<Plan>> {
        let cf = self.cf(cf::PLANS)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(db_err)?;
                Self::deserialize(&value)
            })
            .collect()
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn get_subscription(&self, subscription_id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.get(cf::SUBSCRIPTIONS, &keys::subscription_key(subscription_id))
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let cf_subs = self.cf(cf::SUBSCRIPTIONS)?;
        let cf_by_account = self.cf(cf::SUBSCRIPTIONS_BY_ACCOUNT)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_subs,
            keys::subscription_key(&subscription.id),
            Self::serialize(subscription)?,
        );
        batch.put_cf(
            &cf_by_account,
            keys::account_subscription_key(&subscription.account_id, &subscription.id),
            [],
        );
        self.db.write(batch).map_err(db_err)
    }

    fn list_subscriptions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for (key, _) in
            self.scan_account_desc(cf::SUBSCRIPTIONS_BY_ACCOUNT, account_id, 16, limit, offset)?
        {
            let Some(bytes) = keys::index_suffix(&key) else {
                continue;
            };
            if let Some(sub) = self.get_subscription(&SubscriptionId::from_bytes(bytes))? {
                subscriptions.push(sub);
            }
        }
        Ok(subscriptions)
    }

    fn replace_subscription(&self, change: &SubscriptionChange) -> Result<SubscriptionSwap> {
        let new = &change.subscription;
        let now = new.start_date;

        let mut account = self.require_account(&new.account_id)?;
        let transaction = change
            .entry
            .as_ref()
            .map(|entry| apply_entry(&mut account, entry, now))
            .transpose()?;

        let replaced = match account.current_subscription.filter(|id| *id != new.id) {
            Some(id) => self
                .get_subscription(&id)?
                .map(|previous| retire(&previous, now)),
            None => None,
        };

        account.current_subscription = Some(new.id);
        account.updated_at = now;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_subs = self.cf(cf::SUBSCRIPTIONS)?;
        let cf_by_account = self.cf(cf::SUBSCRIPTIONS_BY_ACCOUNT)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.id),
            Self::serialize(&account)?,
        );
        if let Some(tx) = &transaction {
            batch.put_cf(
                &cf_tx,
                keys::transaction_key(&account.id, tx.sequence),
                Self::serialize(tx)?,
            );
        }
        if let Some(previous) = &replaced {
            batch.put_cf(
                &cf_subs,
                keys::subscription_key(&previous.id),
                Self::serialize(previous)?,
            );
        }
        batch.put_cf(&cf_subs, keys::subscription_key(&new.id), Self::serialize(new)?);
        batch.put_cf(
            &cf_by_account,
            keys::account_subscription_key(&account.id, &new.id),
            [],
        );
        self.db.write(batch).map_err(db_err)?;

        Ok(SubscriptionSwap {
            account,
            subscription: new.clone(),
            transaction,
            replaced,
        })
    }

    // =========================================================================
    // Chat Operations
    // =========================================================================

    fn get_quota(&self, account_id: &AccountId) -> Result<Option<QuotaWindowState>> {
        self.get(cf::QUOTA_WINDOWS, &keys::quota_key(account_id))
    }

    fn commit_chat(&self, commit: &ChatCommit) -> Result<CommittedChat> {
        let mut account = self.require_account(&commit.account_id)?;
        let transaction = apply_entry(&mut account, &commit.entry(), commit.timestamp)?;
        let event = commit.event(transaction.id);

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_chats = self.cf(cf::CHATS)?;
        let cf_chats_by_account = self.cf(cf::CHATS_BY_ACCOUNT)?;
        let cf_quota = self.cf(cf::QUOTA_WINDOWS)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.id),
            Self::serialize(&account)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&account.id, transaction.sequence),
            Self::serialize(&transaction)?,
        );
        batch.put_cf(&cf_chats, keys::chat_key(&event.id), Self::serialize(&event)?);
        batch.put_cf(
            &cf_chats_by_account,
            keys::account_chat_key(&account.id, &event.id),
            [],
        );
        batch.put_cf(
            &cf_quota,
            keys::quota_key(&account.id),
            Self::serialize(&commit.quota)?,
        );
        self.db.write(batch).map_err(db_err)?;

        Ok(CommittedChat {
            account,
            transaction,
            event,
        })
    }

    fn get_chat(&self, chat_id: &ChatId) -> Result<Option<ChatUsageEvent>> {
        self.get(cf::CHATS, &keys::chat_key(chat_id))
    }

    fn list_chats(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatUsageEvent>> {
        let mut chats = Vec::new();
        for (key, _) in
            self.scan_account_desc(cf::CHATS_BY_ACCOUNT, account_id, 16, limit, offset)?
        {
            let Some(bytes) = keys::index_suffix(&key) else {
                continue;
            };
            if let Some(chat) = self.get_chat(&ChatId::from_bytes(bytes))? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    fn count_chats(&self) -> Result<u64> {
        let cf = self.cf(cf::CHATS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(db_err)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmeter_core::{SubscriptionStatus, TokenCounts, TokenSource, TransactionType};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn funded(store: &RocksStore, cents: i64) -> AccountId {
        let account_id = AccountId::generate();
        store.put_account(&Account::new(account_id, "carol")).unwrap();
        store
            .append_entry(&account_id, &LedgerEntry::deposit(cents, "seed"))
            .unwrap();
        account_id
    }

    #[test]
    fn account_crud() {
        let (store, _dir) = create_test_store();
        let account_id = AccountId::generate();
        let mut account = Account::new(account_id, "carol");
        account.email = Some("carol@example.com".into());

        store.put_account(&account).unwrap();
        let retrieved = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(retrieved, account);

        assert!(store.get_account(&AccountId::generate()).unwrap().is_none());
        assert_eq!(store.list_accounts(10, 0).unwrap().len(), 1);
        assert!(store.list_accounts(10, 1).unwrap().is_empty());
    }

    #[test]
    fn ledger_is_ordered_by_sequence() {
        let (store, _dir) = create_test_store();
        let account_id = funded(&store, 1000);

        for sequence in 2..=300 {
            let (_, tx) = store
                .append_entry(&account_id, &LedgerEntry::deposit(1, "drip"))
                .unwrap();
            assert_eq!(tx.sequence, sequence);
        }

        let newest = store.list_transactions(&account_id, 3, 0).unwrap();
        assert_eq!(
            newest.iter().map(|tx| tx.sequence).collect::<Vec<_>>(),
            vec![300, 299, 298]
        );

        let oldest = store.list_transactions(&account_id, 10, 299).unwrap();
        assert_eq!(oldest.len(), 1);
        assert_eq!(oldest[0].sequence, 1);
        assert_eq!(oldest[0].amount_cents, 1000);

        // A second account's ledger does not bleed into the first.
        let other = funded(&store, 5);
        assert_eq!(store.list_transactions(&other, 100, 0).unwrap().len(), 1);
    }

    #[test]
    fn insufficient_debit_writes_nothing() {
        let (store, _dir) = create_test_store();
        let account_id = funded(&store, 50);

        let err = store
            .append_entry(
                &account_id,
                &LedgerEntry::debit(51, TransactionType::Withdrawal, "correction"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCredits {
                balance: 50,
                required: 51
            }
        ));
        assert_eq!(store.list_transactions(&account_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn plans_round_trip_in_id_order() {
        let (store, _dir) = create_test_store();
        for plan in Plan::default_catalog().into_iter().rev() {
            store.put_plan(&plan).unwrap();
        }

        let plans = store.list_plans().unwrap();
        assert_eq!(
            plans.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![PlanId(1), PlanId(2), PlanId(3)]
        );
        assert_eq!(store.get_plan(PlanId(3)).unwrap().unwrap().name, "VIP");
        assert!(store.get_plan(PlanId(99)).unwrap().is_none());
    }

    #[test]
    fn subscription_swap_and_history() {
        let (store, _dir) = create_test_store();
        let account_id = funded(&store, 10_000);
        let plans = Plan::default_catalog();
        let now = Utc::now();

        let first = Subscription::start(account_id, &plans[0], now);
        store
            .replace_subscription(&SubscriptionChange {
                subscription: first.clone(),
                entry: Some(LedgerEntry::subscription(plans[0].price_cents, &plans[0].name)),
            })
            .unwrap();

        let second = Subscription::start(account_id, &plans[1], now);
        let swap = store
            .replace_subscription(&SubscriptionChange {
                subscription: second.clone(),
                entry: Some(LedgerEntry::subscription(plans[1].price_cents, &plans[1].name)),
            })
            .unwrap();

        assert_eq!(swap.replaced.map(|s| s.id), Some(first.id));
        assert_eq!(
            swap.account.balance_cents,
            10_000 - plans[0].price_cents - plans[1].price_cents
        );
        assert_eq!(
            store.get_subscription(&first.id).unwrap().unwrap().status,
            SubscriptionStatus::Replaced
        );

        let history = store.list_subscriptions(&account_id, 10, 0).unwrap();
        assert_eq!(
            history.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[test]
    fn chat_commit_is_persisted() {
        let (store, _dir) = create_test_store();
        let account_id = funded(&store, 1000);
        let now = Utc::now();
        let mut quota = QuotaWindowState::new(account_id, now);
        quota.commit(now, 300);

        let committed = store
            .commit_chat(&ChatCommit {
                chat_id: ChatId::generate(),
                account_id,
                model_name: "llama-2".into(),
                tokens: TokenCounts::new(200, 100),
                token_source: TokenSource::Estimated,
                cost_cents: 1,
                quota: quota.clone(),
                timestamp: now,
            })
            .unwrap();

        assert_eq!(committed.account.balance_cents, 999);
        assert_eq!(committed.account.lifetime_spent_cents, 1);
        assert_eq!(store.get_quota(&account_id).unwrap(), Some(quota));
        assert_eq!(
            store.list_chats(&account_id, 10, 0).unwrap(),
            vec![committed.event.clone()]
        );
        assert_eq!(
            store.get_chat(&committed.event.id).unwrap().unwrap().transaction_id,
            committed.transaction.id
        );
        assert_eq!(store.count_chats().unwrap(), 1);
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let account_id = {
            let store = RocksStore::open(dir.path()).unwrap();
            funded(&store, 777)
        };

        let store = RocksStore::open(dir.path()).unwrap();
        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.balance_cents, 777);
        assert_eq!(account.ledger_seq, 1);
    }
}
