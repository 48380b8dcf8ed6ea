//! In-memory storage implementation.
//!
//! All records live in plain maps behind one `RwLock`. Every compound
//! operation runs inside a single write guard, so it is atomic by
//! construction. Data is lost when the store is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use chatmeter_core::{
    Account, AccountId, ChatId, ChatUsageEvent, LedgerEntry, Plan, PlanId, QuotaWindowState,
    Subscription, SubscriptionId, Transaction,
};

use crate::error::{Result, StoreError};
use crate::{
    apply_entry, retire, ChatCommit, CommittedChat, Store, SubscriptionChange, SubscriptionSwap,
};

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<AccountId, Account>,
    ledgers: HashMap<AccountId, Vec<Transaction>>,
    plans: BTreeMap<PlanId, Plan>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    subscriptions_by_account: HashMap<AccountId, Vec<SubscriptionId>>,
    chats: HashMap<ChatId, ChatUsageEvent>,
    chats_by_account: HashMap<AccountId, Vec<ChatId>>,
    quotas: HashMap<AccountId, QuotaWindowState>,
}

/// Map-backed storage implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreError::Database`
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store offline".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.check_online()?;
        self.state
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.check_online()?;
        self.state
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }
}

/// Newest-first page over an insertion-ordered list.
fn page<T: Clone>(items: &[T], limit: usize, offset: usize) -> Vec<T> {
    items.iter().rev().skip(offset).take(limit).cloned().collect()
}

impl Store for MemoryStore {
    fn put_account(&self, account: &Account) -> Result<()> {
        self.write()?.accounts.insert(account.id, account.clone());
        Ok(())
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>> {
        Ok(self
            .read()?
            .accounts
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn append_entry(
        &self,
        account_id: &AccountId,
        entry: &LedgerEntry,
    ) -> Result<(Account, Transaction)> {
        let mut state = self.write()?;
        let mut account = state
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", account_id))?;

        let tx = apply_entry(&mut account, entry, Utc::now())?;

        state.ledgers.entry(*account_id).or_default().push(tx.clone());
        state.accounts.insert(*account_id, account.clone());
        Ok((account, tx))
    }

    fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let state = self.read()?;
        Ok(state
            .ledgers
            .get(account_id)
            .map(|ledger| page(ledger, limit, offset))
            .unwrap_or_default())
    }

    fn put_plan(&self, plan: &Plan) -> Result<()> {
        self.write()?.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    fn get_plan(&self, plan_id: PlanId) -> Result<Option<Plan>> {
        Ok(self.read()?.plans.get(&plan_id).cloned())
    }

    fn list_plans(&self) -> Result<Vec<Plan>> {
        Ok(self.read()?.plans.values().cloned().collect())
    }

    fn get_subscription(&self, subscription_id: &SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.read()?.subscriptions.get(subscription_id).cloned())
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut state = self.write()?;
        if state
            .subscriptions
            .insert(subscription.id, subscription.clone())
            .is_none()
        {
            state
                .subscriptions_by_account
                .entry(subscription.account_id)
                .or_default()
                .push(subscription.id);
        }
        Ok(())
    }

    fn list_subscriptions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Subscription>> {
        let state = self.read()?;
        let ids = state
            .subscriptions_by_account
            .get(account_id)
            .map(|ids| page(ids, limit, offset))
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| state.subscriptions.get(id).cloned())
            .collect())
    }

    fn replace_subscription(&self, change: &SubscriptionChange) -> Result<SubscriptionSwap> {
        let new = &change.subscription;
        let now = new.start_date;

        let mut state = self.write()?;
        let mut account = state
            .accounts
            .get(&new.account_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", new.account_id))?;

        let transaction = change
            .entry
            .as_ref()
            .map(|entry| apply_entry(&mut account, entry, now))
            .transpose()?;

        let replaced = account
            .current_subscription
            .filter(|id| *id != new.id)
            .and_then(|id| state.subscriptions.get(&id))
            .map(|previous| retire(previous, now));

        account.current_subscription = Some(new.id);
        account.updated_at = now;

        if let Some(tx) = &transaction {
            state.ledgers.entry(account.id).or_default().push(tx.clone());
        }
        if let Some(previous) = &replaced {
            state.subscriptions.insert(previous.id, previous.clone());
        }
        state.subscriptions.insert(new.id, new.clone());
        state
            .subscriptions_by_account
            .entry(account.id)
            .or_default()
            .push(new.id);
        state.accounts.insert(account.id, account.clone());

        Ok(SubscriptionSwap {
            account,
            subscription: new.clone(),
            transaction,
            replaced,
        })
    }

    fn get_quota(&self, account_id: &AccountId) -> Result<Option<QuotaWindowState>> {
        Ok(self.read()?.quotas.get(account_id).cloned())
    }

    fn commit_chat(&self, commit: &ChatCommit) -> Result<CommittedChat> {
        let mut state = self.write()?;
        let mut account = state
            .accounts
            .get(&commit.account_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", commit.account_id))?;

        let transaction = apply_entry(&mut account, &commit.entry(), commit.timestamp)?;
        let event = commit.event(transaction.id);

        state
            .ledgers
            .entry(account.id)
            .or_default()
            .push(transaction.clone());
        state.chats.insert(event.id, event.clone());
        state
            .chats_by_account
            .entry(account.id)
            .or_default()
            .push(event.id);
        state.quotas.insert(account.id, commit.quota.clone());
        state.accounts.insert(account.id, account.clone());

        Ok(CommittedChat {
            account,
            transaction,
            event,
        })
    }

    fn get_chat(&self, chat_id: &ChatId) -> Result<Option<ChatUsageEvent>> {
        Ok(self.read()?.chats.get(chat_id).cloned())
    }

    fn list_chats(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatUsageEvent>> {
        let state = self.read()?;
        let ids = state
            .chats_by_account
            .get(account_id)
            .map(|ids| page(ids, limit, offset))
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| state.chats.get(id).cloned())
            .collect())
    }

    fn count_chats(&self) -> Result<u64> {
        Ok(self.read()?.chats.len() as u64)
    }
}
