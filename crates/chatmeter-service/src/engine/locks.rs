//! Per-account write serialization.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use chatmeter_core::AccountId;

/// One async mutex per account, created on first use and dropped once no
/// writer holds or waits for it.
///
/// Held across the whole check-then-commit sequence of a write, including
/// awaits. Different accounts never contend.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account_id`.
    pub async fn lock(&self, account_id: AccountId) -> AccountGuard<'_> {
        let mutex = self.locks.entry(account_id).or_default().clone();
        AccountGuard {
            guard: Some(mutex.lock_owned().await),
            locks: &self.locks,
            account_id,
        }
    }

    /// Number of accounts currently locked or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no account is locked or waited on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one account. Releases on drop.
#[derive(Debug)]
pub struct AccountGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<AccountId, Arc<Mutex<()>>>,
    account_id: AccountId,
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody holds or awaits it.
        // Waiters clone the Arc under the same shard lock, so this cannot
        // race with a new locker.
        self.locks
            .remove_if(&self.account_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
