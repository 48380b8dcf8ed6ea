//! The metering engine.
//!
//! Owns every balance, subscription and quota mutation. Handlers call into
//! it; it talks to the store and the token counter.
//!
//! - [`ledger`]: balances, credits, debits and transaction history
//! - [`catalog`]: the plan table
//! - [`subscriptions`]: subscribe, lazy expiry, history
//! - [`quota`]: hourly and monthly counters
//! - [`metering`]: the chat gateway
//! - [`usage`]: chat history and statistics
//! - [`admin`]: status toggles, grants and statistics

pub mod admin;
pub mod catalog;
pub mod ledger;
pub mod locks;
pub mod metering;
pub mod quota;
pub mod subscriptions;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use chatmeter_core::{Account, AccountId, MeteringError, PricingConfig, Result};
use chatmeter_store::Store;

pub use admin::AdminStats;
pub use catalog::PlanCatalog;
pub use ledger::Registration;
pub use locks::{AccountGuard, AccountLocks};
pub use metering::{ChatReceipt, ChatRequest};
pub use quota::RateLimitStatus;
pub use subscriptions::{ActiveSubscription, SubscriptionUsage};

use crate::inference::TokenCounter;

/// Shared engine state.
pub struct MeteringEngine {
    store: Arc<dyn Store>,
    locks: AccountLocks,
    catalog: PlanCatalog,
    pricing: PricingConfig,
    token_counter: Arc<dyn TokenCounter>,
    inference_timeout: Duration,
}

impl MeteringEngine {
    /// Build an engine over `store`, loading (and seeding) the plan catalog.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the plan catalog cannot be loaded.
    pub fn new(
        store: Arc<dyn Store>,
        pricing: PricingConfig,
        token_counter: Arc<dyn TokenCounter>,
        inference_timeout: Duration,
    ) -> Result<Self> {
        let catalog = PlanCatalog::load(Arc::clone(&store))?;
        Ok(Self {
            store,
            locks: AccountLocks::new(),
            catalog,
            pricing,
            token_counter,
            inference_timeout,
        })
    }

    /// The plan catalog.
    #[must_use]
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// The pricing table.
    #[must_use]
    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Load an account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn account(&self, account_id: &AccountId) -> Result<Account> {
        self.store
            .get_account(account_id)?
            .ok_or_else(|| MeteringError::not_found("account", account_id))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chatmeter_core::{LedgerEntry, PlanId, TokenCounts};
    use chatmeter_store::MemoryStore;

    use super::*;
    use crate::inference::NoTokenCounter;

    /// Token counter returning fixed counts and recording how often it ran.
    #[derive(Default)]
    pub struct FixedCounter {
        pub counts: Option<TokenCounts>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl FixedCounter {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenCounter for FixedCounter {
        async fn count_tokens(&self, _: &str, _: &str, _: Option<&str>) -> Option<TokenCounts> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.counts
        }
    }

    pub fn engine_with(
        pricing: PricingConfig,
        counter: Arc<dyn TokenCounter>,
    ) -> (MeteringEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = MeteringEngine::new(
            Arc::clone(&store) as Arc<dyn Store>,
            pricing,
            counter,
            Duration::from_millis(200),
        )
        .unwrap();
        (engine, store)
    }

    pub fn engine() -> (MeteringEngine, Arc<MemoryStore>) {
        engine_with(PricingConfig::default(), Arc::new(NoTokenCounter))
    }

    /// Register an account with `balance` cents, subscribed to `plan` if given.
    pub async fn funded_account(
        engine: &MeteringEngine,
        balance: i64,
        plan: Option<PlanId>,
    ) -> AccountId {
        let account_id = AccountId::generate();
        engine
            .register(Account::new(account_id, "tester"))
            .await
            .unwrap();

        let plan_price = match plan {
            Some(id) => engine.catalog().get(id).unwrap().price_cents,
            None => 0,
        };
        if balance + plan_price > 0 {
            engine
                .apply_entry(&account_id, LedgerEntry::deposit(balance + plan_price, "seed"))
                .await
                .unwrap();
        }
        if let Some(plan_id) = plan {
            engine.subscribe(&account_id, plan_id).await.unwrap();
        }
        account_id
    }
}
