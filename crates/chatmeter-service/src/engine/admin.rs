//! Administrative operations.

use chrono::Utc;
use serde::Serialize;

use chatmeter_core::{
    Account, AccountId, AccountStatus, LedgerEntry, MeteringError, Result, Transaction,
};

use super::MeteringEngine;

/// Service-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    /// Registered accounts.
    pub total_users: u64,
    /// Accounts with `active` status.
    pub active_users: u64,
    /// Lifetime deposits across all accounts, in cents.
    pub total_revenue_cents: i64,
    /// Lifetime spend across all accounts, in cents.
    pub total_spent_cents: i64,
    /// Metered chats.
    pub total_chats: u64,
}

impl MeteringEngine {
    /// Flip an account between `active` and `inactive`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn toggle_status(&self, account_id: &AccountId) -> Result<Account> {
        let _guard = self.locks.lock(*account_id).await;
        let mut account = self.account(account_id)?;

        let previous = account.status;
        account.status = previous.toggled();
        account.updated_at = Utc::now();
        self.store.put_account(&account)?;

        tracing::info!(
            account_id = %account_id,
            from = previous.as_str(),
            to = account.status.as_str(),
            "Account status toggled"
        );
        Ok(account)
    }

    /// Grant credits to an account on behalf of an admin.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount_cents > 0`, and `NotFound` for
    /// an unknown account.
    pub async fn admin_add_credits(
        &self,
        account_id: &AccountId,
        amount_cents: i64,
        admin_id: &str,
    ) -> Result<(Account, Transaction)> {
        if amount_cents <= 0 {
            return Err(MeteringError::InvalidAmount(format!(
                "amount must be positive, got {amount_cents}"
            )));
        }
        let entry = LedgerEntry::deposit(amount_cents, "Admin credit grant")
            .with_metadata(serde_json::json!({ "admin": admin_id }));
        self.apply_entry(account_id, entry).await
    }

    /// Accounts in store order.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store fails.
    pub fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>> {
        Ok(self.store.list_accounts(limit, offset)?)
    }

    /// Aggregate totals over all accounts.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store fails.
    pub fn stats(&self) -> Result<AdminStats> {
        let mut stats = AdminStats {
            total_chats: self.store.count_chats()?,
            ..AdminStats::default()
        };

        for account in self.store.list_accounts(usize::MAX, 0)? {
            stats.total_users += 1;
            if account.status == AccountStatus::Active {
                stats.active_users += 1;
            }
            stats.total_revenue_cents += account.lifetime_deposited_cents;
            stats.total_spent_cents += account.lifetime_spent_cents;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chatmeter_core::{PlanId, TransactionType};
    use chatmeter_store::Store;

    use super::super::metering::ChatRequest;
    use super::super::testing::{engine, funded_account};
    use super::*;

    #[tokio::test]
    async fn toggle_flips_and_pending_activates() {
        let (engine, store) = engine();
        let account_id = funded_account(&engine, 0, None).await;

        assert_eq!(
            engine.toggle_status(&account_id).await.unwrap().status,
            AccountStatus::Inactive
        );
        assert_eq!(
            engine.toggle_status(&account_id).await.unwrap().status,
            AccountStatus::Active
        );

        let mut account = store.get_account(&account_id).unwrap().unwrap();
        account.status = AccountStatus::Pending;
        store.put_account(&account).unwrap();
        assert_eq!(
            engine.toggle_status(&account_id).await.unwrap().status,
            AccountStatus::Active
        );
    }

    #[tokio::test]
    async fn admin_grant_is_a_deposit_with_audit_metadata() {
        let (engine, _) = engine();
        let account_id = funded_account(&engine, 0, None).await;

        let (account, tx) = engine
            .admin_add_credits(&account_id, 1_000, "ops@example.com")
            .await
            .unwrap();
        assert_eq!(account.balance_cents, 1_000);
        assert_eq!(tx.transaction_type, TransactionType::Deposit);
        assert_eq!(tx.metadata["admin"], "ops@example.com");
    }

    #[tokio::test]
    async fn stats_aggregate_accounts_and_chats() {
        let (engine, _) = engine();
        let a = funded_account(&engine, 500, Some(PlanId(1))).await;
        let b = funded_account(&engine, 200, None).await;
        engine.toggle_status(&b).await.unwrap();

        engine
            .meter_chat(
                &a,
                ChatRequest {
                    model_name: "gpt-3.5-turbo".into(),
                    input_tokens: Some(10_000),
                    output_tokens: Some(10_000),
                    ..ChatRequest::default()
                },
            )
            .await
            .unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_revenue_cents, 500 + 1_000 + 200);
        // Basic plan (1000) plus 10K in at 0.0015 and 10K out at 0.002 = 0.035 -> 4 cents
        assert_eq!(stats.total_spent_cents, 1_000 + 4);
        assert_eq!(stats.total_chats, 1);
    }
}
