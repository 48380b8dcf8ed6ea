//! Balances and the credit ledger.

use chrono::Utc;

use chatmeter_core::{
    Account, AccountId, LedgerEntry, MeteringError, Result, Transaction, TransactionType,
};

use super::MeteringEngine;

/// Outcome of [`MeteringEngine::register`].
#[derive(Debug, Clone)]
pub enum Registration {
    /// A new account was created.
    Created(Account),
    /// The account already existed and was left untouched.
    Existing(Account),
}

impl MeteringEngine {
    /// Create the ledger account for an identity, if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store fails.
    pub async fn register(&self, account: Account) -> Result<Registration> {
        let _guard = self.locks.lock(account.id).await;

        if let Some(existing) = self.store.get_account(&account.id)? {
            return Ok(Registration::Existing(existing));
        }

        self.store.put_account(&account)?;
        tracing::info!(account_id = %account.id, username = %account.username, "Account registered");
        Ok(Registration::Created(account))
    }

    /// Update display fields of an account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn update_profile(
        &self,
        account_id: &AccountId,
        username: Option<String>,
        email: Option<String>,
    ) -> Result<Account> {
        let _guard = self.locks.lock(*account_id).await;
        let mut account = self.account(account_id)?;

        if let Some(username) = username {
            account.username = username;
        }
        if let Some(email) = email {
            account.email = Some(email);
        }
        account.updated_at = Utc::now();

        self.store.put_account(&account)?;
        tracing::debug!(account_id = %account_id, "Profile updated");
        Ok(account)
    }

    /// Current balance in cents.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn balance(&self, account_id: &AccountId) -> Result<i64> {
        Ok(self.account(account_id)?.balance_cents)
    }

    /// Add `amount_cents` to the balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount_cents > 0`, and `NotFound` for
    /// an unknown account.
    pub async fn credit(
        &self,
        account_id: &AccountId,
        amount_cents: i64,
        transaction_type: TransactionType,
        description: &str,
    ) -> Result<(Account, Transaction)> {
        require_positive(amount_cents)?;
        self.apply_entry(
            account_id,
            LedgerEntry::credit(amount_cents, transaction_type, description),
        )
        .await
    }

    /// Remove `amount_cents` from the balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount_cents > 0`, and
    /// `InsufficientCredit` (with nothing written) if the balance is lower
    /// than the amount.
    pub async fn debit(
        &self,
        account_id: &AccountId,
        amount_cents: i64,
        transaction_type: TransactionType,
        description: &str,
    ) -> Result<(Account, Transaction)> {
        require_positive(amount_cents)?;
        self.apply_entry(
            account_id,
            LedgerEntry::debit(amount_cents, transaction_type, description),
        )
        .await
    }

    /// Apply one entry under the account lock.
    pub(crate) async fn apply_entry(
        &self,
        account_id: &AccountId,
        entry: LedgerEntry,
    ) -> Result<(Account, Transaction)> {
        let _guard = self.locks.lock(*account_id).await;
        let (account, tx) = self.store.append_entry(account_id, &entry)?;

        tracing::info!(
            account_id = %account_id,
            amount_cents = tx.amount_cents,
            transaction_type = tx.transaction_type.as_str(),
            new_balance = account.balance_cents,
            "Ledger entry applied"
        );
        Ok((account, tx))
    }

    /// Transactions newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.account(account_id)?;
        Ok(self
            .store
            .list_transactions(account_id, limit, offset)?)
    }
}

fn require_positive(amount_cents: i64) -> Result<()> {
    if amount_cents <= 0 {
        return Err(MeteringError::InvalidAmount(format!(
            "amount must be positive, got {amount_cents}"
        )));
    }
    Ok(())
}
