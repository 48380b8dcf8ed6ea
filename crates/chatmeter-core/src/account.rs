//! Account types for chatmeter.
//!
//! Credentials live with the identity collaborator. The engine owns the
//! balance, role, status and the pointer to the current subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, SubscriptionId};

/// A metered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account ID (from the identity collaborator).
    pub id: AccountId,

    /// Display name copied from the identity collaborator.
    pub username: String,

    /// Contact email, if known.
    pub email: Option<String>,

    /// Current credit balance in cents. Never negative.
    pub balance_cents: i64,

    /// Access role.
    pub role: Role,

    /// Lifecycle status; only `Active` accounts may chat.
    pub status: AccountStatus,

    /// The active subscription, if any. Expiry is resolved lazily.
    pub current_subscription: Option<SubscriptionId>,

    /// Lifetime deposits (in cents).
    pub lifetime_deposited_cents: i64,

    /// Lifetime spend on chats and subscriptions (in cents).
    pub lifetime_spent_cents: i64,

    /// Number of ledger entries appended so far.
    pub ledger_seq: u64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with zero balance.
    #[must_use]
    pub fn new(id: AccountId, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            email: None,
            balance_cents: 0,
            role: Role::User,
            status: AccountStatus::Active,
            current_subscription: None,
            lifetime_deposited_cents: 0,
            lifetime_spent_cents: 0,
            ledger_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style role override.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount_cents: i64) -> bool {
        self.balance_cents >= amount_cents
    }

    /// Whether the account may use the metered service at all.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Whether the account has administrator rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Access role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular user.
    User,
    /// Administrator.
    Admin,
}

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// May use the service.
    Active,
    /// Disabled by an administrator.
    Inactive,
    /// Registered but not yet approved.
    Pending,
}

impl AccountStatus {
    /// The status an admin toggle moves to.
    ///
    /// `Pending` accounts are activated, so a toggle is also the approval path.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Inactive,
            Self::Inactive | Self::Pending => Self::Active,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_active_with_zero_balance() {
        let account = Account::new(AccountId::generate(), "ada");
        assert_eq!(account.balance_cents, 0);
        assert_eq!(account.ledger_seq, 0);
        assert!(account.is_active());
        assert!(!account.is_admin());
        assert!(account.current_subscription.is_none());
    }

    #[test]
    fn account_sufficient_credits() {
        let mut account = Account::new(AccountId::generate(), "ada");
        account.balance_cents = 100;

        assert!(account.has_sufficient_credits(100));
        assert!(!account.has_sufficient_credits(150));
    }

    #[test]
    fn toggle_cycles_between_active_and_inactive() {
        assert_eq!(AccountStatus::Active.toggled(), AccountStatus::Inactive);
        assert_eq!(AccountStatus::Inactive.toggled(), AccountStatus::Active);
        assert_eq!(AccountStatus::Pending.toggled(), AccountStatus::Active);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AccountStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }
}
