//! Key encoding utilities for `RocksDB`.
//!
//! Composite keys put the account id first so that everything belonging to
//! one account is contiguous and can be scanned with a prefix iterator.

use chatmeter_core::{AccountId, ChatId, PlanId, SubscriptionId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a ledger key.
///
/// Format: `account_id (16 bytes) || sequence (8 bytes, big-endian)`
#[must_use]
pub fn transaction_key(account_id: &AccountId, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

/// Create a prefix for iterating all records owned by an account.
#[must_use]
pub fn account_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Upper bound of an account's key range, for reverse (newest first) scans.
#[must_use]
pub fn account_range_end(account_id: &AccountId, suffix_len: usize) -> Vec<u8> {
    let mut key = account_prefix(account_id);
    key.resize(16 + suffix_len, 0xFF);
    key
}

/// Create a plan key.
#[must_use]
pub fn plan_key(plan_id: PlanId) -> Vec<u8> {
    plan_id.to_be_bytes().to_vec()
}

/// Create a subscription key.
#[must_use]
pub fn subscription_key(subscription_id: &SubscriptionId) -> Vec<u8> {
    subscription_id.to_bytes().to_vec()
}

/// Create an account-subscription index key.
///
/// Format: `account_id (16 bytes) || subscription_id (16 bytes)`
#[must_use]
pub fn account_subscription_key(
    account_id: &AccountId,
    subscription_id: &SubscriptionId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&subscription_id.to_bytes());
    key
}

/// Create a chat key.
#[must_use]
pub fn chat_key(chat_id: &ChatId) -> Vec<u8> {
    chat_id.to_bytes().to_vec()
}

/// Create an account-chat index key.
///
/// Format: `account_id (16 bytes) || chat_id (16 bytes)`
///
/// ULIDs are time-ordered, so an account's chats sort by time.
#[must_use]
pub fn account_chat_key(account_id: &AccountId, chat_id: &ChatId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&chat_id.to_bytes());
    key
}

/// Extract the trailing 16-byte id from an account index key.
///
/// Returns `None` if the key is not exactly 32 bytes.
#[must_use]
pub fn index_suffix(key: &[u8]) -> Option<[u8; 16]> {
    if key.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    Some(bytes)
}

/// Create a quota window key.
#[must_use]
pub fn quota_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_keys_sort_by_sequence() {
        let account_id = AccountId::generate();
        let k1 = transaction_key(&account_id, 1);
        let k2 = transaction_key(&account_id, 2);
        let k256 = transaction_key(&account_id, 256);

        assert_eq!(k1.len(), 24);
        assert!(k1 < k2);
        assert!(k2 < k256);
        assert!(k256 < account_range_end(&account_id, 8));
        assert!(k1.starts_with(&account_prefix(&account_id)));
    }

    #[test]
    fn chat_index_round_trips_id() {
        let account_id = AccountId::generate();
        let chat_id = ChatId::generate();
        let key = account_chat_key(&account_id, &chat_id);

        assert_eq!(key.len(), 32);
        assert_eq!(key[..16], *account_id.as_bytes());
        assert_eq!(index_suffix(&key).map(ChatId::from_bytes), Some(chat_id));
        assert_eq!(index_suffix(&key[..20]), None);
    }

    #[test]
    fn plan_keys_sort_numerically() {
        assert!(plan_key(PlanId(2)) < plan_key(PlanId(10)));
    }
}
