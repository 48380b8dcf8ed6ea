//! Chat history and statistics.

use chatmeter_core::{AccountId, ChatId, ChatStatistics, ChatUsageEvent, MeteringError, Result};

use super::MeteringEngine;

impl MeteringEngine {
    /// An account's chats, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn chats(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatUsageEvent>> {
        self.account(account_id)?;
        Ok(self.store.list_chats(account_id, limit, offset)?)
    }

    /// One chat owned by `account_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the chat does not exist or belongs to another
    /// account.
    pub fn chat(&self, account_id: &AccountId, chat_id: &ChatId) -> Result<ChatUsageEvent> {
        self.store
            .get_chat(chat_id)?
            .filter(|chat| chat.account_id == *account_id)
            .ok_or_else(|| MeteringError::not_found("chat", chat_id))
    }

    /// Totals over every chat of an account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub fn chat_statistics(&self, account_id: &AccountId) -> Result<ChatStatistics> {
        let events = self.chats(account_id, usize::MAX, 0)?;
        Ok(ChatStatistics::from_events(&events))
    }
}

#[cfg(test)]
mod tests {
    use chatmeter_core::PlanId;

    use super::super::metering::ChatRequest;
    use super::super::testing::{engine, funded_account};
    use super::*;

    fn chat(model: &str, input: u64, output: u64) -> ChatRequest {
        ChatRequest {
            model_name: model.into(),
            input_tokens: Some(input),
            output_tokens: Some(output),
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn statistics_group_by_model() {
        let (engine, _) = engine();
        let account_id = funded_account(&engine, 5_000, Some(PlanId(3))).await;

        engine.meter_chat(&account_id, chat("gpt-4", 1_000, 1_000)).await.unwrap();
        engine.meter_chat(&account_id, chat("gpt-4", 500, 500)).await.unwrap();
        engine
            .meter_chat(&account_id, chat("gpt-3.5-turbo", 4_000, 0))
            .await
            .unwrap();

        let stats = engine.chat_statistics(&account_id).unwrap();
        assert_eq!(stats.total_chats, 3);
        assert_eq!(stats.total_tokens, 7_000);
        assert_eq!(stats.model_stats["gpt-4"].count, 2);
        assert_eq!(stats.model_stats["gpt-4"].tokens, 3_000);
        assert_eq!(stats.model_stats["gpt-3.5-turbo"].count, 1);
        assert_eq!(
            stats.total_cost_cents,
            stats.model_stats.values().map(|m| m.cost_cents).sum::<i64>()
        );
    }

    #[tokio::test]
    async fn chats_are_private_to_their_account() {
        let (engine, _) = engine();
        let owner = funded_account(&engine, 1_000, Some(PlanId(1))).await;
        let other = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        let receipt = engine.meter_chat(&owner, chat("llama-2", 10_000, 10_000)).await.unwrap();

        assert_eq!(engine.chat(&owner, &receipt.chat.id).unwrap(), receipt.chat);
        assert!(matches!(
            engine.chat(&other, &receipt.chat.id),
            Err(MeteringError::NotFound { .. })
        ));
        assert!(engine.chats(&other, 10, 0).unwrap().is_empty());
    }
}
