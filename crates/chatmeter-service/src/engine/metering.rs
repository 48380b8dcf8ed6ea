//! The chat metering gateway.
//!
//! `Received -> QuotaChecked -> Priced -> Debited -> Committed`, with any
//! failure ending in a rejection that leaves balance, ledger, quota and
//! usage log untouched.

use chrono::{DateTime, Utc};

use chatmeter_core::{
    Account, AccountId, ChatId, ChatUsageEvent, MeteringError, ModelPricing, Plan, QuotaCheck,
    QuotaWindowState, RateLimitScope, Result, TokenCounts, TokenSource, Transaction,
};
use chatmeter_store::ChatCommit;

use super::MeteringEngine;

/// A chat to meter.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model used.
    pub model_name: String,
    /// Exact prompt tokens, when the caller knows them.
    pub input_tokens: Option<u64>,
    /// Exact completion tokens, when the caller knows them.
    pub output_tokens: Option<u64>,
    /// Prompt text, used for counting when no exact counts are given.
    pub prompt: Option<String>,
    /// Completion text, if already produced.
    pub completion: Option<String>,
    /// Cost computed by the client. Never charged; only compared.
    pub client_cost_cents: Option<i64>,
}

/// A committed chat.
#[derive(Debug, Clone)]
pub struct ChatReceipt {
    /// The stored usage event.
    pub chat: ChatUsageEvent,
    /// The `chat_cost` transaction.
    pub transaction: Transaction,
    /// Balance after the charge.
    pub balance_cents: i64,
    /// Quota after the chat was counted.
    pub quota: QuotaCheck,
    /// Plan the chat was counted against.
    pub plan: Plan,
}

/// Everything the gate checks produce.
struct Admission {
    account: Account,
    plan: Plan,
    window: QuotaWindowState,
    rates: ModelPricing,
}

impl MeteringEngine {
    /// Meter one chat.
    ///
    /// Token counts are resolved before the account lock is taken; every
    /// gate is then re-evaluated under the lock and the debit, ledger entry,
    /// usage event and quota counters are written in one store operation.
    ///
    /// # Errors
    ///
    /// In gate order: `NotFound`, `AccountInactive`, `NoSubscription`,
    /// `RateLimited`, `ModelNotPermitted`, `PricingError`,
    /// `InsufficientCredit`. `Unavailable` on store failure.
    pub async fn meter_chat(
        &self,
        account_id: &AccountId,
        request: ChatRequest,
    ) -> Result<ChatReceipt> {
        match self.run_gateway(account_id, &request).await {
            Ok(receipt) => {
                tracing::info!(
                    account_id = %account_id,
                    chat_id = %receipt.chat.id,
                    model = %receipt.chat.model_name,
                    cost_cents = receipt.chat.cost_cents,
                    new_balance = receipt.balance_cents,
                    "Chat metered"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    model = %request.model_name,
                    reason = e.reason(),
                    error = %e,
                    "Chat rejected"
                );
                Err(e)
            }
        }
    }

    async fn run_gateway(
        &self,
        account_id: &AccountId,
        request: &ChatRequest,
    ) -> Result<ChatReceipt> {
        // Lock-free pre-check, so a doomed request never reaches the collaborator.
        self.admit(account_id, &request.model_name, Utc::now())?;

        let (tokens, token_source) = self.resolve_tokens(request).await;
        tracing::debug!(
            account_id = %account_id,
            input_tokens = tokens.input_tokens,
            output_tokens = tokens.output_tokens,
            source = ?token_source,
            "Tokens resolved"
        );

        let _guard = self.locks.lock(*account_id).await;
        let now = Utc::now();

        let admission = self.admit(account_id, &request.model_name, now)?;
        tracing::debug!(account_id = %account_id, "Quota checked");

        let cost_cents = admission
            .rates
            .cost_cents(tokens.input_tokens, tokens.output_tokens)?;
        tracing::debug!(account_id = %account_id, cost_cents, "Priced");

        if let Some(client_cost) = request.client_cost_cents {
            if client_cost != cost_cents {
                tracing::warn!(
                    account_id = %account_id,
                    client_cost_cents = client_cost,
                    cost_cents,
                    "Ignoring client-supplied cost"
                );
            }
        }

        if !admission.account.has_sufficient_credits(cost_cents) {
            return Err(MeteringError::InsufficientCredit {
                balance: admission.account.balance_cents,
                required: cost_cents,
            });
        }

        let mut quota = admission.window;
        quota.commit(now, tokens.total());

        let committed = self.store.commit_chat(&ChatCommit {
            chat_id: ChatId::generate(),
            account_id: *account_id,
            model_name: request.model_name.clone(),
            tokens,
            token_source,
            cost_cents,
            quota: quota.clone(),
            timestamp: now,
        })?;
        tracing::debug!(account_id = %account_id, "Debited and committed");

        Ok(ChatReceipt {
            balance_cents: committed.account.balance_cents,
            quota: quota.check(&admission.plan, now),
            chat: committed.event,
            transaction: committed.transaction,
            plan: admission.plan,
        })
    }

    /// Gates 1-3: account, subscription, quota, then model permission.
    fn admit(
        &self,
        account_id: &AccountId,
        model_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let account = self.account(account_id)?;
        if !account.is_active() {
            return Err(MeteringError::AccountInactive);
        }

        let plan = self
            .active_subscription(&account, now)?
            .ok_or(MeteringError::NoSubscription)?
            .plan;

        let window = self.quota_window(account_id, now)?;
        let check = window.check(&plan, now);
        if !check.allowed {
            return Err(MeteringError::RateLimited {
                scope: check.exhausted.unwrap_or(RateLimitScope::Hourly),
            });
        }

        if self.pricing.requires_vip(model_name) && !plan.vip_model_access && !account.is_admin()
        {
            return Err(MeteringError::ModelNotPermitted {
                model: model_name.to_string(),
            });
        }
        let rates = self.pricing.resolve(model_name)?.clone();

        Ok(Admission {
            account,
            plan,
            window,
            rates,
        })
    }

    /// Exact counts from the request, then the collaborator, then an estimate.
    async fn resolve_tokens(&self, request: &ChatRequest) -> (TokenCounts, TokenSource) {
        if request.input_tokens.is_some() || request.output_tokens.is_some() {
            return (
                TokenCounts::new(
                    request.input_tokens.unwrap_or(0),
                    request.output_tokens.unwrap_or(0),
                ),
                TokenSource::Reported,
            );
        }

        let prompt = request.prompt.as_deref().unwrap_or_default();
        let completion = request.completion.as_deref();

        let counted = tokio::time::timeout(
            self.inference_timeout,
            self.token_counter
                .count_tokens(&request.model_name, prompt, completion),
        )
        .await;

        match counted {
            Ok(Some(counts)) => (counts, TokenSource::Collaborator),
            Ok(None) => (
                self.pricing.estimator.estimate(prompt, completion),
                TokenSource::Estimated,
            ),
            Err(_) => {
                tracing::warn!(
                    model = %request.model_name,
                    timeout_ms = u64::try_from(self.inference_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Token count timed out, estimating"
                );
                (
                    self.pricing.estimator.estimate(prompt, completion),
                    TokenSource::Estimated,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chatmeter_core::{PlanId, PricingConfig, TransactionType};
    use chatmeter_store::Store;

    use super::super::testing::{engine, engine_with, funded_account, FixedCounter};
    use super::*;

    fn reported(model: &str, input: u64, output: u64) -> ChatRequest {
        ChatRequest {
            model_name: model.into(),
            input_tokens: Some(input),
            output_tokens: Some(output),
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn successful_chat_writes_all_records() {
        let (engine, store) = engine();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(3))).await;

        let receipt = engine
            .meter_chat(&account_id, reported("gpt-4", 1_000, 1_000))
            .await
            .unwrap();

        // 1000 * 0.03/1K + 1000 * 0.06/1K = 0.09 credits = 9 cents
        assert_eq!(receipt.chat.cost_cents, 9);
        assert_eq!(receipt.balance_cents, 991);
        assert_eq!(receipt.transaction.transaction_type, TransactionType::ChatCost);
        assert_eq!(receipt.transaction.amount_cents, -9);
        assert_eq!(receipt.chat.transaction_id, receipt.transaction.id);
        assert_eq!(receipt.quota.chats_this_hour, 1);
        assert_eq!(receipt.quota.tokens_this_month, 2_000);

        assert_eq!(store.list_chats(&account_id, 10, 0).unwrap().len(), 1);
        let quota = store.get_quota(&account_id).unwrap().unwrap();
        assert_eq!(quota.chats_in_current_hour, 1);
        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn third_chat_over_hourly_limit_is_rate_limited() {
        let (engine, _) = engine();
        let mut plan = engine.catalog().get(PlanId(1)).unwrap();
        plan.max_chats_per_hour = 2;
        engine.catalog().upsert(plan).unwrap();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        for _ in 0..2 {
            engine
                .meter_chat(&account_id, reported("llama-2", 10_000, 10_000))
                .await
                .unwrap();
        }
        let err = engine
            .meter_chat(&account_id, reported("llama-2", 10_000, 10_000))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MeteringError::RateLimited {
                scope: RateLimitScope::Hourly
            }
        );
    }

    #[tokio::test]
    async fn monthly_token_budget_is_enforced() {
        let (engine, _) = engine();
        let mut plan = engine.catalog().get(PlanId(1)).unwrap();
        plan.max_tokens_per_month = 20_000;
        engine.catalog().upsert(plan).unwrap();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        // Current chat tokens are not pre-counted: the first chat may overshoot.
        engine
            .meter_chat(&account_id, reported("llama-2", 16_000, 8_000))
            .await
            .unwrap();
        assert_eq!(
            engine
                .meter_chat(&account_id, reported("llama-2", 1, 1))
                .await
                .unwrap_err(),
            MeteringError::RateLimited {
                scope: RateLimitScope::Monthly
            }
        );
    }

    #[tokio::test]
    async fn insufficient_credit_leaves_everything_unchanged() {
        let (engine, store) = engine();
        let account_id = funded_account(&engine, 100, Some(PlanId(1))).await;
        let log_before = engine.transactions(&account_id, 100, 0).unwrap();

        // 750 000 output tokens at 0.002 per 1K = 1.50 credits
        let err = engine
            .meter_chat(&account_id, reported("gpt-3.5-turbo", 0, 750_000))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MeteringError::InsufficientCredit {
                balance: 100,
                required: 150
            }
        );

        assert_eq!(engine.balance(&account_id).unwrap(), 100);
        assert_eq!(engine.transactions(&account_id, 100, 0).unwrap(), log_before);
        assert!(store.get_quota(&account_id).unwrap().is_none());
        assert!(store.list_chats(&account_id, 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn vip_model_on_basic_plan_is_refused_before_pricing() {
        let mut pricing = PricingConfig::default();
        // A zero-rate VIP model would fail pricing if it were ever priced.
        for model in &mut pricing.models {
            if model.name == "vip-gpt-4" {
                model.input_micros_per_1k = 0;
                model.output_micros_per_1k = 0;
            }
        }
        let counter = Arc::new(FixedCounter::default());
        let (engine, _) = engine_with(pricing, counter.clone());
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        let err = engine
            .meter_chat(
                &account_id,
                ChatRequest {
                    model_name: "vip-gpt-4".into(),
                    prompt: Some("hello".into()),
                    ..ChatRequest::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            MeteringError::ModelNotPermitted {
                model: "vip-gpt-4".into()
            }
        );
        assert_eq!(counter.calls(), 0);
        assert_eq!(engine.balance(&account_id).unwrap(), 1_000);
    }

    #[tokio::test]
    async fn unlisted_vip_prefix_requires_vip() {
        let (engine, _) = engine();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(2))).await;

        assert!(matches!(
            engine
                .meter_chat(&account_id, reported("vip_experimental", 1, 1))
                .await,
            Err(MeteringError::ModelNotPermitted { .. })
        ));
    }

    #[tokio::test]
    async fn admins_bypass_vip_gate() {
        let (engine, store) = engine();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;
        let mut account = store.get_account(&account_id).unwrap().unwrap();
        account.role = chatmeter_core::Role::Admin;
        store.put_account(&account).unwrap();

        engine
            .meter_chat(&account_id, reported("gpt-4", 100, 100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn zero_tokens_is_a_pricing_error() {
        let (engine, _) = engine();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        assert!(matches!(
            engine
                .meter_chat(&account_id, reported("llama-2", 0, 0))
                .await,
            Err(MeteringError::PricingError(_))
        ));
    }

    #[tokio::test]
    async fn sub_cent_chat_is_refused_and_not_recorded() {
        let (engine, store) = engine();
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;
        let log_before = engine.transactions(&account_id, 100, 0).unwrap();

        // 100 llama-2 tokens cost 0.00005 credits, which rounds to 0.00.
        assert!(matches!(
            engine
                .meter_chat(&account_id, reported("llama-2", 100, 0))
                .await,
            Err(MeteringError::PricingError(_))
        ));

        assert_eq!(engine.balance(&account_id).unwrap(), 1_000);
        assert_eq!(engine.transactions(&account_id, 100, 0).unwrap(), log_before);
        assert!(store.get_quota(&account_id).unwrap().is_none());
        assert!(store.list_chats(&account_id, 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn gates_run_in_order() {
        let (engine, _) = engine();

        let unsubscribed = funded_account(&engine, 1_000, None).await;
        assert_eq!(
            engine
                .meter_chat(&unsubscribed, reported("llama-2", 1, 1))
                .await
                .unwrap_err(),
            MeteringError::NoSubscription
        );

        let inactive = funded_account(&engine, 1_000, Some(PlanId(1))).await;
        engine.toggle_status(&inactive).await.unwrap();
        assert_eq!(
            engine
                .meter_chat(&inactive, reported("gpt-4", 1, 1))
                .await
                .unwrap_err(),
            MeteringError::AccountInactive
        );
    }

    #[tokio::test]
    async fn collaborator_counts_beat_estimates() {
        let counter = Arc::new(FixedCounter {
            counts: Some(TokenCounts::new(20_000, 0)),
            ..FixedCounter::default()
        });
        let (engine, _) = engine_with(PricingConfig::default(), counter.clone());
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        let receipt = engine
            .meter_chat(
                &account_id,
                ChatRequest {
                    model_name: "llama-2".into(),
                    prompt: Some("short".into()),
                    ..ChatRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.chat.token_source, TokenSource::Collaborator);
        assert_eq!(receipt.chat.input_tokens, 20_000);
        assert_eq!(counter.calls(), 1);
    }

    #[tokio::test]
    async fn slow_collaborator_falls_back_to_estimate() {
        let counter = Arc::new(FixedCounter {
            counts: Some(TokenCounts::new(1_000, 1_000)),
            delay: Some(Duration::from_secs(5)),
            ..FixedCounter::default()
        });
        let (engine, _) = engine_with(PricingConfig::default(), counter);
        let account_id = funded_account(&engine, 1_000, Some(PlanId(1))).await;

        let receipt = engine
            .meter_chat(
                &account_id,
                ChatRequest {
                    model_name: "llama-2".into(),
                    prompt: Some("x".repeat(40_000)),
                    completion: Some("y".repeat(4_000)),
                    ..ChatRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.chat.token_source, TokenSource::Estimated);
        assert_eq!(receipt.chat.input_tokens, 10_000);
        assert_eq!(receipt.chat.output_tokens, 1_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_chats_for_one_cost_only_one_commits() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        // After the VIP plan is paid for, exactly one gpt-4 chat is affordable.
        let account_id = funded_account(&engine, 9, Some(PlanId(3))).await;

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine
                        .meter_chat(&account_id, reported("gpt-4", 1_000, 1_000))
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(MeteringError::InsufficientCredit {
                balance: 0,
                required: 9
            })
        )));
        assert_eq!(engine.balance(&account_id).unwrap(), 0);
    }
}
