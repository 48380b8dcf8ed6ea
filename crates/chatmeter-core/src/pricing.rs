//! Cost model for chatmeter.
//!
//! Rates are integer micro-credits per 1000 tokens (1 credit = 1 000 000
//! micro-credits = 100 cents). Costs are computed in `i128` and rounded
//! half-up to whole cents, so the ledger never sees floating point.

use serde::{Deserialize, Serialize};

use crate::{MeteringError, Result};

/// Micro-credits in one cent.
const MICROS_PER_CENT: i128 = 10_000;

/// Tokens per pricing unit.
const TOKENS_PER_RATE_UNIT: i128 = 1_000;

/// Pricing configuration for all chat models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Known models, in the order they are listed to clients.
    pub models: Vec<ModelPricing>,

    /// Model whose rates apply to unknown names under `DefaultRates`.
    pub default_model: String,

    /// What to do with a model name that is not in `models`.
    pub unknown_model_policy: UnknownModelPolicy,

    /// Text-length token estimation ratios.
    pub estimator: TokenEstimator,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            models: vec![
                ModelPricing {
                    name: "gpt-3.5-turbo".into(),
                    description: "GPT-3.5 Turbo model".into(),
                    input_micros_per_1k: 1_500,  // 0.0015 per 1K input
                    output_micros_per_1k: 2_000, // 0.002 per 1K output
                    requires_vip: false,
                },
                ModelPricing {
                    name: "llama-2".into(),
                    description: "Llama 2 model".into(),
                    input_micros_per_1k: 500,
                    output_micros_per_1k: 500,
                    requires_vip: false,
                },
                ModelPricing {
                    name: "gpt-4".into(),
                    description: "GPT-4 model".into(),
                    input_micros_per_1k: 30_000,  // 0.03 per 1K input
                    output_micros_per_1k: 60_000, // 0.06 per 1K output
                    requires_vip: true,
                },
                ModelPricing {
                    name: "vip-gpt-4".into(),
                    description: "VIP GPT-4 model".into(),
                    input_micros_per_1k: 50_000,
                    output_micros_per_1k: 100_000,
                    requires_vip: true,
                },
            ],
            default_model: "gpt-3.5-turbo".into(),
            unknown_model_policy: UnknownModelPolicy::DefaultRates,
            estimator: TokenEstimator::default(),
        }
    }
}

impl PricingConfig {
    /// Look up a known model.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelPricing> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Whether `name` is a VIP-tier model.
    ///
    /// Unlisted names carrying the `vip-`/`vip_` prefix are VIP as well.
    #[must_use]
    pub fn requires_vip(&self, name: &str) -> bool {
        self.model(name).map_or_else(
            || name.starts_with("vip-") || name.starts_with("vip_"),
            |m| m.requires_vip,
        )
    }

    /// Models a caller may use, in listing order.
    pub fn available_models(&self, vip_access: bool) -> impl Iterator<Item = &ModelPricing> {
        self.models
            .iter()
            .filter(move |m| vip_access || !m.requires_vip)
    }

    /// Resolve the rates that apply to `name`, honouring the unknown-model policy.
    ///
    /// # Errors
    ///
    /// - `ModelNotPermitted` if the model is unknown and the policy is `Reject`.
    /// - `PricingError` if the configured default model does not exist.
    pub fn resolve(&self, name: &str) -> Result<&ModelPricing> {
        if let Some(model) = self.model(name) {
            return Ok(model);
        }

        match self.unknown_model_policy {
            UnknownModelPolicy::Reject => Err(MeteringError::ModelNotPermitted {
                model: name.to_string(),
            }),
            UnknownModelPolicy::DefaultRates => self.model(&self.default_model).ok_or_else(|| {
                MeteringError::PricingError(format!(
                    "default model {} has no rates",
                    self.default_model
                ))
            }),
        }
    }

    /// Price a chat in cents.
    ///
    /// # Errors
    ///
    /// See [`PricingConfig::resolve`] and [`ModelPricing::cost_cents`].
    pub fn price(&self, name: &str, input_tokens: u64, output_tokens: u64) -> Result<i64> {
        self.resolve(name)?.cost_cents(input_tokens, output_tokens)
    }
}

/// Pricing for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model name as sent by clients.
    pub name: String,

    /// Short description for listings.
    #[serde(default)]
    pub description: String,

    /// Micro-credits per 1000 input tokens.
    pub input_micros_per_1k: i64,

    /// Micro-credits per 1000 output tokens.
    pub output_micros_per_1k: i64,

    /// Whether only VIP plans may use this model.
    #[serde(default)]
    pub requires_vip: bool,
}

impl ModelPricing {
    /// Cost in cents, rounded half-up to whole cents.
    ///
    /// # Errors
    ///
    /// Returns `PricingError` when the rounded cost is zero or negative, or
    /// does not fit in an `i64`.
    pub fn cost_cents(&self, input_tokens: u64, output_tokens: u64) -> Result<i64> {
        let raw = i128::from(input_tokens) * i128::from(self.input_micros_per_1k)
            + i128::from(output_tokens) * i128::from(self.output_micros_per_1k);

        let divisor = MICROS_PER_CENT * TOKENS_PER_RATE_UNIT;
        let cents = if raw >= 0 {
            (raw + divisor / 2) / divisor
        } else {
            -((-raw + divisor / 2) / divisor)
        };

        if cents <= 0 {
            return Err(MeteringError::PricingError(format!(
                "model {} priced {input_tokens}+{output_tokens} tokens at {cents} cents",
                self.name
            )));
        }

        i64::try_from(cents).map_err(|_| {
            MeteringError::PricingError(format!("cost for model {} overflows", self.name))
        })
    }
}

/// Policy for model names missing from the pricing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownModelPolicy {
    /// Charge the default model's rates.
    #[default]
    DefaultRates,
    /// Refuse the chat with `ModelNotPermitted`.
    Reject,
}

impl std::str::FromStr for UnknownModelPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default_rates" | "default" => Ok(Self::DefaultRates),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown model policy: {other}")),
        }
    }
}

/// Input and output token counts of one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl TokenCounts {
    /// Create token counts.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Sum of input and output tokens.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Deterministic token estimate from text length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEstimator {
    /// Characters per token for prompt and completion text.
    pub chars_per_token: u32,

    /// Prompt characters per output token when no completion text is known.
    pub prompt_chars_per_output_token: u32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            prompt_chars_per_output_token: 3,
        }
    }
}

impl TokenEstimator {
    /// Estimate counts for `prompt` and an optional `completion`.
    #[must_use]
    pub fn estimate(&self, prompt: &str, completion: Option<&str>) -> TokenCounts {
        let prompt_chars = prompt.chars().count() as u64;
        let input_tokens = prompt_chars.div_ceil(u64::from(self.chars_per_token.max(1)));
        let output_tokens = match completion {
            Some(text) => {
                (text.chars().count() as u64).div_ceil(u64::from(self.chars_per_token.max(1)))
            }
            None => prompt_chars.div_ceil(u64::from(self.prompt_chars_per_output_token.max(1))),
        };

        TokenCounts::new(input_tokens, output_tokens)
    }
}
