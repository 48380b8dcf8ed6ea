//! Token counting via the inference collaborator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use chatmeter_core::TokenCounts;

/// Transport-level timeout; the engine applies its own, shorter bound.
const INFERENCE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the inference collaborator.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Transport failure.
    #[error("inference request failed: {0}")]
    Http(String),

    /// The inference service answered with an unexpected status.
    #[error("inference service returned status {0}")]
    UnexpectedStatus(u16),
}

/// Source of exact token counts for a chat.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    /// Exact counts for `prompt` (and `completion`, when known) under `model`,
    /// or `None` when the collaborator cannot provide them.
    async fn count_tokens(
        &self,
        model: &str,
        prompt: &str,
        completion: Option<&str>,
    ) -> Option<TokenCounts>;
}

/// Counter used when no inference service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokenCounter;

#[async_trait]
impl TokenCounter for NoTokenCounter {
    async fn count_tokens(&self, _: &str, _: &str, _: Option<&str>) -> Option<TokenCounts> {
        None
    }
}

#[derive(Serialize)]
struct CountRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion: Option<&'a str>,
}

/// `reqwest`-backed counter posting to `{base_url}/count-tokens`.
#[derive(Debug, Clone)]
pub struct HttpTokenCounter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTokenCounter {
    /// Create a counter for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(INFERENCE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/count-tokens", base_url.trim_end_matches('/')),
        })
    }

    async fn request(
        &self,
        model: &str,
        prompt: &str,
        completion: Option<&str>,
    ) -> Result<TokenCounts, InferenceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CountRequest {
                model,
                prompt,
                completion,
            })
            .send()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InferenceError::UnexpectedStatus(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))
    }
}

#[async_trait]
impl TokenCounter for HttpTokenCounter {
    async fn count_tokens(
        &self,
        model: &str,
        prompt: &str,
        completion: Option<&str>,
    ) -> Option<TokenCounts> {
        match self.request(model, prompt, completion).await {
            Ok(counts) => Some(counts),
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Token count unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_collaborator_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/count-tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "input_tokens": 12,
                "output_tokens": 34
            })))
            .mount(&server)
            .await;

        let counter = HttpTokenCounter::new(&server.uri()).unwrap();
        assert_eq!(
            counter.count_tokens("gpt-4", "hello", Some("world")).await,
            Some(TokenCounts::new(12, 34))
        );
    }

    #[tokio::test]
    async fn server_error_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let counter = HttpTokenCounter::new(&server.uri()).unwrap();
        assert_eq!(counter.count_tokens("gpt-4", "hello", None).await, None);
    }
}
