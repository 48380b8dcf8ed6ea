//! Identity collaborator.
//!
//! Credentials and password resets are owned by an external identity
//! service. This service only forwards those calls and trusts the JWTs the
//! identity service issues.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chatmeter_core::AccountId;

/// Timeout for identity requests.
const IDENTITY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the identity collaborator.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No `IDENTITY_URL` configured.
    #[error("identity service not configured")]
    NotConfigured,

    /// The identity service rejected the credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Transport failure.
    #[error("identity request failed: {0}")]
    Http(String),

    /// The identity service answered with an unexpected status.
    #[error("identity service returned status {0}")]
    UnexpectedStatus(u16),
}

/// A token issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// The bearer token.
    pub access_token: String,
    /// Token type, normally `bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".into()
}

/// Credential operations delegated to the identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a username and password for a bearer token.
    async fn issue_token(&self, username: &str, password: &str)
        -> Result<TokenGrant, IdentityError>;

    /// Trigger a password reset for an account.
    async fn reset_password(&self, account_id: &AccountId) -> Result<(), IdentityError>;
}

/// `reqwest`-backed identity provider.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpIdentityProvider {
    /// Create a provider for `base_url`; `None` makes every call fail with
    /// [`IdentityError::NotConfigured`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Option<&str>) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(IDENTITY_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    fn url(&self, path: &str) -> Result<String, IdentityError> {
        self.base_url
            .as_ref()
            .map(|base| format!("{base}{path}"))
            .ok_or(IdentityError::NotConfigured)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn issue_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenGrant, IdentityError> {
        let url = self.url("/token")?;

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| IdentityError::Http(e.to_string()))?;

        match response.status().as_u16() {
            200..=299 => response
                .json()
                .await
                .map_err(|e| IdentityError::Http(e.to_string())),
            400 | 401 | 403 => Err(IdentityError::InvalidCredentials),
            status => Err(IdentityError::UnexpectedStatus(status)),
        }
    }

    async fn reset_password(&self, account_id: &AccountId) -> Result<(), IdentityError> {
        let url = self.url(&format!("/users/{account_id}/reset-password"))?;

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| IdentityError::Http(e.to_string()))?;

        if response.status().is_success() {
            tracing::info!(account_id = %account_id, "Password reset requested");
            Ok(())
        } else {
            Err(IdentityError::UnexpectedStatus(response.status().as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn issue_token_forwards_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_json(serde_json::json!({ "username": "alice", "password": "pw" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "jwt-value",
                    "token_type": "bearer"
                })),
            )
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(Some(&server.uri())).unwrap();
        let grant = provider.issue_token("alice", "pw").await.unwrap();
        assert_eq!(grant.access_token, "jwt-value");
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(Some(&server.uri())).unwrap();
        assert!(matches!(
            provider.issue_token("alice", "wrong").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn unconfigured_provider_fails() {
        let provider = HttpIdentityProvider::new(None).unwrap();
        assert!(matches!(
            provider.reset_password(&AccountId::generate()).await,
            Err(IdentityError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn reset_password_posts_to_account_path() {
        let server = MockServer::start().await;
        let account_id = AccountId::generate();
        Mock::given(method("POST"))
            .and(path(format!("/users/{account_id}/reset-password")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(Some(&server.uri())).unwrap();
        provider.reset_password(&account_id).await.unwrap();
    }
}
