//! Application state.

use std::sync::Arc;

use chatmeter_core::Result;
use chatmeter_store::Store;

use crate::config::ServiceConfig;
use crate::engine::MeteringEngine;
use crate::identity::{HttpIdentityProvider, IdentityError, IdentityProvider};
use crate::inference::{HttpTokenCounter, NoTokenCounter, TokenCounter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The metering engine.
    pub engine: Arc<MeteringEngine>,

    /// Identity collaborator.
    pub identity: Arc<dyn IdentityProvider>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create application state with the HTTP collaborators from `config`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the plan catalog cannot be loaded.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self> {
        let token_counter: Arc<dyn TokenCounter> = match config.inference_url.as_deref() {
            Some(url) => match HttpTokenCounter::new(url) {
                Ok(counter) => {
                    tracing::info!(inference_url = %url, "Inference token counting enabled");
                    Arc::new(counter)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create inference client");
                    Arc::new(NoTokenCounter)
                }
            },
            None => {
                tracing::warn!("INFERENCE_URL not configured - token counts will be estimated");
                Arc::new(NoTokenCounter)
            }
        };

        if config.identity_url.is_none() {
            tracing::warn!("IDENTITY_URL not configured - /token and password resets will fail");
        }
        let identity: Arc<dyn IdentityProvider> =
            match HttpIdentityProvider::new(config.identity_url.as_deref()) {
                Ok(provider) => Arc::new(provider),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create identity client");
                    Arc::new(UnavailableIdentity)
                }
            };

        Self::with_collaborators(store, config, identity, token_counter)
    }

    /// Create application state with explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the plan catalog cannot be loaded.
    pub fn with_collaborators(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        identity: Arc<dyn IdentityProvider>,
        token_counter: Arc<dyn TokenCounter>,
    ) -> Result<Self> {
        let engine = MeteringEngine::new(
            store,
            config.pricing.clone(),
            token_counter,
            config.inference_timeout,
        )?;

        Ok(Self {
            engine: Arc::new(engine),
            identity,
            config,
        })
    }
}

/// Stand-in when the identity client could not be built.
struct UnavailableIdentity;

#[async_trait::async_trait]
impl IdentityProvider for UnavailableIdentity {
    async fn issue_token(
        &self,
        _username: &str,
        _password: &str,
    ) -> std::result::Result<crate::identity::TokenGrant, IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    async fn reset_password(
        &self,
        _account_id: &chatmeter_core::AccountId,
    ) -> std::result::Result<(), IdentityError> {
        Err(IdentityError::NotConfigured)
    }
}
