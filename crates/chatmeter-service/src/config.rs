//! Service configuration.

use std::path::Path;
use std::time::Duration;

use chatmeter_core::{PricingConfig, UnknownModelPolicy};

/// `DATA_DIR` value that selects the in-memory store.
pub const IN_MEMORY_DATA_DIR: &str = ":memory:";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/chatmeter").
    /// `:memory:` selects the in-memory store.
    pub data_dir: String,

    /// Shared HS256 secret for identity tokens.
    pub auth_jwt_secret: Option<String>,

    /// Expected `iss` claim, if any.
    pub auth_issuer: Option<String>,

    /// Admin API key accepted via `X-Admin-Key`.
    pub admin_api_key: Option<String>,

    /// Identity collaborator base URL.
    pub identity_url: Option<String>,

    /// Inference collaborator base URL (token counting).
    pub inference_url: Option<String>,

    /// Upper bound on a token-count call.
    pub inference_timeout: Duration,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Model rates and token estimation.
    pub pricing: PricingConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the optional pricing file.
    #[must_use]
    pub fn from_env() -> Self {
        let mut pricing = std::env::var("PRICING_FILE")
            .ok()
            .and_then(|path| match load_json_file::<PricingConfig>(&path) {
                Ok(pricing) => {
                    tracing::info!(path = %path, models = pricing.models.len(), "Loaded pricing file");
                    Some(pricing)
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to load pricing file, using defaults");
                    None
                }
            })
            .unwrap_or_default();

        if let Ok(policy) = std::env::var("UNKNOWN_MODEL_POLICY") {
            match policy.parse::<UnknownModelPolicy>() {
                Ok(policy) => pricing.unknown_model_policy = policy,
                Err(e) => tracing::warn!(value = %policy, error = %e, "Ignoring UNKNOWN_MODEL_POLICY"),
            }
        }

        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            auth_jwt_secret: non_empty_var("AUTH_JWT_SECRET"),
            auth_issuer: non_empty_var("AUTH_ISSUER"),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            identity_url: non_empty_var("IDENTITY_URL"),
            inference_url: non_empty_var("INFERENCE_URL"),
            inference_timeout: parsed_var("INFERENCE_TIMEOUT_MS")
                .map_or(defaults.inference_timeout, Duration::from_millis),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parsed_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parsed_var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            pricing,
        }
    }

    /// Whether the in-memory store was requested.
    #[must_use]
    pub fn uses_memory_store(&self) -> bool {
        self.data_dir == IN_MEMORY_DATA_DIR
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Load a JSON file.
fn load_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/chatmeter".into(),
            auth_jwt_secret: None,
            auth_issuer: None,
            admin_api_key: None,
            identity_url: None,
            inference_url: None,
            inference_timeout: Duration::from_millis(2000),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_file_overrides_models() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pricing.json");
        std::fs::write(
            &path,
            r#"{
                "models": [{
                    "name": "mistral",
                    "description": "Mistral 7B",
                    "input_micros_per_1k": 100,
                    "output_micros_per_1k": 200,
                    "requires_vip": false
                }],
                "default_model": "mistral",
                "unknown_model_policy": "reject"
            }"#,
        )
        .unwrap();

        let pricing: PricingConfig = load_json_file(path.to_str().unwrap()).unwrap();
        assert_eq!(pricing.default_model, "mistral");
        assert_eq!(pricing.unknown_model_policy, UnknownModelPolicy::Reject);
        assert!(pricing.model("gpt-4").is_none());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_json_file::<PricingConfig>("/nonexistent/pricing.json").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn memory_store_marker() {
        let config = ServiceConfig {
            data_dir: IN_MEMORY_DATA_DIR.into(),
            ..ServiceConfig::default()
        };
        assert!(config.uses_memory_store());
        assert!(!ServiceConfig::default().uses_memory_store());
    }
}
