//! Authentication extractors.
//!
//! - `AuthUser` - End-user authentication via identity-issued HS256 JWT
//! - `AdminAuth` - Admin authentication for privileged endpoints

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use chatmeter_core::{AccountId, MeteringError, Role};

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated caller extracted from a bearer token.
///
/// The account itself may not be registered yet; handlers that need the
/// ledger account load it through the engine.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The account ID (`sub` claim).
    pub account_id: AccountId,
    /// Username carried by the token, if any.
    pub username: Option<String>,
    /// Email carried by the token, if any.
    pub email: Option<String>,
    /// Role assigned by the identity service; applied when the account is
    /// registered.
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let claims = validate_jwt(token, state)?;

        let account_id = claims
            .sub
            .parse::<AccountId>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(Self {
            account_id,
            username: claims.username,
            email: claims.email,
            role: claims.role.unwrap_or(Role::User),
        })
    }
}

/// Admin authentication.
///
/// Accepts the configured `X-Admin-Key`, or a bearer token whose account has
/// the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(admin_key) = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
        {
            let expected_key = state
                .config
                .admin_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;
            if admin_key != expected_key {
                return Err(ApiError::Unauthorized);
            }

            let admin_id = parts
                .headers
                .get("x-admin-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("admin")
                .to_string();

            tracing::info!(admin_id = %admin_id, "Admin authenticated by key");
            return Ok(Self { admin_id });
        }

        let user = AuthUser::from_request_parts(parts, state).await?;
        let account = state.engine.account(&user.account_id).map_err(|e| match e {
            MeteringError::NotFound { .. } => ApiError::Forbidden,
            other => ApiError::Metering(other),
        })?;
        if !account.is_admin() {
            tracing::warn!(account_id = %account.id, "Non-admin account on admin route");
            return Err(ApiError::Forbidden);
        }

        tracing::info!(admin_id = %account.id, "Admin authenticated by token");
        Ok(Self {
            admin_id: account.id.to_string(),
        })
    }
}

/// JWT claims issued by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (account ID).
    pub sub: String,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default)]
    pub iat: i64,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Validate an HS256 token against the shared secret.
fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let Some(secret) = state.config.auth_jwt_secret.as_deref() else {
        tracing::warn!("AUTH_JWT_SECRET not configured; rejecting bearer token");
        return Err(ApiError::Unauthorized);
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);
    if let Some(issuer) = &state.config.auth_issuer {
        validation.set_issuer(&[issuer]);
    }

    let token_data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}
