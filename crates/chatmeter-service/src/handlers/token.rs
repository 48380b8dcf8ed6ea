//! Token issuance, delegated to the identity service.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::identity::TokenGrant;
use crate::state::AppState;

/// Login request.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Exchange credentials for a bearer token.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenGrant>, ApiError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest("username and password are required".into()));
    }

    let grant = state
        .identity
        .issue_token(&body.username, &body.password)
        .await?;

    tracing::debug!(username = %body.username, "Token issued");
    Ok(Json(grant))
}
