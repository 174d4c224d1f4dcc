//! User endpoints: login and profile.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_store::User;

use crate::auth::{self, AuthUser};
use crate::error::{ApiError, AppJson};
use crate::state::AppState;

/// `POST /user/login` request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Base58 Ed25519 public key (32 bytes decoded).
    pub user_pubkey: String,
    /// The message that was signed, as raw text.
    pub message: String,
    /// Base64 Ed25519 signature over `message`.
    pub signature: String,
}

/// `POST /user/login` response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
    pub expire_at: DateTime<Utc>,
}

/// `POST /user/login`
///
/// Verifies the Ed25519 proof, creates the user on first login, and issues a
/// bearer token.
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    auth::verify_login_signature(&req.user_pubkey, &req.message, &req.signature)?;

    let user = state.store.create_user(&req.user_pubkey).await?;
    let (token, expire_at) = auth::issue_token(&state.config.auth, &req.user_pubkey)?;

    tracing::info!(user = %req.user_pubkey, "user logged in");

    Ok(Json(LoginResponse {
        user,
        token,
        expire_at,
    }))
}

/// `GET /user`
///
/// Returns the authenticated caller's user record.
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, ApiError> {
    let user = state
        .store
        .get_user(&auth.pubkey)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(user))
}
