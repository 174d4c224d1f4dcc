//! Conversation endpoints.

use axum::extract::State;
use axum::Json;

use tollgate_store::Conversation;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /conversations`
///
/// Creates a conversation owned by the token subject. The owning user row is
/// created on demand so a credited-but-never-logged-in key can still start a
/// conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Conversation>, ApiError> {
    state.store.create_user(&auth.pubkey).await?;

    let conversation = state.store.create_conversation(&auth.pubkey).await?;

    tracing::info!(user = %auth.pubkey, conversation = %conversation.id, "conversation created");

    Ok(Json(conversation))
}

/// `GET /conversations`
///
/// Lists the caller's conversations, newest first.
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state.store.get_conversations(&auth.pubkey).await?;
    Ok(Json(conversations))
}
