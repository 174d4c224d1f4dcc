//! API route definitions.

mod conversations;
mod health;
mod messages;
mod user;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the complete API router.
///
/// ## Public (no auth)
/// - `GET /health` - health check
/// - `POST /user/login` - Ed25519 login proof → bearer token
///
/// ## Protected (bearer token)
/// - `GET /user` - the caller's user record
/// - `POST /conversations` - create a conversation
/// - `GET /conversations` - list conversations, newest first
/// - `POST /messages` - run a completion, streamed back as SSE
/// - `GET /messages?conversation_id=…` - list messages, oldest first
///
/// Protected handlers take the [`crate::auth::AuthUser`] extractor, which
/// rejects missing or invalid tokens with 401 before the handler body runs.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/user/login", post(user::login))
        .route("/user", get(user::get_user))
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/messages",
            post(messages::add_message).get(messages::list_messages),
        )
        .with_state(state)
}
