//! Message endpoints: the streaming completion and the history listing.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use tollgate_store::Message;

use crate::auth::AuthUser;
use crate::error::{ApiError, AppJson, AppQuery};
use crate::state::AppState;

/// `POST /messages` request body.
#[derive(Debug, Deserialize)]
pub struct AddMessageRequest {
    pub conversation_id: Uuid,
    pub content: String,
    pub model: String,
}

/// `GET /messages` query parameters.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub conversation_id: Uuid,
}

/// `POST /messages`
///
/// Admits the request and opens the upstream stream, then forwards the
/// completion as SSE: `event: message` per content delta, a terminal
/// `event: done` carrying the persisted assistant row. Admission failures
/// and an upstream rejection of the request both happen before any SSE
/// framing, so they reach the client as plain JSON errors with the right
/// status code. Only failures after deltas have started flowing - where the
/// status is already committed - fall back to a terminal `event: error`
/// frame.
pub async fn add_message(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(req): AppJson<AddMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let admission = state
        .orchestrator
        .admit(&auth.pubkey, req.conversation_id, &req.model, &req.content)
        .await
        .map_err(ApiError::from)?;

    // Send the upstream request before committing to an SSE response, so a
    // rejected completion surfaces as 502 rather than a 200 with an error
    // frame.
    let active = state
        .orchestrator
        .begin(admission)
        .await
        .map_err(ApiError::from)?;

    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let result = orchestrator
            .finish(active, |delta| {
                // A closed channel means the client went away; abort the
                // upstream stream rather than completing on its behalf.
                delta_tx.send(delta_event(delta)).is_ok()
            })
            .await;

        match result {
            Ok(answer) => {
                let _ = tx.send(done_event(&answer));
            }
            Err(e) => {
                let api = ApiError::from(e);
                tracing::error!(error = %api, "chat completion failed mid-stream");
                let _ = tx.send(error_event(&api));
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn delta_event(content: &str) -> Event {
    // Serializing a json! literal cannot fail.
    Event::default()
        .event("message")
        .json_data(json!({ "content": content }))
        .unwrap_or_default()
}

fn done_event(answer: &Message) -> Event {
    Event::default()
        .event("done")
        .json_data(answer)
        .unwrap_or_default()
}

fn error_event(error: &ApiError) -> Event {
    Event::default()
        .event("error")
        .json_data(json!({ "error": error.to_string() }))
        .unwrap_or_default()
}

/// `GET /messages?conversation_id=…`
///
/// Lists a conversation's messages oldest-first. Only the owner may read.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(query): AppQuery<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let conversation = state
        .store
        .get_conversation(query.conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation"))?;

    if conversation.user_pubkey != auth.pubkey {
        return Err(ApiError::Forbidden(
            "conversation does not belong to the authenticated user",
        ));
    }

    let messages = state.store.get_messages(query.conversation_id).await?;
    Ok(Json(messages))
}
