//! Chat orchestrator.
//!
//! One request spans three resources - the database, the upstream completion
//! stream, and the client's SSE socket - and must leave the ledger consistent
//! on every failure path:
//!
//! ```text
//!   ADMIT ─► STREAM ─► COMMIT ─► DEBIT ─► DONE
//!     │         │         │
//!     ▼         ▼         ▼
//!   reject    abort     abort      (no write, no debit)
//! ```
//!
//! Nothing is written and nothing is charged until the upstream stream has
//! finished with a usable usage counter. The debit itself is not applied
//! locally: it is published to the relay and round-trips through the credit
//! pipeline, so the event log stays the single source of balance mutations.

use thiserror::Error;
use uuid::Uuid;

use tollgate_core::RelayPayload;
use tollgate_ingest::RelayClient;
use tollgate_store::{Conversation, LedgerStore, Message, StoreError};

use crate::chat::{
    ChatClient, ChatCompletionRequest, ChatError, ChatMessage, CompletionStream, StreamOptions,
    Usage,
};

/// Orchestrator failures, mapped to HTTP statuses by the routes layer.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("conversation not found")]
    ConversationNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("conversation does not belong to the authenticated user")]
    NotOwner,

    #[error("conversation context limit exceeded")]
    ContextExhausted,

    #[error("insufficient tokens")]
    InsufficientTokens,

    /// The stream ended without a usable usage block; with no authoritative
    /// counter there is nothing to commit or charge.
    #[error("invalid usage data from chat API")]
    InvalidUsage,

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An admitted request: everything STREAM needs, resolved and authorized.
pub struct Admission {
    conversation: Conversation,
    user_content: String,
    request: ChatCompletionRequest,
}

impl Admission {
    /// The admitted `max_tokens` ceiling (visible for tests).
    pub fn cap(&self) -> u32 {
        self.request.max_tokens
    }
}

/// An admitted request whose upstream stream has been accepted: the POST went
/// through and the status was checked, but nothing has been forwarded,
/// written, or charged yet.
pub struct ActiveCompletion {
    admission: Admission,
    stream: CompletionStream,
}

/// Clamp the admission ceiling to what both the conversation context and the
/// user's balance allow, bounded by the wire's u32 field.
fn admission_cap(remaining_context: i64, balance: i64) -> u32 {
    remaining_context.min(balance).clamp(0, u32::MAX as i64) as u32
}

/// The ADMIT → STREAM → COMMIT → DEBIT state machine.
#[derive(Clone)]
pub struct Orchestrator {
    store: LedgerStore,
    chat: ChatClient,
    relay: RelayClient,
    max_context_tokens: u64,
}

impl Orchestrator {
    pub fn new(
        store: LedgerStore,
        chat: ChatClient,
        relay: RelayClient,
        max_context_tokens: u64,
    ) -> Self {
        Self {
            store,
            chat,
            relay,
            max_context_tokens,
        }
    }

    /// ADMIT: authorize the caller and check balance and context budget.
    ///
    /// No state is touched; a rejection here reaches the client as a plain
    /// JSON error before any SSE framing starts.
    pub async fn admit(
        &self,
        caller_pubkey: &str,
        conversation_id: Uuid,
        model: &str,
        content: &str,
    ) -> Result<Admission, OrchestratorError> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(OrchestratorError::ConversationNotFound)?;

        if conversation.user_pubkey != caller_pubkey {
            return Err(OrchestratorError::NotOwner);
        }

        let user = self
            .store
            .get_user(&conversation.user_pubkey)
            .await?
            .ok_or(OrchestratorError::UserNotFound)?;

        let remaining = self.max_context_tokens as i64 - conversation.total_tokens;
        if remaining < 1 {
            return Err(OrchestratorError::ContextExhausted);
        }
        if user.balance < 1 {
            return Err(OrchestratorError::InsufficientTokens);
        }

        let history = self.store.get_messages(conversation_id).await?;
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|m| ChatMessage::new(m.role.clone(), m.content.clone()))
            .collect();
        messages.push(ChatMessage::new("user", content));

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            max_tokens: admission_cap(remaining, user.balance),
            stream: Some(true),
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            ..Default::default()
        };

        Ok(Admission {
            conversation,
            user_content: content.to_string(),
            request,
        })
    }

    /// STREAM, first half: send the upstream request and check its status.
    ///
    /// An upstream rejection here still reaches the client as a plain error
    /// response with the right status code - no response framing has been
    /// committed yet. Nothing is written and nothing is charged.
    pub async fn begin(
        &self,
        admission: Admission,
    ) -> Result<ActiveCompletion, OrchestratorError> {
        let stream = self.chat.open_stream(&admission.request).await?;
        Ok(ActiveCompletion { admission, stream })
    }

    /// STREAM second half + COMMIT + DEBIT.
    ///
    /// `on_delta` is called with each content fragment; returning `false`
    /// (the client hung up) aborts the upstream stream. On any streaming
    /// failure nothing is written and nothing is charged. On success the
    /// exchange and the usage counter are committed in one transaction, then
    /// the debit is published to the relay; a publish failure is logged but
    /// does not fail the request - the exchange already happened.
    pub async fn finish<F>(
        &self,
        active: ActiveCompletion,
        mut on_delta: F,
    ) -> Result<Message, OrchestratorError>
    where
        F: FnMut(&str) -> bool,
    {
        let ActiveCompletion { admission, stream } = active;

        let mut full_response = String::new();
        let mut final_usage: Option<Usage> = None;

        stream
            .for_each_chunk(|chunk| {
                for choice in &chunk.choices {
                    if let Some(content) = choice.delta.content.as_deref() {
                        if !content.is_empty() {
                            full_response.push_str(content);
                            if !on_delta(content) {
                                return Err(ChatError::Aborted(
                                    "client disconnected".to_string(),
                                ));
                            }
                        }
                    }
                }
                // The terminal chunk's usage is authoritative.
                if let Some(usage) = &chunk.usage {
                    final_usage = Some(usage.clone());
                }
                Ok(())
            })
            .await?;

        let usage = final_usage
            .filter(|u| u.total_tokens > 0)
            .ok_or(OrchestratorError::InvalidUsage)?;

        // COMMIT: both messages and the context counter, one transaction.
        let answer = self
            .store
            .append_exchange(
                admission.conversation.id,
                &admission.user_content,
                &full_response,
                i64::from(usage.total_tokens),
            )
            .await?;

        // DEBIT: published, not applied; it comes back through the credit
        // pipeline and the event-id dedup makes redelivery harmless.
        let debit = RelayPayload::debit(
            &admission.conversation.user_pubkey,
            u64::from(usage.total_tokens),
        );
        if let Err(e) = self.relay.publish(&debit).await {
            tracing::error!(
                user = %admission.conversation.user_pubkey,
                tokens = usage.total_tokens,
                error = %e,
                "failed to publish debit event; balance will drift until the relay accepts it"
            );
        }

        Ok(answer)
    }
}
