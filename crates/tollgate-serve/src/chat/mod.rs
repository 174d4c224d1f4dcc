//! Upstream chat completion transport.
//!
//! A pure client for the OpenAI-style streaming completion API: it POSTs a
//! request, decodes the server-sent-event chunk stream, and hands every chunk
//! to the caller. It persists nothing and never retries; charging and
//! bookkeeping belong to the orchestrator.

mod client;
mod wire;

pub use client::{ChatClient, CompletionStream, API_BASE_URL};
pub use wire::{
    ChatCompletionRequest, ChatMessage, Delta, ResponseFormat, StreamChoice, StreamChunk,
    StreamOptions, Usage,
};

use axum::http::StatusCode;
use thiserror::Error;

/// Errors from the chat transport.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Connection or protocol failure talking to the upstream.
    #[error("chat transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("chat API returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    /// The caller's chunk handler aborted the stream.
    #[error("chat stream aborted: {0}")]
    Aborted(String),
}
