//! Application state.

use std::sync::Arc;

use tollgate_core::Config;
use tollgate_ingest::RelayClient;
use tollgate_store::LedgerStore;

use crate::chat::ChatClient;
use crate::orchestrator::Orchestrator;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ledger store for direct queries (users, conversations, messages).
    pub store: LedgerStore,

    /// The chat orchestrator driving POST /messages.
    pub orchestrator: Orchestrator,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble the application state from its already-connected parts.
    pub fn new(
        config: Arc<Config>,
        store: LedgerStore,
        chat: ChatClient,
        relay: RelayClient,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            store.clone(),
            chat,
            relay,
            config.chat.max_context_tokens,
        );

        Self {
            store,
            orchestrator,
            config,
        }
    }
}
