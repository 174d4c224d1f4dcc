//! Core types shared across the Tollgate proxy.
//!
//! This crate provides:
//! - YAML configuration loading and validation
//! - The relay wire payload (tagged union carried in event content)
//! - Shared error types

mod error;

pub mod config;
pub mod payload;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// The Nostr event kind used for all proxy traffic (credits, debits, status).
pub const EVENT_KIND: u16 = 1573;

pub use config::{
    AuthConfig, ChatConfig, Config, DatabaseConfig, NostrConfig, ServerConfig,
};
pub use error::{Error, Result};
pub use payload::{ProxyStatus, RelayPayload, StatusReason};
