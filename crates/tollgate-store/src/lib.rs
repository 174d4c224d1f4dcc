//! PostgreSQL ledger store.
//!
//! This crate owns all persistent state: users with their token counters,
//! conversations, messages, and the applied credit-event set. Two layers:
//!
//! - [`LedgerStore`] - row-level operations, each atomic with respect to
//!   concurrent callers
//! - [`TokenLedger`] - policy over the store: idempotent credit application
//!   and the ingestion watermark
//!
//! The credit-event table doubles as the deduplication set: a row exists iff
//! the event's effect has been applied, and the insert shares a transaction
//! with the balance adjustment.

mod error;
mod ledger;
pub mod models;
mod store;

pub use error::{Result, StoreError};
pub use ledger::{Applied, CreditEvent, TokenLedger};
pub use models::{Conversation, Message, Role, User};
pub use store::{connect, LedgerStore};
