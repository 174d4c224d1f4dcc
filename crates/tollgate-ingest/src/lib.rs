//! Credit ingestion for the Tollgate proxy.
//!
//! This crate turns the relay's event stream into exactly-once ledger
//! effects:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ RelayClient │ ──► │  CreditPipeline  │ ──► │ TokenLedger │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//!   subscribe with      decode Transaction       one-transaction
//!   {kind, since,       payloads, skip the       apply keyed on
//!    s, p} filter       rest                     the event id
//! ```
//!
//! The pipeline is watermark-driven: each subscription cycle starts from the
//! maximum applied event timestamp plus one, so replay after a restart or a
//! reconnect is bounded and the event-id dedup absorbs the overlap.

mod error;
pub mod pipeline;
pub mod relay;

pub use error::{IngestError, Result};
pub use pipeline::CreditPipeline;
pub use relay::RelayClient;
