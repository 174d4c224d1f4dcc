//! Tollgate HTTP surface and chat orchestrator.
//!
//! This crate hosts the user-facing half of the proxy:
//!
//! - **Auth**: Ed25519 login proof exchanged for an HMAC-signed bearer token
//! - **Routes**: user, conversation, and message endpoints; POST `/messages`
//!   streams the completion back as server-sent events
//! - **Chat client**: pure transport to the upstream completion API
//! - **Orchestrator**: the ADMIT → STREAM → COMMIT → DEBIT state machine
//!   that keeps the ledger consistent on every failure path
//!
//! # Architecture
//!
//! - **AppState**: shared application state (store, orchestrator, config)
//! - **ApiError**: typed failures mapped to HTTP status codes
//! - **Routes**: endpoint handlers grouped by domain

pub mod auth;
pub mod chat;
mod error;
pub mod orchestrator;
mod routes;
mod state;

pub use self::error::{ApiError, AppJson, AppQuery};
pub use self::orchestrator::{ActiveCompletion, Admission, Orchestrator, OrchestratorError};
pub use self::routes::router;
pub use self::state::AppState;
