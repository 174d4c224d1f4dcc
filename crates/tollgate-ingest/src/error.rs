//! Ingestion error types.

use thiserror::Error;

/// Result type alias using the ingestion error type.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors from the relay client and the credit pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Relay client error (connect, subscribe, send).
    #[error("relay error: {0}")]
    Relay(#[from] nostr_sdk::client::Error),

    /// The configured secret key could not be parsed.
    #[error("invalid relay key: {0}")]
    Key(#[from] nostr::key::Error),

    /// An event was accepted by the client but rejected by every relay.
    #[error("failed to publish event: {0}")]
    Publish(String),

    /// The relay notification channel closed underneath the pipeline.
    #[error("relay notification channel closed")]
    ChannelClosed,

    /// Payload encoding error.
    #[error(transparent)]
    Encode(#[from] tollgate_core::Error),

    /// Ledger store error.
    #[error(transparent)]
    Store(#[from] tollgate_store::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_display() {
        let err = IngestError::Publish("relay unreachable".to_string());
        assert!(err.to_string().contains("failed to publish"));
        assert!(err.to_string().contains("relay unreachable"));
    }

    #[test]
    fn test_store_error_passthrough() {
        let err: IngestError = tollgate_store::StoreError::NotFound("user").into();
        assert_eq!(err.to_string(), "user not found");
    }
}
