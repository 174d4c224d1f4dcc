//! Relay wire payload.
//!
//! Every proxy event (kind 1573) carries a JSON content body that is an
//! externally tagged union. Only the `Transaction` variant drives the ledger;
//! `Request` and `Status` belong to the device-control half of the protocol
//! and are ignored by this service, but are kept so that published events
//! round-trip through shared tooling unchanged.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::Result;

/// Device availability carried by `Request`/`Status` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ProxyStatus {
    Available = 1,
    Working = 2,
}

/// Reason for a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StatusReason {
    UserRequest = 1,
    AdminRequest = 2,
    UserBehaviour = 3,
    Reset = 4,
    LockFailed = 5,
}

/// Content of a proxy relay event.
///
/// Serialized form is externally tagged, e.g.
/// `{"Transaction":{"user":"<pubkey>","tokens":1000}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayPayload {
    Request {
        to_status: ProxyStatus,
        reason: StatusReason,
        initial_request: String,
        payload: String,
    },
    Status {
        status: ProxyStatus,
        reason: StatusReason,
        initial_request: String,
        payload: String,
    },
    /// A ledger mutation. Positive `tokens` is a credit from settlement;
    /// negative is an authoritative debit emitted after a completed chat.
    Transaction { user: String, tokens: i64 },
}

impl RelayPayload {
    /// Decode an event content string.
    pub fn decode(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Encode into an event content string.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build a debit transaction for a completed chat.
    pub fn debit(user: impl Into<String>, total_tokens: u64) -> Self {
        Self::Transaction {
            user: user.into(),
            tokens: -(total_tokens as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_decodes() {
        let payload =
            RelayPayload::decode(r#"{"Transaction":{"user":"Ae3pubkey","tokens":1000}}"#).unwrap();
        assert_eq!(
            payload,
            RelayPayload::Transaction {
                user: "Ae3pubkey".to_string(),
                tokens: 1000,
            }
        );
    }

    #[test]
    fn test_negative_tokens_decode() {
        let payload =
            RelayPayload::decode(r#"{"Transaction":{"user":"Ae3pubkey","tokens":-7}}"#).unwrap();
        match payload {
            RelayPayload::Transaction { tokens, .. } => assert_eq!(tokens, -7),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_status_decodes() {
        let payload = RelayPayload::decode(
            r#"{"Status":{"status":1,"reason":4,"initial_request":"abc","payload":""}}"#,
        )
        .unwrap();
        match payload {
            RelayPayload::Status { status, reason, .. } => {
                assert_eq!(status, ProxyStatus::Available);
                assert_eq!(reason, StatusReason::Reset);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_variant_is_an_error() {
        assert!(RelayPayload::decode(r#"{"Account":{"user":"x","tokens":3}}"#).is_err());
        assert!(RelayPayload::decode("not json").is_err());
        assert!(RelayPayload::decode("{}").is_err());
    }

    #[test]
    fn test_debit_encoding() {
        let debit = RelayPayload::debit("Ae3pubkey", 7);
        assert_eq!(
            debit.encode().unwrap(),
            r#"{"Transaction":{"user":"Ae3pubkey","tokens":-7}}"#
        );
    }

    #[test]
    fn test_transaction_round_trip() {
        let original = RelayPayload::Transaction {
            user: "user1".to_string(),
            tokens: -42,
        };
        let decoded = RelayPayload::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(original, decoded);
    }
}
