//! Persistent row types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A metered user, identified by a base58 Ed25519 public key.
///
/// `balance` and `consumed` satisfy `balance + consumed = Σ applied credit
/// deltas` (negative deltas debit balance and grow consumed by the absolute
/// value). Balance is signed because concurrent admissions may transiently
/// overspend.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub public_key: String,
    pub balance: i64,
    pub consumed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conversation owned by one user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_pubkey: String,
    /// Running sum of upstream usage attributed to this conversation.
    pub total_tokens: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An ordered message within a conversation. `id` is the monotonic sequence.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_strings() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_user_serializes_with_snake_case_fields() {
        let user = User {
            id: 1,
            public_key: "Ae3pubkey".to_string(),
            balance: 1000,
            consumed: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["public_key"], "Ae3pubkey");
        assert_eq!(json["balance"], 1000);
        assert_eq!(json["consumed"], 0);
    }

    #[test]
    fn test_message_serializes_role_and_content() {
        let msg = Message {
            id: 7,
            conversation_id: Uuid::nil(),
            role: Role::Assistant.as_str().to_string(),
            content: "hello".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hello");
    }
}
