//! Authentication: login proof verification and bearer tokens.
//!
//! Login is an Ed25519 proof: the client signs an arbitrary message with the
//! key behind its base58 public key. A successful proof is exchanged for an
//! HMAC-SHA256 bearer token carrying `{user_pubkey, exp}`, which the
//! [`AuthUser`] extractor validates on every protected route.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use tollgate_core::AuthConfig;

use crate::error::ApiError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Bearer token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_pubkey: String,
    pub exp: i64,
}

/// Issue a signed bearer token for `user_pubkey`. Returns the token and its
/// expiry instant.
pub fn issue_token(
    config: &AuthConfig,
    user_pubkey: &str,
) -> Result<(String, DateTime<Utc>), ApiError> {
    let expire_at = Utc::now() + Duration::hours(config.exp_hour);
    let claims = Claims {
        user_pubkey: user_pubkey.to_string(),
        exp: expire_at.timestamp(),
    };

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to sign token: {e}")))?;

    Ok((token, expire_at))
}

/// Verify a bearer token and return its claims. Expired or tampered tokens
/// are rejected.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "token validation failed");
        ApiError::Unauthorized
    })
}

/// Verify the Ed25519 login proof.
///
/// `user_pubkey` must be base58 over exactly 32 key bytes; `signature` is
/// standard base64 over the 64-byte signature; the signed payload is the raw
/// bytes of `message`. Every failure leg collapses into one opaque
/// "invalid signature" so the response does not reveal which check failed.
pub fn verify_login_signature(
    user_pubkey: &str,
    message: &str,
    signature: &str,
) -> Result<(), ApiError> {
    let key_bytes = bs58::decode(user_pubkey)
        .into_vec()
        .map_err(|_| ApiError::InvalidSignature)?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| ApiError::InvalidSignature)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| ApiError::InvalidSignature)?;

    let sig_bytes = BASE64
        .decode(signature)
        .map_err(|_| ApiError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| ApiError::InvalidSignature)?;

    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| ApiError::InvalidSignature)
}

/// Authenticated caller, extracted from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Base58 public key carried by the token.
    pub pubkey: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let token = match auth_header {
            Some(header) if header.starts_with(BEARER_PREFIX) => &header[BEARER_PREFIX.len()..],
            _ => {
                tracing::debug!("missing or malformed authorization header");
                return Err(ApiError::Unauthorized);
            }
        };

        let claims = verify_token(&state.config.auth.secret, token)?;

        Ok(AuthUser {
            pubkey: claims.user_pubkey,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn test_config() -> AuthConfig {
        AuthConfig {
            secret: "test-secret".to_string(),
            exp_hour: 24,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let config = test_config();
        let (token, expire_at) = issue_token(&config, "Ae3pubkey").unwrap();

        let claims = verify_token(&config.secret, &token).unwrap();
        assert_eq!(claims.user_pubkey, "Ae3pubkey");
        assert_eq!(claims.exp, expire_at.timestamp());
        assert!(expire_at > Utc::now());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = test_config();
        let (token, _) = issue_token(&config, "Ae3pubkey").unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_token("test-secret", "not.a.token").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Hand-craft a token that expired well past jsonwebtoken's leeway.
        let claims = Claims {
            user_pubkey: "Ae3pubkey".to_string(),
            exp: (Utc::now() - Duration::hours(2)).timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(verify_token("test-secret", &token).is_err());
    }

    fn login_proof(message: &str) -> (String, String) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let pubkey = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
        let signature = BASE64.encode(signing_key.sign(message.as_bytes()).to_bytes());
        (pubkey, signature)
    }

    #[test]
    fn test_valid_login_signature() {
        let (pubkey, signature) = login_proof("hello");
        assert!(verify_login_signature(&pubkey, "hello", &signature).is_ok());
    }

    #[test]
    fn test_wrong_message_rejected() {
        let (pubkey, signature) = login_proof("hello");
        assert!(verify_login_signature(&pubkey, "goodbye", &signature).is_err());
    }

    #[test]
    fn test_bad_base58_rejected() {
        let (_, signature) = login_proof("hello");
        // '0' and 'l' are outside the base58 alphabet.
        assert!(verify_login_signature("0lII", "hello", &signature).is_err());
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let (_, signature) = login_proof("hello");
        // 16 bytes instead of 32.
        let short_key = bs58::encode([7u8; 16]).into_string();
        assert!(verify_login_signature(&short_key, "hello", &signature).is_err());
    }

    #[test]
    fn test_bad_base64_signature_rejected() {
        let (pubkey, _) = login_proof("hello");
        assert!(verify_login_signature(&pubkey, "hello", "%%%not-base64%%%").is_err());
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let (pubkey, _) = login_proof("hello");
        let (_, other_signature) = login_proof("hello");
        assert!(verify_login_signature(&pubkey, "hello", &other_signature).is_err());
    }
}
