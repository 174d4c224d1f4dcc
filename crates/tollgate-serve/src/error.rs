//! API error types and response formatting.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be bound or parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// The login proof did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token subject does not own the target resource.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The user's balance does not admit a completion.
    #[error("insufficient tokens")]
    InsufficientTokens,

    /// The conversation's context budget is spent.
    #[error("conversation context limit exceeded")]
    ContextExhausted,

    /// Upstream chat API failure.
    #[error("upstream chat error: {0}")]
    Upstream(String),

    /// Ledger store error.
    #[error("store error: {0}")]
    Store(#[from] tollgate_store::StoreError),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientTokens => StatusCode::PAYMENT_REQUIRED,
            Self::ContextExhausted => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Store(tollgate_store::StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs, not the response body.
        let message = match &self {
            Self::Store(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %err, "store error");
                "internal error".to_string()
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                "internal error".to_string()
            }
            Self::Upstream(err) => {
                tracing::error!(error = %err, "upstream chat error");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse { error: message };
        (status, Json(body)).into_response()
    }
}

impl From<crate::orchestrator::OrchestratorError> for ApiError {
    fn from(err: crate::orchestrator::OrchestratorError) -> Self {
        use crate::orchestrator::OrchestratorError;

        match err {
            OrchestratorError::ConversationNotFound => Self::NotFound("conversation"),
            OrchestratorError::UserNotFound => Self::NotFound("user"),
            OrchestratorError::NotOwner => {
                Self::Forbidden("conversation does not belong to the authenticated user")
            }
            OrchestratorError::ContextExhausted => Self::ContextExhausted,
            OrchestratorError::InsufficientTokens => Self::InsufficientTokens,
            OrchestratorError::InvalidUsage => {
                Self::Upstream("invalid usage data from chat API".to_string())
            }
            OrchestratorError::Chat(e) => Self::Upstream(e.to_string()),
            OrchestratorError::Store(e) => Self::Store(e),
        }
    }
}

/// `Json` extractor whose rejection is the API's `{"error": …}` shape with a
/// 400 status, instead of axum's default.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(AppJson(value))
    }
}

/// `Query` extractor with the same `{"error": …}` rejection shape as
/// [`AppJson`].
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(AppQuery(value))
    }
}
