use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use revision_core::CoreError;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Api(#[from] ApiError),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        #[derive(serde::Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message) = match self {
            ServerError::Api(ApiError::BadRequest(message)) => {
                (StatusCode::BAD_REQUEST, message)
            }
            ServerError::Api(ApiError::NotFound(message)) => (StatusCode::NOT_FOUND, message),
            ServerError::Core(CoreError::SchemaViolation(m)) => (StatusCode::BAD_REQUEST, m),
            ServerError::Core(CoreError::MalformedId(m)) => {
                (StatusCode::BAD_REQUEST, format!("malformed id: {m}"))
            }
            ServerError::Core(CoreError::RevisionNotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("revision not found for {id}"))
            }
            ServerError::Core(e) => {
                warn!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, axum::Json(ErrorResponse { message })).into_response()
    }
}
