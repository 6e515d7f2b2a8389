use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Error taxonomy for the resolver core.
///
/// Every variant maps to a stable machine-readable code and an
/// HTTP-like status class. All errors are terminal for the current
/// operation; the core performs no retries.
#[derive(Debug)]
pub enum AppError {
    InvalidInput(String),
    NotFound(String),
    Authentication(String),
    AlreadyStarred(String),
    NotStarred(String),
    AlreadyFollowed(String),
    NotFollowed(String),
    Ownership(String),
    MalformedCursor(String),
    InvalidPaginationArgs(String),
    SourceUnavailable(anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code for the transport boundary.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::AlreadyStarred(_) => "POST_ALREADY_STARRED",
            AppError::NotStarred(_) => "POST_NOT_STARRED",
            AppError::AlreadyFollowed(_) => "PROFILE_ALREADY_FOLLOWED",
            AppError::NotFollowed(_) => "PROFILE_NOT_FOLLOWED",
            AppError::Ownership(_) => "NOT_OWNER",
            AppError::MalformedCursor(_) => "MALFORMED_CURSOR",
            AppError::InvalidPaginationArgs(_) => "INVALID_PAGINATION_ARGS",
            AppError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Authentication(msg) => write!(f, "Authentication required: {}", msg),
            AppError::AlreadyStarred(id) => {
                write!(f, "Post with id {} is already starred", id)
            }
            AppError::NotStarred(id) => write!(f, "Post with id {} is not starred", id),
            AppError::AlreadyFollowed(id) => {
                write!(f, "Profile with id {} is already followed", id)
            }
            AppError::NotFollowed(id) => write!(f, "Profile with id {} is not followed", id),
            AppError::Ownership(msg) => write!(f, "Not the owner: {}", msg),
            AppError::MalformedCursor(cursor) => write!(f, "Malformed cursor: {}", cursor),
            AppError::InvalidPaginationArgs(msg) => {
                write!(f, "Invalid pagination arguments: {}", msg)
            }
            AppError::SourceUnavailable(err) => write!(f, "Storage unavailable: {}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_)
            | AppError::AlreadyStarred(_)
            | AppError::NotStarred(_)
            | AppError::AlreadyFollowed(_)
            | AppError::NotFollowed(_)
            | AppError::MalformedCursor(_)
            | AppError::InvalidPaginationArgs(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Ownership(_) => StatusCode::FORBIDDEN,
            AppError::SourceUnavailable(err) => {
                tracing::error!("Storage error: {}", err);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let message = match &self {
            // Do not leak backend details to clients.
            AppError::SourceUnavailable(_) => "Storage unavailable".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::SourceUnavailable(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::SourceUnavailable(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;
