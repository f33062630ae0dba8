use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Bad credentials or a duplicate registration.
    #[error("{0}")]
    Auth(String),
    /// Missing or expired session.
    #[error("Unauthorized")]
    Unauthorized,
    /// Store unreachable or board initialization timed out.
    #[error("{0}")]
    Connectivity(String),
    /// A create/update/delete call against the store failed.
    #[error("Error {operation}: {message}")]
    Mutation {
        operation: &'static str,
        message: String,
    },
    /// Rejected before anything was written.
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Database(String),
}

impl AppError {
    /// Attach the failed operation to a store error so callers can surface
    /// "Error <operation>: <message>". Validation and lookup failures pass through.
    pub fn during(self, operation: &'static str) -> AppError {
        match self {
            AppError::Validation(_) | AppError::NotFound(_) | AppError::Mutation { .. } => self,
            other => AppError::Mutation {
                operation,
                message: other.to_string(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> AppError {
        AppError::Validation(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Mutation { .. } | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
