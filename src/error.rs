use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Delete blocked by dependent rows
    #[error("Referential integrity: {0}")]
    ReferentialIntegrity(String),

    /// A multi-step mutation failed and was rolled back as a whole
    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body: {"error": "..."}
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ReferentialIntegrity(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Transaction(msg) => {
                tracing::error!("Transaction failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl AppError {
    /// True when the underlying store error is a foreign key constraint
    /// violation. Used by delete paths to tell "still referenced" apart from
    /// a connection failure or any other store error.
    pub fn is_fk_violation(&self) -> bool {
        match self {
            AppError::Database(err) => matches!(
                err.sql_err(),
                Some(sea_orm::SqlErr::ForeignKeyConstraintViolation(_))
            ),
            _ => false,
        }
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

/// Helper to convert anyhow errors to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                AppError::Forbidden("wrong department".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::Validation("missing field".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::NotFound("student not found".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Conflict("roll number already exists".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::ReferentialIntegrity("department has students".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Transaction("promotion failed".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("student not found");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
