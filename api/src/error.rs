use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use handoff_core::error::{self, ApiError};

use crate::broker::BrokerError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Resource not found (404)
    NotFound { resource: String },
    /// Missing or invalid end-user credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Authenticated but not allowed (403)
    Forbidden {
        message: String,
        docs_hint: Option<String>,
    },
    /// Request is no longer pending (409)
    Conflict {
        message: String,
        error_code: &'static str,
        docs_hint: Option<String>,
    },
    /// Request deadline has passed (410)
    Gone {
        message: String,
        error_code: &'static str,
        docs_hint: Option<String>,
    },
    /// Database error (500)
    Database(sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    error_code: None,
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    error_code: None,
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    error_code: None,
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Forbidden { message, docs_hint } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    error: error::codes::FORBIDDEN.to_string(),
                    error_code: None,
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Conflict {
                message,
                error_code,
                docs_hint,
            } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    error_code: Some(error_code.to_string()),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Gone {
                message,
                error_code,
                docs_hint,
            } => (
                StatusCode::GONE,
                ApiError {
                    error: error::codes::EXPIRED.to_string(),
                    error_code: Some(error_code.to_string()),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Database(err) => {
                // Session deleted between the existence check and the insert.
                if let sqlx::Error::Database(ref db_err) = err {
                    if db_err.code().as_deref() == Some("23503") {
                        tracing::warn!("Foreign key violation: {:?}", err);
                        return AppError::NotFound {
                            resource: "Referenced session".to_string(),
                        }
                        .into_response();
                    }
                }

                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        error_code: None,
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Validation { field, message } => AppError::Validation {
                message,
                field: Some(field.to_string()),
                received: None,
                docs_hint: None,
            },
            BrokerError::SessionNotFound(id) => AppError::NotFound {
                resource: format!("Session {id}"),
            },
            BrokerError::RequestNotFound(id) => AppError::NotFound {
                resource: format!("User input request {id}"),
            },
            BrokerError::Forbidden { .. } => AppError::Forbidden {
                message: "You do not own the session this request belongs to".to_string(),
                docs_hint: None,
            },
            BrokerError::InvalidState { id, status } => AppError::Conflict {
                message: format!("User input request {id} is already {status}"),
                error_code: error::codes::USER_INPUT_REQUEST_NOT_PENDING,
                docs_hint: Some(
                    "Answers are accepted once. Fetch the request to see the recorded answer."
                        .to_string(),
                ),
            },
            BrokerError::Expired { id, expires_at } => AppError::Gone {
                message: format!("User input request {id} expired at {expires_at}"),
                error_code: error::codes::USER_INPUT_REQUEST_EXPIRED,
                docs_hint: Some(
                    "The agent stopped waiting for this answer. Answer a newer pending request instead."
                        .to_string(),
                ),
            },
            BrokerError::Store(err) => AppError::Database(err),
        }
    }
}
