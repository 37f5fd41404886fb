//! Error types for the CFI bridge server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::cfi::{CfiError, SyntaxError};
use crate::dom::DocumentError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Cfi(#[from] CfiError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

impl From<SyntaxError> for AppError {
    fn from(err: SyntaxError) -> Self {
        AppError::Cfi(err.into())
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            AppError::Document(_) => (StatusCode::BAD_REQUEST, "document_error"),
            AppError::Cfi(err) => match err {
                CfiError::Syntax(_) => (StatusCode::BAD_REQUEST, "syntax_error"),
                CfiError::NodeType { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "node_type_error"),
                CfiError::OutOfRange { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "out_of_range"),
                CfiError::Terminus { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "terminus_error"),
                CfiError::AssertionMismatch(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "assertion_mismatch")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_kind();
        tracing::debug!(error = %self, "request failed");
        let message = self.to_string();

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(format!("{:?}", self))
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
