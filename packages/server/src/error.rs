use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use store::StoreError;

use crate::services::callback::CallbackError;
use crate::services::submission::SubmitError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `UNAUTHORIZED`,
    /// `NOT_FOUND`, `INVALID_TRANSITION`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "target_identifier must not be empty")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized,
    NotFound(String),
    InvalidTransition(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "UNAUTHORIZED",
                    message: "Missing or invalid callback token".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::InvalidTransition(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "INVALID_TRANSITION",
                    message: msg,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<mq::MqError> for AppError {
    fn from(err: mq::MqError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(msg) => AppError::Validation(msg),
            SubmitError::Store(e) => AppError::Internal(format!("Failed to record job: {e}")),
        }
    }
}

impl From<CallbackError> for AppError {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::Unauthorized => AppError::Unauthorized,
            CallbackError::NotFound(job_id) => {
                AppError::NotFound(format!("Job {job_id} not found"))
            }
            CallbackError::InvalidTransition(msg) => AppError::InvalidTransition(msg),
            CallbackError::InvalidReport(msg) => AppError::Validation(msg),
            CallbackError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}
