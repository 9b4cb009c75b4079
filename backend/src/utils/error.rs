use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_i18n::t;
use serde::Serialize;
use thiserror::Error;

use super::i18n::get_locale;

/// API Error with rich context and automatic error trait implementations
///
/// Each variant carries the context a caller needs to act on it, e.g. the
/// exact column name for `ColumnNotFound`.
#[derive(Error, Debug)]
pub enum ApiError {
    // Authentication errors 1xxx
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    // Analysis errors 2xxx
    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("No product category columns found in data")]
    NoCategoryColumns,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    // Resource errors 3xxx
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Dataset not found for session")]
    DatasetNotFound,

    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: i64 },

    #[error("Job {job_id} not found")]
    JobNotFound { job_id: i64 },

    // Validation errors 4xxx
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // System errors 5xxx
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Failed to load dataset: {0}")]
    LoadError(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn invalid_credentials() -> Self {
        Self::InvalidCredentials
    }

    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound { column: column.into() }
    }

    pub fn session_not_found(session_id: i64) -> Self {
        Self::SessionNotFound { session_id }
    }

    pub fn load_error(message: impl Into<String>) -> Self {
        Self::LoadError(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound(message.into())
    }

    /// Numeric error code; the thousands digit selects the HTTP status
    pub fn error_code(&self) -> i32 {
        match self {
            // Authentication errors 1xxx
            Self::Unauthorized(_) => 1001,
            Self::TokenExpired => 1002,
            Self::InvalidCredentials => 1003,

            // Analysis errors 2xxx
            Self::ColumnNotFound { .. } => 2001,
            Self::NoCategoryColumns => 2002,
            Self::UnsupportedFileType(_) => 2003,

            // Resource errors 3xxx
            Self::ResourceNotFound(_) => 3000,
            Self::DatasetNotFound => 3001,
            Self::SessionNotFound { .. } => 3002,
            Self::JobNotFound { .. } => 3003,

            // Validation errors 4xxx
            Self::ValidationError(_) => 4001,
            Self::InvalidInput(_) => 4002,

            // System errors 5xxx
            Self::InternalError(_) => 5001,
            Self::Other(_) => 5001,
            Self::Database(_) => 5002,
            Self::LoadError(_) => 5003,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Get localized error message based on current locale
    pub fn localized_message(&self) -> String {
        let locale = get_locale();
        match self {
            Self::Unauthorized(msg) => {
                if msg.contains("Missing authorization header") {
                    t!("auth.missing_header", locale = &locale).to_string()
                } else if msg.contains("Invalid authorization header") {
                    t!("auth.invalid_header", locale = &locale).to_string()
                } else if msg.contains("JWT verification failed") {
                    t!("auth.jwt_failed", locale = &locale).to_string()
                } else {
                    msg.clone()
                }
            },
            Self::TokenExpired => t!("auth.token_expired", locale = &locale).to_string(),
            Self::InvalidCredentials => t!("auth.invalid_credentials", locale = &locale).to_string(),
            Self::ColumnNotFound { column } => {
                t!("analysis.column_not_found", locale = &locale, column = column).to_string()
            },
            Self::NoCategoryColumns => t!("analysis.no_category_columns", locale = &locale).to_string(),
            Self::UnsupportedFileType(ext) => {
                t!("data.unsupported_file_type", locale = &locale, ext = ext).to_string()
            },
            Self::ResourceNotFound(name) => {
                t!("resource.not_found", locale = &locale, name = name).to_string()
            },
            Self::DatasetNotFound => t!("resource.dataset_not_found", locale = &locale).to_string(),
            Self::SessionNotFound { session_id } => {
                t!("resource.session_not_found", locale = &locale, id = session_id).to_string()
            },
            Self::JobNotFound { job_id } => {
                t!("resource.job_not_found", locale = &locale, id = job_id).to_string()
            },
            Self::ValidationError(details) => {
                t!("validation.failed", locale = &locale, details = details).to_string()
            },
            Self::InvalidInput(msg) => msg.clone(),
            Self::InternalError(msg) => {
                t!("internal.error", locale = &locale, message = msg).to_string()
            },
            Self::LoadError(msg) => t!("data.load_failed", locale = &locale, message = msg).to_string(),
            Self::Database(err) => {
                t!("database.error", locale = &locale, error = err.to_string()).to_string()
            },
            Self::Other(err) => {
                t!("internal.error", locale = &locale, message = err.to_string()).to_string()
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let message = self.localized_message();

        let status = match code {
            1001..=1999 => StatusCode::UNAUTHORIZED,
            2001..=2999 => StatusCode::BAD_REQUEST,
            3000..=3999 => StatusCode::NOT_FOUND,
            4001..=4999 => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
        }

        let details = match &self {
            Self::ColumnNotFound { column } => Some(serde_json::json!({ "column": column })),
            _ => None,
        };

        let response = ApiErrorResponse { code, message, details };

        (status, Json(response)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal_error(format!("JSON serialization error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
