/// Unified error types for the share server
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Startup and infrastructure errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// OIDC setup errors
    #[error("OIDC setup failed: {0}")]
    Oidc(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for startup operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced to HTTP callers.
///
/// Every variant maps to one stable machine-readable code. Infrastructure
/// variants carry their source for logging only; the response body gets a
/// fixed message.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid json")]
    BadJson,

    #[error("schema is required")]
    MissingSchema,

    #[error("schema must start with EDS... or TXT...")]
    InvalidSchema,

    #[error("schema or name is required")]
    MissingUpdate,

    #[error("name is required")]
    MissingName,

    #[error("token is required")]
    MissingToken,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("server password required")]
    PasswordRequired,

    #[error("invalid server password")]
    InvalidPassword,

    #[error("unauthorized")]
    Unauthorized,

    #[error("oidc not enabled")]
    OidcNotEnabled,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{message}")]
    DbRead {
        message: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{message}")]
    DbInsert {
        message: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{message}")]
    DbUpdate {
        message: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{message}")]
    DbDelete {
        message: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("store unavailable")]
    Unhealthy,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadJson => "bad_json",
            ApiError::MissingSchema => "missing_schema",
            ApiError::InvalidSchema => "invalid_schema",
            ApiError::MissingUpdate => "missing_update",
            ApiError::MissingName => "missing_name",
            ApiError::MissingToken => "missing_token",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::PasswordRequired => "password_required",
            ApiError::InvalidPassword => "invalid_password",
            ApiError::Unauthorized => "unauthorized",
            ApiError::OidcNotEnabled => "oidc_not_enabled",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::DbRead { .. } => "db_read_failed",
            ApiError::DbInsert { .. } => "db_insert_failed",
            ApiError::DbUpdate { .. } => "db_update_failed",
            ApiError::DbDelete { .. } => "db_delete_failed",
            ApiError::Unhealthy => "unhealthy",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadJson
            | ApiError::MissingSchema
            | ApiError::InvalidSchema
            | ApiError::MissingUpdate
            | ApiError::MissingName
            | ApiError::MissingToken => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::PasswordRequired
            | ApiError::InvalidPassword
            | ApiError::Unauthorized
            | ApiError::OidcNotEnabled => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::DbRead { .. }
            | ApiError::DbInsert { .. }
            | ApiError::DbUpdate { .. }
            | ApiError::DbDelete { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Map a failed read. Store not-found becomes a 404.
    pub fn read(message: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| match source {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            source => ApiError::DbRead { message, source },
        }
    }

    pub fn insert(message: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| match source {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            source => ApiError::DbInsert { message, source },
        }
    }

    pub fn update(message: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| match source {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Invalid(_) => ApiError::MissingUpdate,
            source => ApiError::DbUpdate { message, source },
        }
    }

    pub fn delete(message: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| match source {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            source => ApiError::DbDelete { message, source },
        }
    }
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match std::error::Error::source(&self) {
                Some(source) => tracing::error!(code = self.code(), error = %source, "{}", self),
                None => tracing::error!(code = self.code(), "{}", self),
            }
        }

        let body = Json(ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for request handlers
pub type ApiResult<T> = Result<T, ApiError>;
