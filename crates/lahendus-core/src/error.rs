//! Error types for the Lahendus backend.
//!
//! Request errors carry an optional machine-readable [`ReqError`] code and
//! string attributes. They are rendered as `{ "code", "attrs", "log_msg" }`
//! so that the UI can dispatch on the code.

use std::fmt;
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

/// A specialized `Result` type for backend operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Machine-readable request error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReqError {
    /// A path, query or body parameter has an unacceptable value.
    InvalidParameterValue,
    /// The caller's role may not use this endpoint.
    RoleNotAllowed,
    /// The caller has no access to the requested course.
    NoCourseAccess,
}

impl ReqError {
    /// The code as sent to clients.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameterValue => "INVALID_PARAMETER_VALUE",
            Self::RoleNotAllowed => "ROLE_NOT_ALLOWED",
            Self::NoCourseAccess => "NO_COURSE_ACCESS",
        }
    }
}

impl fmt::Display for ReqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while serving requests or starting the server.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The request is malformed or refers to something invalid.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description for logs.
        message: String,
        /// Error code for clients.
        code: Option<ReqError>,
        /// Extra details, such as the offending field.
        attrs: Vec<(String, String)>,
    },

    /// The caller is identified but not allowed to do this.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description for logs.
        message: String,
        /// Error code for clients.
        code: Option<ReqError>,
        /// Extra details.
        attrs: Vec<(String, String)>,
    },

    /// The caller could not be identified.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Why identification failed.
        message: String,
    },

    /// The requested entity does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked for.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your lahendus.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>, code: Option<ReqError>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            code,
            attrs: Vec::new(),
        }
    }

    /// Creates an `InvalidRequest` error for a parameter with an unacceptable value.
    #[must_use]
    pub fn invalid_parameter(name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        Self::InvalidRequest {
            message: format!("Invalid value '{value}' for parameter '{name}'"),
            code: Some(ReqError::InvalidParameterValue),
            attrs: vec![("parameter".to_string(), name), ("value".to_string(), value)],
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>, code: Option<ReqError>) -> Self {
        Self::Forbidden {
            message: message.into(),
            code,
            attrs: Vec::new(),
        }
    }

    /// Creates a `Forbidden` error for a caller without access to a course.
    #[must_use]
    pub fn no_course_access(caller: &str, course_id: i64) -> Self {
        Self::Forbidden {
            message: format!("User {caller} does not have access to course {course_id}"),
            code: Some(ReqError::NoCourseAccess),
            attrs: vec![("id".to_string(), course_id.to_string())],
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// The request error code, if any.
    #[must_use]
    pub const fn code(&self) -> Option<ReqError> {
        match self {
            Self::InvalidRequest { code, .. } | Self::Forbidden { code, .. } => *code,
            _ => None,
        }
    }

    /// HTTP status this error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::Database(_)
            | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn attrs(&self) -> Map<String, Value> {
        match self {
            Self::InvalidRequest { attrs, .. } | Self::Forbidden { attrs, .. } => attrs
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
            _ => Map::new(),
        }
    }
}

/// Body of an error response.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    code: Option<ReqError>,
    attrs: Map<String, Value>,
    log_msg: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = Json(ErrorResponse {
            code: self.code(),
            attrs: self.attrs(),
            log_msg: self.to_string(),
        });
        (status, body).into_response()
    }
}
