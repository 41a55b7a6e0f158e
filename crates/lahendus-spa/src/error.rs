//! Error types for the SPA framework.
//!
//! Structural errors (a slot that is missing from the document, an unknown
//! template) indicate wiring bugs and are propagated up the component tree.
//! Fetch errors carry enough information for pages to decide whether the
//! failure was already handled.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A specialized `Result` type for SPA framework operations.
pub type Result<T> = std::result::Result<T, SpaError>;

/// Errors that can occur while building components and pages.
#[derive(Debug, thiserror::Error)]
pub enum SpaError {
    // ========================================================================
    // Document Errors
    // ========================================================================
    /// An element was looked up by id and is not present in the document.
    #[error("Element not found: '{0}'")]
    ElementNotFound(String),

    /// A component's destination slot was missing at paint time.
    ///
    /// `trace` lists the slot ids from the root component down to the
    /// failing one, joined with `" > "`.
    #[error("Couldn't find destination '{id}' when painting component\n  Trace: {trace}")]
    DestinationNotFound {
        /// The missing slot id.
        id: String,
        /// Ancestor chain of slot ids.
        trace: String,
    },

    /// A simulated user event targeted an element without a listener.
    #[error("No {event} listener on element '{id}'")]
    NoListener {
        /// Element id.
        id: String,
        /// Event kind ("click" or "input").
        event: &'static str,
    },

    // ========================================================================
    // Template Errors
    // ========================================================================
    /// No template is registered under the requested name.
    #[error("Template not found: '{0}'")]
    TemplateNotFound(String),

    /// A template was rendered with values it could not use.
    #[error("Failed to render template '{name}': {message}")]
    Template {
        /// Template name.
        name: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// A network request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Page state or payload (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A page-level precondition failed (e.g. wrong role).
    #[error("{0}")]
    Page(String),
}

impl SpaError {
    /// Creates a new `Template` error.
    #[must_use]
    pub fn template(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error was caused by an aborted fetch.
    ///
    /// Aborted fetches belong to a page that has been navigated away from,
    /// so their failures must not paint anything.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Fetch(FetchError::Aborted))
    }

    /// Returns `true` if a registered error handler already dealt with this error.
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Fetch(FetchError::Handled { .. }))
    }

    /// Returns `true` if this error indicates broken slot or template wiring.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound(_)
                | Self::DestinationNotFound { .. }
                | Self::TemplateNotFound(_)
                | Self::Template { .. }
        )
    }
}

/// Structured error body returned by the backend for non-success responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code, if the backend provided one.
    #[serde(default)]
    pub code: Option<String>,
    /// Additional attributes describing the error.
    #[serde(default)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
    /// Human-readable message intended for logs.
    #[serde(default)]
    pub log_msg: Option<String>,
}

/// Errors produced by the fetch boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The request was aborted before it completed.
    #[error("Request aborted")]
    Aborted,

    /// The transport failed to deliver the request.
    #[error("Network error: {0}")]
    Network(String),

    /// The response matched a registered error handler, which has run.
    #[error("Request failed with handled error code '{code}'")]
    Handled {
        /// The handled error code.
        code: String,
    },

    /// The response did not satisfy the success predicate.
    #[error("Request failed with status {status}{}", DisplayCode(.body))]
    Unsuccessful {
        /// HTTP status code.
        status: u16,
        /// Parsed error body, if the response carried one.
        body: Option<ErrorBody>,
    },

    /// The response body could not be parsed into the expected type.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

struct DisplayCode<'a>(&'a Option<ErrorBody>);

impl fmt::Display for DisplayCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref().and_then(|b| b.code.as_deref()) {
            Some(code) => write!(f, " ({code})"),
            None => Ok(()),
        }
    }
}
