//! Error types for OnLeads.
//!
//! Library crates use [`OnLeadsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::LeadId;

/// Top-level error type for all OnLeads operations.
#[derive(Debug, thiserror::Error)]
pub enum OnLeadsError {
    /// Malformed URL, lead id, or prompt. Raised before any I/O happens.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Network failure, timeout, or non-2xx response while fetching a page.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Page content could not be read as text.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The text-generation capability failed or returned nothing usable.
    #[error("generation error: {0}")]
    Generation(String),

    /// CRM store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No lead with the given id exists in the store.
    #[error("lead {0} not found")]
    LeadNotFound(LeadId),

    /// The lead already has a first-contact draft.
    #[error("first contact email already exists for lead {0}")]
    AlreadyDrafted(LeadId),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OnLeadsError>;

impl OnLeadsError {
    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures raised at the extraction boundary (fetch or parse).
    pub fn is_extraction(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Parse { .. })
    }
}

/// Failures at the CRM boundary, independent of the backend's transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The addressed record or database does not exist.
    #[error("store record not found: {0}")]
    NotFound(String),

    /// The backend asked us to slow down.
    #[error("store rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The backend rejected the payload, or returned a record that does not
    /// match the expected schema.
    #[error("store schema violation: {0}")]
    SchemaViolation(String),

    /// Transport failure, auth failure, or server-side error.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
