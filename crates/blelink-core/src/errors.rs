//! Error types for the blelink core
//!
//! Two families live here. [`ErrorKind`] is plain data carried inside
//! `Error` lifecycle events: it classifies an asynchronous link failure that
//! has already forced a teardown. [`BlelinkError`] is the synchronous error
//! returned from API calls (bad payloads, bad identifiers, closed channels).

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Link Failure Classification
// ----------------------------------------------------------------------------

/// Classification of an asynchronous link failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connection establishment or transport failure
    LinkError,
    /// Configured service absent after discovery, or a service-level fault
    ServiceError,
    /// Configured characteristic absent or invalid after discovery
    CharacteristicError,
    /// Unclassified failure reported by the underlying stack
    UnknownError,
}

impl ErrorKind {
    /// Numeric code shown to users (`Device error #<code>`)
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::LinkError => 1,
            ErrorKind::ServiceError => 2,
            ErrorKind::CharacteristicError => 3,
            ErrorKind::UnknownError => 4,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::LinkError => write!(f, "link error"),
            ErrorKind::ServiceError => write!(f, "service error"),
            ErrorKind::CharacteristicError => write!(f, "characteristic error"),
            ErrorKind::UnknownError => write!(f, "unknown error"),
        }
    }
}

// ----------------------------------------------------------------------------
// API Errors
// ----------------------------------------------------------------------------

/// Errors returned synchronously by the blelink API
#[derive(Debug, thiserror::Error)]
pub enum BlelinkError {
    #[error("Payload too large: {size} bytes (max: {max_size})")]
    PayloadTooLarge { size: usize, max_size: usize },

    #[error("Invalid UUID '{value}': {reason}")]
    InvalidUuid { value: String, reason: String },

    #[error("Service and characteristic UUIDs are not configured")]
    TargetNotConfigured,

    #[error("Link task is not running")]
    TaskClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device scan failed: {0}")]
    ScanFailed(String),

    #[error("Link backend error: {0}")]
    Backend(String),
}

impl BlelinkError {
    /// Create an invalid UUID error
    pub fn invalid_uuid(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUuid {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for blelink operations
pub type Result<T> = core::result::Result<T, BlelinkError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
