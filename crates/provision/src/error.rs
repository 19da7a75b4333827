//! Error types for provisioning waits

use converge::{WaitError, WaitErrorKind};
use thiserror::Error;

/// Failure reported by a provider API client.
///
/// `message` is the provider's error text verbatim; some waits match on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("API error {status}: {message}")]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Error text as returned by the provider
    pub message: String,
}

impl ApiError {
    /// Create an API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// A provisioning wait failed.
///
/// The message names the resource kind and identifier, followed by the
/// engine's own description (which for timeouts includes the elapsed time).
#[derive(Error, Debug)]
#[error("{resource} {id}: {source}")]
pub struct ProvisionError {
    /// Resource kind, e.g. `"application"`
    pub resource: &'static str,
    /// Identifier the wait was keyed on
    pub id: String,
    /// Underlying engine failure
    #[source]
    pub source: WaitError,
}

impl ProvisionError {
    /// Wrap an engine failure
    pub fn wait(resource: &'static str, id: impl ToString, source: WaitError) -> Self {
        Self {
            resource,
            id: id.to_string(),
            source,
        }
    }

    /// Failure kind of the underlying wait
    #[must_use]
    pub fn kind(&self) -> WaitErrorKind {
        self.source.kind()
    }
}

/// Result type for provisioning waits
pub type ProvisionResult<T> = Result<T, ProvisionError>;
