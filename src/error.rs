//! Error types for the tracker and the Exposure Service client.

use thiserror::Error;

use crate::types::PortBinding;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// A call to the Exposure Service did not succeed.
///
/// Non-2xx replies, transport failures and timeouts all map here; the
/// tracker does not tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote API call failed: {message}")]
pub struct ApiError {
    /// HTTP status, if the service answered at all
    pub status: Option<u16>,
    /// Error text reported by the service, or the transport error
    pub message: String,
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// First failure of a batch, with the binding it happened on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Exposing a binding failed; it was not recorded.
    #[error("failed exposing {binding} calling API: {source}")]
    Expose {
        binding: PortBinding,
        #[source]
        source: ApiError,
    },

    /// Unexposing a binding failed; it was forgotten locally anyway.
    #[error("failed unexposing {binding} calling API: {source}")]
    Unexpose {
        binding: PortBinding,
        #[source]
        source: ApiError,
    },
}

impl TrackerError {
    /// Binding whose remote call failed
    pub fn binding(&self) -> &PortBinding {
        match self {
            TrackerError::Expose { binding, .. } | TrackerError::Unexpose { binding, .. } => binding,
        }
    }

    /// Underlying Exposure Service failure
    pub fn api_error(&self) -> &ApiError {
        match self {
            TrackerError::Expose { source, .. } | TrackerError::Unexpose { source, .. } => source,
        }
    }

    /// Every tracker error is a remote call failure today; kept as a
    /// predicate so callers don't match on message text.
    pub fn is_api_failure(&self) -> bool {
        matches!(
            self,
            TrackerError::Expose { .. } | TrackerError::Unexpose { .. }
        )
    }
}
