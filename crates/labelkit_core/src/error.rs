use std::fmt;

use thiserror::Error;

/// Failure classes surfaced to front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad credentials, expired or invalid token
    Authentication,
    /// Insufficient balance, purchase without a session
    Authorization,
    /// Transport-level failure or unavailable server
    Network,
    /// Malformed request parameters
    Validation,
    /// Local storage and other client-side faults
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Network => write!(f, "network"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("authentication required")]
    NotAuthenticated,

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Validation(String),

    #[error("credential storage error: {0}")]
    CredentialStorage(String),

    #[error("notification storage error: {0}")]
    NotificationStorage(String),

    #[error("invalid response from server: {0}")]
    InvalidServerResponse(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Authorization(_) | Self::NotAuthenticated => ErrorCategory::Authorization,
            Self::Network(_) | Self::InvalidServerResponse(_) => ErrorCategory::Network,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::CredentialStorage(_)
            | Self::NotificationStorage(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// True when the server rejected the bearer token
    pub fn is_rejected_credential(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
