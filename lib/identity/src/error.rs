//! Error types for the identity crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `TokenError`: An access token could not be decoded into claims
//! - `ConfigError`: Identity-provider configuration is incomplete or invalid

use std::fmt;

/// Errors from decoding an access token.
///
/// Decoding is display-only and never retried: a malformed token stays
/// malformed, so callers surface it instead of defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token is not a dot-separated JWT, its payload is not base64url,
    /// or the payload is not a claims document.
    Malformed { reason: String },
}

impl TokenError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed token: {reason}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Errors from validating identity-provider configuration.
///
/// These are raised at startup, never while serving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option is missing or blank.
    MissingField { field: &'static str },
    /// An option that must be a URL does not parse as one.
    InvalidUrl { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                write!(f, "missing required configuration option: {field}")
            }
            Self::InvalidUrl { field, reason } => {
                write!(f, "configuration option {field} is not a valid URL: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
