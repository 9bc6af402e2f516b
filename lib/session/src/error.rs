//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause. Every variant
//! is recoverable from the process's point of view: callers present it to
//! the user and carry on. `RefreshDenied` additionally ends the session.

use keygate_identity::TokenError;
use std::fmt;

/// Errors from session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The access token could not be decoded. Never retried.
    MalformedToken { reason: String },
    /// The request did not complete (connection refused, timeout, ...).
    NetworkFailure { details: String },
    /// The identity provider rejected the refresh token.
    RefreshDenied { details: String },
    /// The token endpoint answered a refresh with an unexpected status.
    RefreshFailed { status: u16, details: String },
    /// The operation is not valid in the current session state.
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    /// The external authorization flow did not produce credentials.
    AuthorizationFailed { details: String },
    /// The userinfo endpoint answered with a non-success status.
    ProfileUnavailable { status: u16, details: String },
    /// The session ended while the operation was in flight; its result was discarded.
    SessionEnded,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedToken { reason } => write!(f, "malformed token: {reason}"),
            Self::NetworkFailure { details } => write!(f, "network failure: {details}"),
            Self::RefreshDenied { details } => {
                write!(f, "refresh token rejected by identity provider: {details}")
            }
            Self::RefreshFailed { status, details } => {
                write!(f, "token refresh failed with status {status}: {details}")
            }
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while {state}")
            }
            Self::AuthorizationFailed { details } => {
                write!(f, "authorization failed: {details}")
            }
            Self::ProfileUnavailable { status, details } => {
                write!(f, "user profile unavailable (status {status}): {details}")
            }
            Self::SessionEnded => write!(f, "session ended before the operation completed"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed { reason } => Self::MalformedToken { reason },
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkFailure {
            details: err.to_string(),
        }
    }
}
