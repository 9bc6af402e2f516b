//! Directory error types.

use std::fmt;

/// Errors from admin directory operations.
///
/// All of them are recoverable: the caller shows the detail and offers a
/// retry. Nothing is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// A read answered with a non-success status or an unreadable body.
    DirectoryUnavailable {
        /// HTTP status returned by the directory.
        status: u16,
        /// Server-provided detail, if any.
        details: String,
    },
    /// Enabling an account was rejected; the account is unchanged.
    ApprovalFailed {
        /// HTTP status returned by the directory.
        status: u16,
        /// Server-provided detail, if any.
        details: String,
    },
    /// The request did not complete.
    NetworkFailure {
        /// Error details.
        details: String,
    },
    /// The client-credentials grant for the admin token failed.
    AdminTokenFailed {
        /// Error details.
        details: String,
    },
    /// A registration step failed.
    RegistrationFailed {
        /// The step that failed.
        step: &'static str,
        /// HTTP status, when the failure was a response.
        status: Option<u16>,
        /// Server-provided detail, if any.
        details: String,
    },
    /// The requested record does not exist.
    NotFound {
        /// Kind of record.
        resource: &'static str,
        /// The identifier that was looked up.
        id: String,
    },
    /// The configured admin endpoint is not a usable base URL.
    InvalidEndpoint {
        /// The offending URL.
        url: String,
    },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectoryUnavailable { status, details } => {
                write!(f, "directory unavailable (status {status}): {details}")
            }
            Self::ApprovalFailed { status, details } => {
                write!(f, "approval failed (status {status}): {details}")
            }
            Self::NetworkFailure { details } => write!(f, "network failure: {details}"),
            Self::AdminTokenFailed { details } => {
                write!(f, "failed to obtain admin token: {details}")
            }
            Self::RegistrationFailed {
                step,
                status: Some(status),
                details,
            } => write!(f, "registration failed at {step} (status {status}): {details}"),
            Self::RegistrationFailed {
                step,
                status: None,
                details,
            } => write!(f, "registration failed at {step}: {details}"),
            Self::NotFound { resource, id } => write!(f, "{resource} not found: {id}"),
            Self::InvalidEndpoint { url } => write!(f, "invalid admin endpoint: {url}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkFailure {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_failure_mentions_step_and_status() {
        let err = DirectoryError::RegistrationFailed {
            step: "assign client role",
            status: Some(403),
            details: "forbidden".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "registration failed at assign client role (status 403): forbidden"
        );
    }

    #[test]
    fn registration_failure_without_status() {
        let err = DirectoryError::RegistrationFailed {
            step: "create user",
            status: None,
            details: "no id returned".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "registration failed at create user: no id returned"
        );
    }
}
