//! Console error types.

use keygate_directory::DirectoryError;
use keygate_session::SessionError;
use rootcause::prelude::Report;
use std::fmt;
use tracing::debug;

/// Errors shown to the console user.
#[derive(Debug)]
pub enum ConsoleError {
    /// Configuration is missing or invalid.
    Config { details: String },
    /// Reading from or writing to the terminal failed.
    Terminal { details: String },
    /// A session operation failed.
    Session(SessionError),
    /// A directory operation failed.
    Directory(DirectoryError),
    /// The user supplied something unusable.
    Input { details: String },
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::Terminal { details } => write!(f, "terminal error: {details}"),
            Self::Session(err) => write!(f, "{err}"),
            Self::Directory(err) => write!(f, "{err}"),
            Self::Input { details } => write!(f, "invalid input: {details}"),
        }
    }
}

impl std::error::Error for ConsoleError {}

impl From<std::io::Error> for ConsoleError {
    fn from(err: std::io::Error) -> Self {
        Self::Terminal {
            details: err.to_string(),
        }
    }
}

/// Lifts a session report into a console error, logging the full report.
pub fn session(report: Report<SessionError>) -> ConsoleError {
    debug!(error = ?report, "session operation failed");
    ConsoleError::Session(report.current_context().clone())
}

/// Lifts a directory report into a console error, logging the full report.
pub fn directory(report: Report<DirectoryError>) -> ConsoleError {
    debug!(error = ?report, "directory operation failed");
    ConsoleError::Directory(report.current_context().clone())
}
