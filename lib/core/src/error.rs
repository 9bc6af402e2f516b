//! Shared result type.
//!
//! Every keygate crate owns its error enum (`TokenError`, `SessionError`,
//! `DirectoryError`, `ConsoleError`). Fallible operations return those
//! contexts inside a rootcause `Report` so callers can match on
//! `current_context()` and still print the full chain.

use rootcause::Report;

/// `Result` whose error is a `Report` carrying context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
