//! Notifications published by the session manager.

use keygate_identity::Role;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// The access token's countdown reached zero.
    Expired,
    /// The identity provider rejected the refresh token.
    RefreshDenied,
}

/// Session lifecycle notification.
///
/// Views subscribe once per session and redraw from these instead of
/// polling the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new credential bundle was installed (login or refresh).
    CredentialsReplaced { role: Role, expires_in: u64 },
    /// A refresh attempt failed; the previous credentials remain installed.
    RefreshFailed { reason: String },
    /// The session ended and its credentials were cleared.
    LoggedOut { reason: LogoutReason },
}
