//! Client-side session lifecycle for keygate.
//!
//! This crate provides:
//!
//! - **Session Clock**: once-per-second countdown of the access token's
//!   remaining validity with an exactly-once expiry callback
//! - **Auth Session Manager**: the login, refresh, logout, and expiry state
//!   machine holding the current credential bundle
//! - **Token Endpoint**: refresh, logout, and userinfo calls against the
//!   identity provider
//! - **Authorization Flow**: the OpenID-Connect authorization-code login

pub mod authorization;
pub mod clock;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod manager;

pub use authorization::{AuthorizationFlow, OidcClient, PendingAuthorization};
pub use clock::{CancelHandle, SessionClock};
pub use endpoint::{KeycloakTokenEndpoint, TokenEndpoint};
pub use error::SessionError;
pub use event::{LogoutReason, SessionEvent};
pub use manager::{AuthSessionManager, SessionSettings, SessionState};
