//! Session lifecycle state machine.
//!
//! ```text
//!                 login                refresh
//! Unauthenticated ─────► Authenticated ───────► Refreshing
//!        ▲                 │    ▲                  │
//!        │                 │    └──── success ─────┤
//!        │                 │          or failure   │
//!        │   logout/expiry ▼                       │ rejected refresh token
//!        └─── login ─── LoggedOut ◄────────────────┘
//! ```
//!
//! Network calls are made without holding the state lock. A result that
//! arrives after its session ended (logout or expiry won the race) is
//! discarded rather than reinstalled.

use crate::authorization::AuthorizationFlow;
use crate::clock::SessionClock;
use crate::endpoint::TokenEndpoint;
use crate::error::SessionError;
use crate::event::{LogoutReason, SessionEvent};
use chrono::Utc;
use keygate_identity::{CredentialBundle, KeycloakConfig, Role, RolePolicy};
use rootcause::prelude::Report;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, instrument, warn};

const EVENT_CAPACITY: usize = 16;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No credentials have been installed yet.
    Unauthenticated,
    /// Credentials are installed and the countdown is running.
    Authenticated,
    /// A refresh request is in flight; the previous credentials stay usable.
    Refreshing,
    /// The session ended and its credentials were cleared.
    LoggedOut,
}

impl SessionState {
    /// Returns a lowercase description for messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
            Self::LoggedOut => "logged out",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for an [`AuthSessionManager`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Client whose roles gate the application.
    pub client_id: String,
    /// Role precedence.
    pub policy: RolePolicy,
    /// Current Unix time in seconds.
    pub now: fn() -> i64,
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

impl SessionSettings {
    /// Creates settings using the wall clock.
    #[must_use]
    pub fn new(client_id: impl Into<String>, policy: RolePolicy) -> Self {
        Self {
            client_id: client_id.into(),
            policy,
            now: unix_now,
        }
    }

    /// Creates settings from the identity-provider configuration.
    #[must_use]
    pub fn from_config(config: &KeycloakConfig) -> Self {
        Self::new(config.client_id(), RolePolicy::from_config(config))
    }
}

struct ActiveSession {
    epoch: u64,
    bundle: CredentialBundle,
    role: Role,
}

enum Slot {
    Unauthenticated,
    Authenticated(ActiveSession),
    Refreshing(ActiveSession),
    LoggedOut,
}

impl Slot {
    fn state(&self) -> SessionState {
        match self {
            Self::Unauthenticated => SessionState::Unauthenticated,
            Self::Authenticated(_) => SessionState::Authenticated,
            Self::Refreshing(_) => SessionState::Refreshing,
            Self::LoggedOut => SessionState::LoggedOut,
        }
    }

    fn active(&self) -> Option<&ActiveSession> {
        match self {
            Self::Authenticated(active) | Self::Refreshing(active) => Some(active),
            Self::Unauthenticated | Self::LoggedOut => None,
        }
    }
}

struct Inner {
    settings: SessionSettings,
    endpoint: Arc<dyn TokenEndpoint>,
    authorization: Arc<dyn AuthorizationFlow>,
    slot: Mutex<Slot>,
    clock: SessionClock,
    events: broadcast::Sender<SessionEvent>,
    epochs: AtomicU64,
}

/// Holds the current credentials and drives login, refresh, and logout.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct AuthSessionManager {
    inner: Arc<Inner>,
}

impl AuthSessionManager {
    /// Creates a manager in the `Unauthenticated` state.
    #[must_use]
    pub fn new(
        settings: SessionSettings,
        endpoint: Arc<dyn TokenEndpoint>,
        authorization: Arc<dyn AuthorizationFlow>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                settings,
                endpoint,
                authorization,
                slot: Mutex::new(Slot::Unauthenticated),
                clock: SessionClock::new(),
                events,
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Runs the external authorization flow and installs its credentials.
    ///
    /// Valid from `Unauthenticated` and `LoggedOut`. The countdown starts
    /// from the access token's `exp` claim.
    ///
    /// # Errors
    ///
    /// Returns the authorization flow's error, `MalformedToken` if the
    /// issued access token cannot be decoded, or `InvalidState` when a
    /// session is already active.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<Role, Report<SessionError>> {
        {
            let slot = self.inner.slot.lock().await;
            ensure_can_login(&slot)?;
        }

        let response = self.inner.authorization.authorize().await?;
        let now = (self.inner.settings.now)();
        let bundle = response
            .into_bundle(None, now)
            .map_err(SessionError::from)?;
        let countdown = bundle.claims().seconds_until_expiry(now);
        let role = self.resolve(&bundle);
        let epoch = self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;

        let mut slot = self.inner.slot.lock().await;
        ensure_can_login(&slot)?;
        *slot = Slot::Authenticated(ActiveSession {
            epoch,
            bundle,
            role,
        });
        self.inner
            .clock
            .start(countdown, expiry_hook(Arc::downgrade(&self.inner), epoch));
        drop(slot);

        info!(%role, countdown, "session established");
        self.publish(SessionEvent::CredentialsReplaced {
            role,
            expires_in: countdown,
        });
        Ok(role)
    }

    /// Exchanges the refresh token for new credentials.
    ///
    /// Valid only from `Authenticated`. On success the bundle is replaced and
    /// the countdown restarts from the reported `expires_in`. A rejected
    /// refresh token ends the session the same way expiry does. Any other
    /// failure leaves the previous credentials installed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` outside `Authenticated`, `SessionEnded` if the
    /// session ended while the request was in flight, or the endpoint's
    /// error.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Role, Report<SessionError>> {
        let (epoch, refresh_token) = {
            let mut slot = self.inner.slot.lock().await;
            let active = match std::mem::replace(&mut *slot, Slot::Unauthenticated) {
                Slot::Authenticated(active) => active,
                other => {
                    let state = other.state();
                    *slot = other;
                    return Err(SessionError::InvalidState {
                        operation: "refresh",
                        state: state.as_str(),
                    }
                    .into());
                }
            };
            let refresh_token =
                SecretString::from(active.bundle.refresh_token().expose_secret().to_string());
            let epoch = active.epoch;
            *slot = Slot::Refreshing(active);
            (epoch, refresh_token)
        };

        let outcome = self.inner.endpoint.refresh(&refresh_token).await;

        let mut slot = self.inner.slot.lock().await;
        let active = match std::mem::replace(&mut *slot, Slot::Unauthenticated) {
            Slot::Refreshing(active) if active.epoch == epoch => active,
            other => {
                *slot = other;
                debug!("refresh completed after its session ended; result discarded");
                return Err(SessionError::SessionEnded.into());
            }
        };

        let response = match outcome {
            Ok(response) => response,
            Err(report) => {
                *slot = Slot::Authenticated(active);
                drop(slot);
                if matches!(report.current_context(), SessionError::RefreshDenied { .. }) {
                    warn!("refresh token rejected; ending session");
                    if let Err(e) = self.end_session(Some(epoch), LogoutReason::RefreshDenied).await
                    {
                        debug!(error = %e, "session already ended");
                    }
                } else {
                    warn!(error = %report, "token refresh failed; keeping current credentials");
                    self.publish(SessionEvent::RefreshFailed {
                        reason: report.current_context().to_string(),
                    });
                }
                return Err(report);
            }
        };

        let now = (self.inner.settings.now)();
        match response.into_bundle(Some(active.bundle.refresh_token()), now) {
            Ok(bundle) => {
                let expires_in = bundle.expires_in();
                let role = self.resolve(&bundle);
                // A countdown of the replaced bundle that already fired must
                // not end this one.
                let epoch = self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;
                *slot = Slot::Authenticated(ActiveSession {
                    epoch,
                    bundle,
                    role,
                });
                self.inner
                    .clock
                    .start(expires_in, expiry_hook(Arc::downgrade(&self.inner), epoch));
                drop(slot);

                info!(%role, expires_in, "credentials refreshed");
                self.publish(SessionEvent::CredentialsReplaced { role, expires_in });
                Ok(role)
            }
            Err(err) => {
                *slot = Slot::Authenticated(active);
                drop(slot);

                let err = SessionError::from(err);
                warn!(error = %err, "refreshed token rejected; keeping current credentials");
                self.publish(SessionEvent::RefreshFailed {
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Ends the session.
    ///
    /// The provider-side logout is best effort: its failure is logged and
    /// the local session is cleared regardless.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the session already ended.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), Report<SessionError>> {
        self.end_session(None, LogoutReason::UserRequested).await
    }

    /// Returns a logged-out manager to `Unauthenticated`.
    pub async fn reset(&self) {
        let mut slot = self.inner.slot.lock().await;
        if matches!(*slot, Slot::LoggedOut) {
            *slot = Slot::Unauthenticated;
        }
    }

    /// Fetches the userinfo document for the current session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` without an active session, or the endpoint's
    /// error.
    pub async fn user_profile(&self) -> Result<serde_json::Value, Report<SessionError>> {
        let access_token = self.access_token().await.ok_or_else(|| {
            Report::from(SessionError::InvalidState {
                operation: "fetch the user profile",
                state: "not authenticated",
            })
        })?;
        self.inner.endpoint.user_info(&access_token).await
    }

    /// Returns the current state.
    pub async fn state(&self) -> SessionState {
        self.inner.slot.lock().await.state()
    }

    /// Returns the role resolved from the current credentials.
    pub async fn role(&self) -> Option<Role> {
        self.inner.slot.lock().await.active().map(|active| active.role)
    }

    /// Returns the raw client-role names held within the configured client.
    pub async fn client_roles(&self) -> Vec<String> {
        let client_id = &self.inner.settings.client_id;
        self.inner
            .slot
            .lock()
            .await
            .active()
            .map(|active| active.bundle.claims().client_roles(client_id).to_vec())
            .unwrap_or_default()
    }

    /// Returns a copy of the current access token.
    pub async fn access_token(&self) -> Option<SecretString> {
        self.inner.slot.lock().await.active().map(|active| {
            SecretString::from(active.bundle.access_token().expose_secret().to_string())
        })
    }

    /// Returns the seconds left on the countdown.
    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        self.inner.clock.remaining()
    }

    /// Subscribes to countdown updates.
    #[must_use]
    pub fn countdown(&self) -> watch::Receiver<u64> {
        self.inner.clock.subscribe()
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn resolve(&self, bundle: &CredentialBundle) -> Role {
        self.inner
            .settings
            .policy
            .resolve_role(bundle.claims(), &self.inner.settings.client_id)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Clears the session. With `expected_epoch`, only that session is ended.
    async fn end_session(
        &self,
        expected_epoch: Option<u64>,
        reason: LogoutReason,
    ) -> Result<(), Report<SessionError>> {
        let previous = {
            let mut slot = self.inner.slot.lock().await;
            if matches!(*slot, Slot::LoggedOut) {
                return Err(SessionError::InvalidState {
                    operation: "log out",
                    state: SessionState::LoggedOut.as_str(),
                }
                .into());
            }
            if let Some(expected) = expected_epoch
                && slot.active().map(|active| active.epoch) != Some(expected)
            {
                return Err(SessionError::SessionEnded.into());
            }
            self.inner.clock.cancel();
            std::mem::replace(&mut *slot, Slot::LoggedOut)
        };

        if let Slot::Authenticated(active) | Slot::Refreshing(active) = previous {
            if let Err(e) = self
                .inner
                .endpoint
                .logout(active.bundle.refresh_token())
                .await
            {
                warn!(error = %e, "provider logout failed; local session cleared anyway");
            }
        }

        info!(?reason, "session ended");
        self.publish(SessionEvent::LoggedOut { reason });
        Ok(())
    }
}

fn ensure_can_login(slot: &Slot) -> Result<(), Report<SessionError>> {
    match slot {
        Slot::Unauthenticated | Slot::LoggedOut => Ok(()),
        other => Err(SessionError::InvalidState {
            operation: "log in",
            state: other.state().as_str(),
        }
        .into()),
    }
}

/// Ends session `epoch` when its countdown reaches zero.
///
/// Holds the manager weakly so a dropped manager is not kept alive by its
/// own timer.
fn expiry_hook(inner: Weak<Inner>, epoch: u64) -> impl Fn() + Send + Sync + 'static {
    move || {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let manager = AuthSessionManager { inner };
        tokio::spawn(async move {
            if let Err(e) = manager.end_session(Some(epoch), LogoutReason::Expired).await {
                debug!(error = %e, "expired session was already gone");
            }
        });
    }
}
