//! Interactive session screen.
//!
//! Reads commands from stdin while reacting to session events and the
//! expiry countdown. Views that need a role are refused when the session
//! does not hold it.

use crate::admin;
use crate::error::{self, ConsoleError};
use crate::prompt::{ConsoleAuthorization, SharedInput};
use keygate_core::DirectoryUserId;
use keygate_directory::DirectoryClient;
use keygate_identity::{KeycloakConfig, Role};
use keygate_session::{
    AuthSessionManager, KeycloakTokenEndpoint, LogoutReason, OidcClient, SessionError,
    SessionEvent, SessionSettings, SessionState,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

const HELP: &str = "\
Commands:
  status        session state and time left
  role          your application role
  refresh       renew the access token
  profile       your identity-provider profile (admin)
  permissions   client roles held (admin)
  pending       accounts awaiting approval (admin)
  approve <id>  enable an account (admin)
  login         sign in again after logging out
  logout        end the session
  quit          log out and exit";

/// A command typed at the session prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenCommand {
    Status,
    Role,
    Refresh,
    Profile,
    Permissions,
    Pending,
    Approve(DirectoryUserId),
    Login,
    Logout,
    Help,
    Quit,
}

impl ScreenCommand {
    /// Parses one input line. Blank lines yield `None`.
    ///
    /// # Errors
    ///
    /// Returns a message for unknown commands or bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let command = match name {
            "status" => Self::Status,
            "role" => Self::Role,
            "refresh" => Self::Refresh,
            "profile" => Self::Profile,
            "permissions" => Self::Permissions,
            "pending" => Self::Pending,
            "approve" => {
                let id = words
                    .next()
                    .ok_or_else(|| "usage: approve <user-id>".to_string())?;
                Self::Approve(id.parse().map_err(|e| format!("{e}"))?)
            }
            "login" => Self::Login,
            "logout" => Self::Logout,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command {other:?}; type `help`")),
        };
        Ok(Some(command))
    }

    /// Whether `role` may use this command.
    #[must_use]
    pub fn permitted(&self, role: Option<Role>) -> bool {
        match self {
            Self::Profile | Self::Permissions | Self::Pending | Self::Approve(_) => {
                role.is_some_and(|role| role.is_admin())
            }
            _ => true,
        }
    }
}

/// Whether the countdown value is worth announcing.
fn announce(remaining: u64) -> bool {
    remaining > 0 && (remaining <= 10 || remaining % 60 == 0)
}

enum Next {
    Line(Option<String>),
    Event(Result<SessionEvent, RecvError>),
    Tick(u64),
}

/// The interactive session screen.
pub struct SessionScreen {
    manager: AuthSessionManager,
    directory: Option<DirectoryClient>,
    input: SharedInput,
}

impl SessionScreen {
    /// Wires the screen to the configured identity provider.
    ///
    /// # Errors
    ///
    /// Returns an error if provider discovery or client construction fails.
    pub async fn open(
        config: &KeycloakConfig,
        input: SharedInput,
    ) -> keygate_core::Result<Self, ConsoleError> {
        let endpoint = KeycloakTokenEndpoint::new(config).map_err(error::session)?;
        let oidc = OidcClient::discover(config).await.map_err(error::session)?;
        let authorization = ConsoleAuthorization::new(oidc, Arc::clone(&input));

        let directory = match DirectoryClient::new(config) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "directory client unavailable; admin commands disabled");
                None
            }
        };

        let manager = AuthSessionManager::new(
            SessionSettings::from_config(config),
            Arc::new(endpoint),
            Arc::new(authorization),
        );

        Ok(Self {
            manager,
            directory,
            input,
        })
    }

    /// Logs in and runs the command loop until the user quits or stdin closes.
    ///
    /// # Errors
    ///
    /// Returns `Terminal` if stdin cannot be read.
    pub async fn run(self) -> keygate_core::Result<(), ConsoleError> {
        let mut events = self.manager.subscribe();
        let mut countdown = self.manager.countdown();

        self.login().await;

        loop {
            let next = {
                let mut input = self.input.lock().await;
                tokio::select! {
                    line = input.next_line() => Next::Line(line.map_err(ConsoleError::from)?),
                    event = events.recv() => Next::Event(event),
                    Ok(()) = countdown.changed() => Next::Tick(*countdown.borrow_and_update()),
                }
            };

            match next {
                Next::Line(None) => break,
                Next::Line(Some(line)) => match ScreenCommand::parse(&line) {
                    Ok(Some(ScreenCommand::Quit)) => break,
                    Ok(Some(command)) => self.execute(command).await,
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                },
                Next::Event(Ok(event)) => show_event(&event),
                Next::Event(Err(RecvError::Lagged(skipped))) => {
                    debug!(skipped, "session events skipped");
                }
                Next::Event(Err(RecvError::Closed)) => break,
                Next::Tick(remaining) if announce(remaining) => {
                    println!("Session expires in {remaining}s");
                }
                Next::Tick(_) => {}
            }
        }

        if matches!(
            self.manager.state().await,
            SessionState::Authenticated | SessionState::Refreshing
        ) {
            self.report(self.manager.logout().await.map(|_| ()));
        }
        Ok(())
    }

    async fn execute(&self, command: ScreenCommand) {
        let role = self.manager.role().await;
        if !command.permitted(role) {
            println!("That view requires the admin role.");
            return;
        }

        match command {
            ScreenCommand::Status => {
                let state = self.manager.state().await;
                match state {
                    SessionState::Authenticated | SessionState::Refreshing => println!(
                        "{state}; token expires in {}s",
                        self.manager.remaining_seconds()
                    ),
                    _ => println!("{state}"),
                }
            }
            ScreenCommand::Role => match role {
                Some(role) => println!("Role: {}", role.display_name()),
                None => println!("Not signed in."),
            },
            ScreenCommand::Refresh => self.report(self.manager.refresh().await.map(|_| ())),
            ScreenCommand::Profile => match self.manager.user_profile().await {
                Ok(profile) => match serde_json::to_string_pretty(&profile) {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("error: {e}"),
                },
                Err(report) => self.report(Err(report)),
            },
            ScreenCommand::Permissions => {
                let roles = self.manager.client_roles().await;
                if roles.is_empty() {
                    println!("No client roles.");
                }
                for name in roles {
                    println!("Role: {name}");
                }
            }
            ScreenCommand::Pending => {
                if let Some(directory) = self.directory_or_notice() {
                    print_outcome(admin::pending(directory).await);
                }
            }
            ScreenCommand::Approve(id) => {
                if let Some(directory) = self.directory_or_notice() {
                    print_outcome(admin::approve(directory, &id).await);
                }
            }
            ScreenCommand::Login => {
                self.manager.reset().await;
                self.login().await;
            }
            ScreenCommand::Logout => self.report(self.manager.logout().await),
            ScreenCommand::Help => println!("{HELP}"),
            ScreenCommand::Quit => {}
        }
    }

    async fn login(&self) {
        match self.manager.login().await {
            Ok(Role::Unassigned) => {
                println!("Signed in, but no application role is assigned to you.");
            }
            Ok(_) => {}
            Err(report) => {
                if matches!(
                    report.current_context(),
                    SessionError::MalformedToken { .. }
                ) {
                    println!("Warning: the issued token could not be read; role views are unavailable.");
                }
                self.report(Err(report));
            }
        }
    }

    fn directory_or_notice(&self) -> Option<&DirectoryClient> {
        if self.directory.is_none() {
            println!("The directory is not available.");
        }
        self.directory.as_ref()
    }

    fn report(&self, result: Result<(), rootcause::prelude::Report<SessionError>>) {
        if let Err(report) = result {
            println!("error: {}", error::session(report));
        }
    }
}

fn print_outcome(result: keygate_core::Result<(), ConsoleError>) {
    if let Err(report) = result {
        println!("error: {}", report.current_context());
    }
}

fn show_event(event: &SessionEvent) {
    match event {
        SessionEvent::CredentialsReplaced { role, expires_in } => {
            println!(
                "Signed in as {}; token valid for {expires_in}s.",
                role.display_name()
            );
        }
        SessionEvent::RefreshFailed { reason } => {
            println!("Refresh failed: {reason}. You are still signed in.");
        }
        SessionEvent::LoggedOut { reason } => match reason {
            LogoutReason::UserRequested => println!("Logged out."),
            LogoutReason::Expired => {
                println!("Session expired. Type `login` to sign in again.");
            }
            LogoutReason::RefreshDenied => {
                println!("The identity provider ended your session. Type `login` to sign in again.");
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(ScreenCommand::parse("  refresh "), Ok(Some(ScreenCommand::Refresh)));
        assert_eq!(ScreenCommand::parse(""), Ok(None));
        assert_eq!(
            ScreenCommand::parse("approve 5b1d0c1e"),
            Ok(Some(ScreenCommand::Approve(
                "5b1d0c1e".parse().expect("id")
            )))
        );
        assert!(ScreenCommand::parse("approve").is_err());
        assert!(ScreenCommand::parse("reboot").is_err());
    }

    #[test]
    fn admin_views_require_admin() {
        let admin_only = [
            ScreenCommand::Profile,
            ScreenCommand::Permissions,
            ScreenCommand::Pending,
        ];
        for command in admin_only {
            assert!(command.permitted(Some(Role::Admin)));
            assert!(!command.permitted(Some(Role::User)));
            assert!(!command.permitted(Some(Role::Unassigned)));
            assert!(!command.permitted(None));
        }
        assert!(ScreenCommand::Role.permitted(Some(Role::FieldAgent)));
        assert!(ScreenCommand::Status.permitted(None));
    }

    #[test]
    fn countdown_announcements() {
        assert!(announce(120));
        assert!(announce(10));
        assert!(announce(1));
        assert!(!announce(0));
        assert!(!announce(59));
    }
}
