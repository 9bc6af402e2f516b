//! Command-line interface.

use crate::error::ConsoleError;
use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command};
use keygate_core::DirectoryUserId;
use keygate_directory::NewAccount;
use secrecy::SecretString;
use std::path::PathBuf;

/// What the user asked the console to do.
#[derive(Debug)]
pub enum Action {
    /// Log in and open the interactive session screen.
    Login,
    /// List accounts awaiting approval.
    Pending,
    /// Enable an account.
    Approve { user_id: DirectoryUserId },
    /// Register a new account.
    Register { account: NewAccount },
}

/// Parsed invocation.
#[derive(Debug)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub action: Action,
}

pub fn new() -> Command {
    Command::new("keygate")
        .about("Keycloak session and account administration")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a configuration file (TOML)")
                .env("KEYGATE_CONFIG")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand(Command::new("login").about("Log in and manage the session interactively"))
        .subcommand(Command::new("pending").about("List accounts awaiting approval"))
        .subcommand(
            Command::new("approve").about("Enable an account").arg(
                Arg::new("user-id")
                    .help("Directory id of the account")
                    .required(true),
            ),
        )
        .subcommand(
            Command::new("register")
                .about("Register a new account")
                .arg(
                    Arg::new("phone")
                        .long("phone")
                        .help("Phone number, used as the username")
                        .required(true),
                )
                .arg(
                    Arg::new("first-name")
                        .long("first-name")
                        .help("First name")
                        .required(true),
                )
                .arg(
                    Arg::new("last-name")
                        .long("last-name")
                        .help("Last name")
                        .required(true),
                )
                .arg(
                    Arg::new("password")
                        .long("password")
                        .help("Initial password")
                        .env("KEYGATE_REGISTER_PASSWORD")
                        .hide_env_values(true),
                )
                .arg(
                    Arg::new("role")
                        .long("role")
                        .help("Client role to grant (defaults to the configured user role)"),
                )
                .arg(
                    Arg::new("group")
                        .long("group")
                        .help("Group to join after creation"),
                )
                .arg(
                    Arg::new("enabled")
                        .long("enabled")
                        .help("Create the account enabled instead of awaiting approval")
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Maps parsed arguments to an [`Invocation`].
///
/// # Errors
///
/// Returns `Input` if an argument value is unusable.
pub fn handler(matches: &ArgMatches) -> Result<Invocation, ConsoleError> {
    let config = matches.get_one::<PathBuf>("config").cloned();
    let string = |m: &ArgMatches, name: &str| m.get_one::<String>(name).cloned();

    let action = match matches.subcommand() {
        Some(("login", _)) => Action::Login,
        Some(("pending", _)) => Action::Pending,
        Some(("approve", sub)) => {
            let raw = string(sub, "user-id").unwrap_or_default();
            let user_id = raw.parse().map_err(|e| ConsoleError::Input {
                details: format!("{e}"),
            })?;
            Action::Approve { user_id }
        }
        Some(("register", sub)) => {
            let mut account = NewAccount::new(
                string(sub, "phone").unwrap_or_default(),
                string(sub, "first-name").unwrap_or_default(),
                string(sub, "last-name").unwrap_or_default(),
            )
            .enabled(sub.get_flag("enabled"));
            if let Some(password) = string(sub, "password") {
                account = account.with_password(SecretString::from(password));
            }
            if let Some(role) = string(sub, "role") {
                account = account.with_client_role(role);
            }
            if let Some(group) = string(sub, "group") {
                account = account.join_group(group);
            }
            Action::Register { account }
        }
        _ => {
            return Err(ConsoleError::Input {
                details: "missing subcommand".to_string(),
            });
        }
    };

    Ok(Invocation { config, action })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation, ConsoleError> {
        let matches = new().try_get_matches_from(args).expect("arguments");
        handler(&matches)
    }

    #[test]
    fn command_is_well_formed() {
        new().debug_assert();
    }

    #[test]
    fn approve_takes_user_id() {
        let invocation = parse(&["keygate", "approve", "5b1d0c1e"]).expect("invocation");
        match invocation.action {
            Action::Approve { user_id } => assert_eq!(user_id.as_str(), "5b1d0c1e"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn approve_rejects_path_like_id() {
        assert!(matches!(
            parse(&["keygate", "approve", "../x"]),
            Err(ConsoleError::Input { .. })
        ));
    }

    #[test]
    fn register_collects_account() {
        let invocation = parse(&[
            "keygate",
            "--config",
            "keygate.toml",
            "register",
            "--phone",
            "9876543210",
            "--first-name",
            "Asha",
            "--last-name",
            "Rao",
            "--group",
            "Guest",
        ])
        .expect("invocation");

        assert_eq!(invocation.config, Some(PathBuf::from("keygate.toml")));
        match invocation.action {
            Action::Register { account } => {
                assert_eq!(account.phone_number, "9876543210");
                assert_eq!(account.group.as_deref(), Some("Guest"));
                assert!(!account.enabled);
                assert!(account.client_role.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn subcommand_is_required() {
        assert!(new().try_get_matches_from(["keygate"]).is_err());
    }
}
