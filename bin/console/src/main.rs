//! keygate console: sign in against Keycloak, watch the session, and
//! administer account approvals.

mod admin;
mod cli;
mod config;
mod error;
mod prompt;
mod screen;

use crate::cli::Action;
use crate::config::AppConfig;
use crate::error::ConsoleError;
use keygate_directory::DirectoryClient;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,keygate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli::new().get_matches();

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::debug!(error = ?report, "command failed");
            eprintln!("error: {}", report.current_context());
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &clap::ArgMatches) -> keygate_core::Result<(), ConsoleError> {
    let invocation = cli::handler(matches)?;

    let config = AppConfig::load(invocation.config.as_deref()).map_err(|e| {
        ConsoleError::Config {
            details: e.to_string(),
        }
    })?;
    config
        .keycloak
        .validate()
        .map_err(|e| ConsoleError::Config {
            details: e.to_string(),
        })?;
    tracing::info!(realm = config.keycloak.realm_name(), "loaded configuration");

    match invocation.action {
        Action::Login => {
            let screen = screen::SessionScreen::open(&config.keycloak, prompt::stdin_lines()).await?;
            screen.run().await
        }
        Action::Pending => admin::pending(&directory(&config)?).await,
        Action::Approve { user_id } => admin::approve(&directory(&config)?, &user_id).await,
        Action::Register { account } => admin::register(&directory(&config)?, &account).await,
    }
}

fn directory(config: &AppConfig) -> keygate_core::Result<DirectoryClient, ConsoleError> {
    Ok(DirectoryClient::new(&config.keycloak).map_err(error::directory)?)
}
