//! Terminal half of the authorization-code login.
//!
//! The user opens the authorization URL in a browser, signs in, and pastes
//! the URL the provider redirected to back into the terminal.

use async_trait::async_trait;
use keygate_identity::TokenResponse;
use keygate_session::{AuthorizationFlow, OidcClient, SessionError};
use reqwest::Url;
use rootcause::prelude::Report;
use std::sync::Arc;
use tokio::io::{BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::debug;

/// Line reader over stdin, shared by everything that prompts the user.
pub type SharedInput = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Creates the shared stdin reader.
pub fn stdin_lines() -> SharedInput {
    use tokio::io::AsyncBufReadExt;
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

/// Code and state carried by the provider's redirect.
#[derive(Debug, PartialEq, Eq)]
pub struct Redirect {
    pub code: String,
    pub state: String,
}

/// Extracts the authorization response from a pasted redirect URL.
///
/// # Errors
///
/// Returns `AuthorizationFailed` if the text is not a URL, the provider
/// reported an error, or `code`/`state` is missing.
pub fn parse_redirect(input: &str) -> Result<Redirect, SessionError> {
    let url = Url::parse(input.trim()).map_err(|e| SessionError::AuthorizationFailed {
        details: format!("not a redirect URL: {e}"),
    })?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        let details = match description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(SessionError::AuthorizationFailed { details });
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(Redirect { code, state }),
        _ => Err(SessionError::AuthorizationFailed {
            details: "redirect URL carries no code and state".to_string(),
        }),
    }
}

/// Authorization flow driven from the terminal.
pub struct ConsoleAuthorization {
    oidc: OidcClient,
    input: SharedInput,
}

impl ConsoleAuthorization {
    pub fn new(oidc: OidcClient, input: SharedInput) -> Self {
        Self { oidc, input }
    }
}

#[async_trait]
impl AuthorizationFlow for ConsoleAuthorization {
    async fn authorize(&self) -> Result<TokenResponse, Report<SessionError>> {
        let (url, pending) = self.oidc.authorization_url();
        println!("Open this URL in a browser and sign in:\n\n    {url}\n");
        println!("Then paste the URL you were redirected to:");

        let line = self
            .input
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| SessionError::AuthorizationFailed {
                details: format!("failed to read redirect: {e}"),
            })?
            .ok_or_else(|| SessionError::AuthorizationFailed {
                details: "input closed before the redirect was pasted".to_string(),
            })?;

        let redirect = parse_redirect(&line)?;
        debug!("authorization response received");
        self.oidc
            .exchange_code(&redirect.code, &redirect.state, &pending)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_custom_scheme_redirect() {
        let redirect =
            parse_redirect("com.example.app://oauth/callback?state=abc&code=xyz&session_state=1\n")
                .expect("redirect");
        assert_eq!(
            redirect,
            Redirect {
                code: "xyz".to_string(),
                state: "abc".to_string()
            }
        );
    }

    #[test]
    fn provider_error_is_reported() {
        let err = parse_redirect(
            "https://app.example.com/cb?error=access_denied&error_description=User%20cancelled",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SessionError::AuthorizationFailed {
                details: "access_denied: User cancelled".to_string()
            }
        );
    }

    #[test]
    fn missing_code_is_rejected() {
        assert!(parse_redirect("https://app.example.com/cb?state=abc").is_err());
    }

    #[test]
    fn plain_text_is_rejected() {
        assert!(parse_redirect("xyz").is_err());
    }
}
