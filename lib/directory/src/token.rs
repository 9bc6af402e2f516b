//! Admin-scoped access tokens via the client-credentials grant.

use crate::error::DirectoryError;
use oauth2::basic::BasicClient;
use oauth2::{AuthType, ClientId, ClientSecret, TokenResponse, TokenUrl};
use rootcause::prelude::Report;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Tokens are renewed this long before the provider says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

struct CachedToken {
    token: SecretString,
    renew_at: Instant,
}

/// Fetches and caches the admin access token.
pub struct AdminTokenProvider {
    client_id: String,
    client_secret: SecretString,
    token_url: TokenUrl,
    cached: Mutex<Option<CachedToken>>,
}

impl AdminTokenProvider {
    /// Creates a provider for the given token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if `token_url` is not a URL.
    pub fn new(
        token_url: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Result<Self, Report<DirectoryError>> {
        let token_url =
            TokenUrl::new(token_url.to_string()).map_err(|_| DirectoryError::InvalidEndpoint {
                url: token_url.to_string(),
            })?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret,
            token_url,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid admin token, fetching a new one when needed.
    ///
    /// # Errors
    ///
    /// Returns `AdminTokenFailed` if the grant is rejected or the request
    /// fails.
    #[instrument(skip_all, fields(client_id = %self.client_id))]
    pub async fn token(&self, http: &reqwest::Client) -> Result<SecretString, Report<DirectoryError>> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref()
            && Instant::now() < current.renew_at
        {
            return Ok(SecretString::from(current.token.expose_secret().to_string()));
        }

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.expose_secret().to_string()))
            .set_token_uri(self.token_url.clone())
            .set_auth_type(AuthType::RequestBody);

        let response = client
            .exchange_client_credentials()
            .request_async(http)
            .await
            .map_err(|e| DirectoryError::AdminTokenFailed {
                details: e.to_string(),
            })?;

        let token = response.access_token().secret().clone();
        *cached = response.expires_in().map(|lifetime| CachedToken {
            token: SecretString::from(token.clone()),
            renew_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });
        debug!(cached = cached.is_some(), "admin token issued");

        Ok(SecretString::from(token))
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/realms/agents/protocol/openid-connect/token";

    fn provider(server: &MockServer) -> AdminTokenProvider {
        AdminTokenProvider::new(
            &format!("{}{TOKEN_PATH}", server.uri()),
            "field-app",
            SecretString::from("s3cret".to_string()),
        )
        .expect("provider")
    }

    #[tokio::test]
    async fn client_credentials_in_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=field-app"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "admin-token",
                "token_type": "Bearer",
                "expires_in": 300
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let http = reqwest::Client::new();

        let first = provider.token(&http).await.expect("token");
        let second = provider.token(&http).await.expect("cached token");

        assert_eq!(first.expose_secret(), "admin-token");
        assert_eq!(second.expose_secret(), "admin-token");
    }

    #[tokio::test]
    async fn token_without_lifetime_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "admin-token",
                "token_type": "Bearer"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let http = reqwest::Client::new();
        provider.token(&http).await.expect("token");
        provider.token(&http).await.expect("token");
    }

    #[tokio::test]
    async fn invalidate_forces_new_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "admin-token",
                "token_type": "Bearer",
                "expires_in": 300
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let http = reqwest::Client::new();
        provider.token(&http).await.expect("token");
        provider.invalidate().await;
        provider.token(&http).await.expect("token");
    }

    #[tokio::test]
    async fn rejected_grant_is_admin_token_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "unauthorized_client"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .token(&reqwest::Client::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            DirectoryError::AdminTokenFailed { .. }
        ));
    }

    #[test]
    fn invalid_token_url_is_rejected() {
        let result = AdminTokenProvider::new(
            "not a url",
            "field-app",
            SecretString::from("s3cret".to_string()),
        );
        assert!(matches!(
            result.map(|_| ()).unwrap_err().current_context(),
            DirectoryError::InvalidEndpoint { .. }
        ));
    }
}
