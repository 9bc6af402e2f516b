//! Identity-provider token endpoint operations.
//!
//! The session manager refreshes, revokes, and reads the user profile
//! through the [`TokenEndpoint`] trait. [`KeycloakTokenEndpoint`] is the
//! HTTP implementation talking to a Keycloak realm.

use crate::error::SessionError;
use async_trait::async_trait;
use keygate_identity::{KeycloakConfig, TokenResponse};
use reqwest::StatusCode;
use rootcause::prelude::Report;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

/// Token-endpoint operations used by the session manager.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges a refresh token for a new credential set.
    async fn refresh(&self, refresh_token: &SecretString)
    -> Result<TokenResponse, Report<SessionError>>;

    /// Ends the provider-side session the refresh token belongs to.
    async fn logout(&self, refresh_token: &SecretString) -> Result<(), Report<SessionError>>;

    /// Fetches the OpenID-Connect userinfo document.
    async fn user_info(
        &self,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, Report<SessionError>>;
}

/// Token endpoint of a Keycloak realm.
pub struct KeycloakTokenEndpoint {
    http: reqwest::Client,
    token_url: String,
    logout_url: String,
    userinfo_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl KeycloakTokenEndpoint {
    /// Creates an endpoint client for the configured realm.
    ///
    /// # Errors
    ///
    /// Returns `NetworkFailure` if the HTTP client cannot be constructed.
    pub fn new(config: &KeycloakConfig) -> Result<Self, Report<SessionError>> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(SessionError::from)?;

        Ok(Self {
            http,
            token_url: config.token_endpoint(),
            logout_url: config.logout_endpoint(),
            userinfo_url: config.userinfo_endpoint(),
            client_id: config.client_id().to_string(),
            client_secret: SecretString::from(config.client_secret().expose_secret().to_string()),
        })
    }

    fn client_form<'a>(&'a self, refresh_token: &'a SecretString) -> [(&'static str, &'a str); 3] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
        ]
    }
}

#[async_trait]
impl TokenEndpoint for KeycloakTokenEndpoint {
    #[instrument(skip_all, fields(url = %self.token_url))]
    async fn refresh(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, Report<SessionError>> {
        let [client_id, client_secret, refresh] = self.client_form(refresh_token);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                client_id,
                client_secret,
                refresh,
            ])
            .send()
            .await
            .map_err(SessionError::from)?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            debug!(%status, "refresh rejected");
            let err = if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                SessionError::RefreshDenied { details }
            } else {
                SessionError::RefreshFailed {
                    status: status.as_u16(),
                    details,
                }
            };
            return Err(err.into());
        }

        let body = response.text().await.map_err(SessionError::from)?;
        let token = serde_json::from_str(&body).map_err(|e| SessionError::MalformedToken {
            reason: format!("token response is not valid: {e}"),
        })?;
        Ok(token)
    }

    #[instrument(skip_all, fields(url = %self.logout_url))]
    async fn logout(&self, refresh_token: &SecretString) -> Result<(), Report<SessionError>> {
        let response = self
            .http
            .post(&self.logout_url)
            .form(&self.client_form(refresh_token))
            .send()
            .await
            .map_err(SessionError::from)?;

        let status = response.status();
        if !status.is_success() {
            let details = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
            return Err(SessionError::NetworkFailure {
                details: format!("logout returned {status}: {details}"),
            }
            .into());
        }

        debug!("provider session ended");
        Ok(())
    }

    #[instrument(skip_all, fields(url = %self.userinfo_url))]
    async fn user_info(
        &self,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, Report<SessionError>> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(SessionError::from)?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(SessionError::ProfileUnavailable {
                status: status.as_u16(),
                details,
            }
            .into());
        }

        let profile = response.json().await.map_err(SessionError::from)?;
        Ok(profile)
    }
}
