//! Interactive login through the identity provider.
//!
//! Login is delegated to the provider's authorization-code flow: the user
//! authenticates in a browser and the provider redirects back with a code.
//! [`AuthorizationFlow`] is the seam the session manager calls;
//! [`OidcClient`] implements the protocol half of it with the
//! openidconnect crate, leaving the "open a browser, receive the redirect"
//! half to the front end.

use crate::error::SessionError;
use async_trait::async_trait;
use keygate_identity::{KeycloakConfig, TokenResponse};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse as _,
};
use rootcause::prelude::Report;
use secrecy::ExposeSecret;
use tracing::{debug, instrument};

/// Runs the provider's login flow and returns the issued credentials.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Authenticates the user.
    async fn authorize(&self) -> Result<TokenResponse, Report<SessionError>>;
}

/// Data that must survive between sending the user to the provider and
/// receiving the redirect.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub nonce: String,
}

/// OpenID-Connect client for the authorization-code flow with PKCE.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl OidcClient {
    /// Creates a client by discovering the realm's provider metadata.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationFailed` if a configured URL is invalid or
    /// discovery fails.
    pub async fn discover(config: &KeycloakConfig) -> Result<Self, Report<SessionError>> {
        let issuer_url = IssuerUrl::new(config.issuer().to_string()).map_err(|e| {
            SessionError::AuthorizationFailed {
                details: format!("invalid issuer URL: {e}"),
            }
        })?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(SessionError::from)?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http)
            .await
            .map_err(|e| SessionError::AuthorizationFailed {
                details: format!("failed to discover provider: {e}"),
            })?;

        let redirect_url = RedirectUrl::new(config.redirect_url().to_string()).map_err(|e| {
            SessionError::AuthorizationFailed {
                details: format!("invalid redirect URL: {e}"),
            }
        })?;

        debug!(issuer = config.issuer(), "provider metadata discovered");

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().expose_secret().to_string()),
            redirect_url,
            scopes: config.scopes().into_iter().map(str::to_string).collect(),
            http,
        })
    }

    /// Generates the URL to send the user to, with the state to keep.
    pub fn authorization_url(&self) -> (String, PendingAuthorization) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let pending = PendingAuthorization {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
        };

        (auth_url.to_string(), pending)
    }

    /// Exchanges the redirect's code for tokens.
    ///
    /// `state` must equal the CSRF token issued with the authorization URL.
    /// When the provider returns an ID token its signature and nonce are
    /// verified.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationFailed` on a state mismatch, a failed exchange,
    /// or an invalid ID token.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        pending: &PendingAuthorization,
    ) -> Result<TokenResponse, Report<SessionError>> {
        if state != pending.csrf_token {
            return Err(SessionError::AuthorizationFailed {
                details: "state parameter does not match".to_string(),
            }
            .into());
        }

        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| SessionError::AuthorizationFailed {
                details: format!("token endpoint error: {e}"),
            })?
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| SessionError::AuthorizationFailed {
                details: format!("token exchange failed: {e}"),
            })?;

        if let Some(id_token) = token_response.id_token() {
            let nonce = Nonce::new(pending.nonce.clone());
            id_token
                .claims(&client.id_token_verifier(), &nonce)
                .map_err(|e| SessionError::AuthorizationFailed {
                    details: format!("ID token validation failed: {e}"),
                })?;
        }

        Ok(TokenResponse::new(
            token_response.access_token().secret().clone(),
            token_response.refresh_token().map(|t| t.secret().clone()),
            token_response.expires_in().map(|d| d.as_secs()),
        ))
    }
}
