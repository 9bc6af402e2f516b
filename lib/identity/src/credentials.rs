//! Credential bundles issued by the identity provider.
//!
//! Token-endpoint responses arrive with either snake_case (`access_token`)
//! or camelCase (`accessToken`) field names depending on which client
//! produced them. [`TokenResponse`] accepts both and is converted into a
//! [`CredentialBundle`] immediately, so nothing past this module sees the
//! wire shape.

use crate::error::TokenError;
use crate::token::{Claims, decode_claims};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Raw token-endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "accessToken")]
    access_token: String,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<u64>,
}

impl TokenResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in,
        }
    }

    /// Normalizes the response into a credential bundle.
    ///
    /// A response without a refresh token keeps `previous_refresh`, which is
    /// how providers that do not rotate refresh tokens answer a refresh
    /// grant. Without `expires_in` the lifetime is taken from the `exp`
    /// claim relative to `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` if the access token cannot be decoded
    /// or no refresh token is available.
    pub fn into_bundle(
        self,
        previous_refresh: Option<&SecretString>,
        now: i64,
    ) -> Result<CredentialBundle, TokenError> {
        let claims = decode_claims(&self.access_token)?;
        let refresh_token = match (self.refresh_token, previous_refresh) {
            (Some(token), _) => SecretString::from(token),
            (None, Some(previous)) => SecretString::from(previous.expose_secret().to_string()),
            (None, None) => return Err(TokenError::malformed("response carries no refresh token")),
        };
        let expires_in = self
            .expires_in
            .unwrap_or_else(|| claims.seconds_until_expiry(now));

        Ok(CredentialBundle {
            access_token: SecretString::from(self.access_token),
            refresh_token,
            expires_in,
            claims,
        })
    }
}

/// The access/refresh token pair currently held for a session.
///
/// Replaced wholesale on every successful refresh and dropped at logout.
#[derive(Debug)]
pub struct CredentialBundle {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_in: u64,
    claims: Claims,
}

impl CredentialBundle {
    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    /// Returns the refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    /// Returns the lifetime reported by the provider, in seconds.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Returns the claims decoded from the access token.
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::encode_unsigned;

    fn access_token(exp: i64) -> String {
        encode_unsigned(&Claims {
            exp,
            resource_access: None,
            extra: serde_json::Map::new(),
        })
        .expect("encode")
    }

    #[test]
    fn accepts_snake_case_fields() {
        let json = serde_json::json!({
            "access_token": access_token(1_000),
            "refresh_token": "r1",
            "expires_in": 300,
            "token_type": "Bearer"
        });
        let response: TokenResponse = serde_json::from_value(json).expect("deserialize");
        let bundle = response.into_bundle(None, 0).expect("bundle");

        assert_eq!(bundle.refresh_token().expose_secret(), "r1");
        assert_eq!(bundle.expires_in(), 300);
        assert_eq!(bundle.claims().exp, 1_000);
    }

    #[test]
    fn accepts_camel_case_fields() {
        let json = serde_json::json!({
            "accessToken": access_token(1_000),
            "refreshToken": "r2",
            "idToken": "ignored"
        });
        let response: TokenResponse = serde_json::from_value(json).expect("deserialize");
        let bundle = response.into_bundle(None, 400).expect("bundle");

        assert_eq!(bundle.refresh_token().expose_secret(), "r2");
        assert_eq!(bundle.expires_in(), 600);
    }

    #[test]
    fn keeps_previous_refresh_token_when_not_rotated() {
        let previous = SecretString::from("old-refresh".to_string());
        let response = TokenResponse::new(access_token(10), None, Some(60));
        let bundle = response.into_bundle(Some(&previous), 0).expect("bundle");
        assert_eq!(bundle.refresh_token().expose_secret(), "old-refresh");
    }

    #[test]
    fn missing_refresh_token_is_malformed() {
        let response = TokenResponse::new(access_token(10), None, Some(60));
        assert!(matches!(
            response.into_bundle(None, 0),
            Err(TokenError::Malformed { .. })
        ));
    }

    #[test]
    fn undecodable_access_token_is_malformed() {
        let response = TokenResponse::new("opaque-token", Some("r".to_string()), Some(60));
        assert!(matches!(
            response.into_bundle(None, 0),
            Err(TokenError::Malformed { .. })
        ));
    }
}
