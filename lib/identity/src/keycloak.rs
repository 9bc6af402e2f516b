//! Identity-provider (Keycloak) configuration.
//!
//! This module provides the configuration for talking to a Keycloak realm:
//! the OpenID-Connect endpoints used for login, refresh, and logout, the
//! admin REST API used for directory operations, and the client-role names
//! the application gates its screens on.

use crate::error::ConfigError;
use reqwest::Url;
use secrecy::SecretString;
use serde::Deserialize;

/// Configuration for the Keycloak identity provider.
///
/// Fields with defaults can be omitted when loading from configuration
/// files or environment variables.
#[derive(Debug, Deserialize)]
pub struct KeycloakConfig {
    /// The realm issuer URL (e.g., "https://auth.example.com/realms/agents").
    issuer: String,
    /// The server base URL used for the admin API (e.g., "https://auth.example.com").
    baseurl: String,
    /// The realm name.
    realm_name: String,
    /// The OAuth2 client ID registered with the realm.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: SecretString,
    /// The redirect URI registered for the authorization-code flow.
    redirect_url: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile,email"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Client role that grants the Admin role.
    #[serde(default = "default_admin_role")]
    admin_role: String,
    /// Client role that grants the User role.
    #[serde(default = "default_user_role")]
    user_role: String,
    /// Client role that grants the field-agent (POSP) role.
    #[serde(default = "default_field_agent_role")]
    field_agent_role: String,
    /// Client role that grants the Guest role, if guests are distinguished.
    #[serde(default)]
    guest_role: Option<String>,
    /// Group holding accounts that wait for approval.
    /// Default: "Guest"
    #[serde(default = "default_approval_group")]
    approval_group: String,
    /// Domain used to derive e-mail addresses for registered accounts.
    #[serde(default)]
    email_domain: Option<String>,
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

fn default_admin_role() -> String {
    "Admin-Client-1".to_string()
}

fn default_user_role() -> String {
    "User-Client-1".to_string()
}

fn default_field_agent_role() -> String {
    "POSP-Client-1".to_string()
}

fn default_approval_group() -> String {
    "Guest".to_string()
}

fn trim_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

impl KeycloakConfig {
    /// Creates a configuration builder with the required fields.
    #[must_use]
    pub fn builder(
        issuer: impl Into<String>,
        baseurl: impl Into<String>,
        realm_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> KeycloakConfigBuilder {
        KeycloakConfigBuilder::new(
            issuer.into(),
            baseurl.into(),
            realm_name.into(),
            client_id.into(),
            client_secret.into(),
            redirect_url.into(),
        )
    }

    /// Checks that every required option is present and every URL parses.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        let required = [
            ("issuer", self.issuer.as_str()),
            ("baseurl", self.baseurl.as_str()),
            ("realm_name", self.realm_name.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("redirect_url", self.redirect_url.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { field });
            }
        }

        for (field, value) in [
            ("issuer", &self.issuer),
            ("baseurl", &self.baseurl),
            ("redirect_url", &self.redirect_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
                field,
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Returns the realm issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        trim_slash(&self.issuer)
    }

    /// Returns the server base URL.
    #[must_use]
    pub fn baseurl(&self) -> &str {
        trim_slash(&self.baseurl)
    }

    /// Returns the realm name.
    #[must_use]
    pub fn realm_name(&self) -> &str {
        &self.realm_name
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    /// Returns the authorization-code redirect URL.
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the client role that grants Admin.
    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Returns the client role that grants User.
    #[must_use]
    pub fn user_role(&self) -> &str {
        &self.user_role
    }

    /// Returns the client role that grants field-agent access.
    #[must_use]
    pub fn field_agent_role(&self) -> &str {
        &self.field_agent_role
    }

    /// Returns the client role that grants Guest, if configured.
    #[must_use]
    pub fn guest_role(&self) -> Option<&str> {
        self.guest_role.as_deref()
    }

    /// Returns the group holding accounts awaiting approval.
    #[must_use]
    pub fn approval_group(&self) -> &str {
        &self.approval_group
    }

    /// Returns the e-mail domain for registered accounts, if configured.
    #[must_use]
    pub fn email_domain(&self) -> Option<&str> {
        self.email_domain.as_deref()
    }

    /// Returns the token endpoint URL.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }

    /// Returns the logout endpoint URL.
    #[must_use]
    pub fn logout_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.issuer())
    }

    /// Returns the userinfo endpoint URL.
    #[must_use]
    pub fn userinfo_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/userinfo", self.issuer())
    }

    /// Returns the base URL of the realm's admin REST API.
    #[must_use]
    pub fn admin_base(&self) -> String {
        format!("{}/admin/realms/{}", self.baseurl(), self.realm_name)
    }
}

/// Builder for `KeycloakConfig`.
#[derive(Debug)]
pub struct KeycloakConfigBuilder {
    config: KeycloakConfig,
}

impl KeycloakConfigBuilder {
    fn new(
        issuer: String,
        baseurl: String,
        realm_name: String,
        client_id: String,
        client_secret: String,
        redirect_url: String,
    ) -> Self {
        Self {
            config: KeycloakConfig {
                issuer,
                baseurl,
                realm_name,
                client_id,
                client_secret: SecretString::from(client_secret),
                redirect_url,
                scopes: default_scopes(),
                admin_role: default_admin_role(),
                user_role: default_user_role(),
                field_agent_role: default_field_agent_role(),
                guest_role: None,
                approval_group: default_approval_group(),
                email_domain: None,
            },
        }
    }

    /// Sets the OAuth2 scopes to request.
    #[must_use]
    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.config.scopes = scopes.join(",");
        self
    }

    /// Sets the client-role names for Admin, User, and field agent, in that order.
    #[must_use]
    pub fn roles(
        mut self,
        admin: impl Into<String>,
        user: impl Into<String>,
        field_agent: impl Into<String>,
    ) -> Self {
        self.config.admin_role = admin.into();
        self.config.user_role = user.into();
        self.config.field_agent_role = field_agent.into();
        self
    }

    /// Sets the client role that grants Guest.
    #[must_use]
    pub fn guest_role(mut self, role: impl Into<String>) -> Self {
        self.config.guest_role = Some(role.into());
        self
    }

    /// Sets the group holding accounts that await approval.
    #[must_use]
    pub fn approval_group(mut self, group: impl Into<String>) -> Self {
        self.config.approval_group = group.into();
        self
    }

    /// Sets the e-mail domain for registered accounts.
    #[must_use]
    pub fn email_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.email_domain = Some(domain.into());
        self
    }

    /// Builds the `KeycloakConfig`.
    #[must_use]
    pub fn build(self) -> KeycloakConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> KeycloakConfig {
        KeycloakConfig::builder(
            "https://auth.example.com/realms/agents/",
            "https://auth.example.com",
            "agents",
            "field-app",
            "s3cret",
            "com.example.app://oauth/callback",
        )
        .build()
    }

    #[test]
    fn builder_has_defaults() {
        let config = test_config();
        assert_eq!(config.client_id(), "field-app");
        assert_eq!(config.scopes(), vec!["openid", "profile", "email"]);
        assert_eq!(config.admin_role(), "Admin-Client-1");
        assert_eq!(config.user_role(), "User-Client-1");
        assert_eq!(config.field_agent_role(), "POSP-Client-1");
        assert_eq!(config.guest_role(), None);
        assert_eq!(config.approval_group(), "Guest");
    }

    #[test]
    fn derived_endpoints_strip_trailing_slash() {
        let config = test_config();
        assert_eq!(
            config.token_endpoint(),
            "https://auth.example.com/realms/agents/protocol/openid-connect/token"
        );
        assert_eq!(
            config.logout_endpoint(),
            "https://auth.example.com/realms/agents/protocol/openid-connect/logout"
        );
        assert_eq!(
            config.admin_base(),
            "https://auth.example.com/admin/realms/agents"
        );
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert_eq!(test_config().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_blank_secret() {
        let config = KeycloakConfig::builder(
            "https://auth.example.com/realms/agents",
            "https://auth.example.com",
            "agents",
            "field-app",
            "  ",
            "com.example.app://oauth/callback",
        )
        .build();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingField {
                field: "client_secret"
            })
        );
    }

    #[test]
    fn validate_rejects_relative_issuer() {
        let config = KeycloakConfig::builder(
            "realms/agents",
            "https://auth.example.com",
            "agents",
            "field-app",
            "s3cret",
            "com.example.app://oauth/callback",
        )
        .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "issuer", .. })
        ));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "issuer": "https://auth.example.com/realms/agents",
            "baseurl": "https://auth.example.com",
            "realm_name": "agents",
            "client_id": "field-app",
            "client_secret": "s3cret",
            "redirect_url": "com.example.app://oauth/callback",
            "scopes": "openid, offline_access",
            "guest_role": "Guest-Client-1"
        }"#;

        let config: KeycloakConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.scopes(), vec!["openid", "offline_access"]);
        assert_eq!(config.guest_role(), Some("Guest-Client-1"));
        assert_eq!(config.approval_group(), "Guest");
        assert_eq!(config.email_domain(), None);
    }

    #[test]
    fn config_requires_client_secret() {
        let json = r#"{
            "issuer": "https://auth.example.com/realms/agents",
            "baseurl": "https://auth.example.com",
            "realm_name": "agents",
            "client_id": "field-app",
            "redirect_url": "com.example.app://oauth/callback"
        }"#;

        assert!(serde_json::from_str::<KeycloakConfig>(json).is_err());
    }
}
