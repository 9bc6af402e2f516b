//! Console configuration.
//!
//! Loaded with the `config` crate from an optional file, overridden by
//! environment variables such as `KEYGATE__KEYCLOAK__ISSUER`.
//!
//! See [`KeycloakConfig`] for the recognized identity-provider options.

use keygate_identity::KeycloakConfig;
use serde::Deserialize;
use std::path::Path;

/// Console configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Identity-provider configuration.
    pub keycloak: KeycloakConfig,
}

impl AppConfig {
    /// Loads configuration from `path` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a required option is
    /// missing.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("KEYGATE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn loads_keycloak_section_with_defaults() {
        let file = config_file(
            r#"
            [keycloak]
            issuer = "https://sso.example.com/realms/agents"
            baseurl = "https://sso.example.com"
            realm_name = "agents"
            client_id = "field-app"
            client_secret = "s3cret"
            redirect_url = "com.example.app://oauth/callback"
            email_domain = "example.com"
            "#,
        );

        let config = AppConfig::load(Some(file.path())).expect("load");

        assert_eq!(config.keycloak.client_id(), "field-app");
        assert_eq!(config.keycloak.client_secret().expose_secret(), "s3cret");
        assert_eq!(config.keycloak.admin_role(), "Admin-Client-1");
        assert_eq!(config.keycloak.approval_group(), "Guest");
        assert_eq!(config.keycloak.email_domain(), Some("example.com"));
        assert!(config.keycloak.validate().is_ok());
    }

    #[test]
    fn missing_required_option_fails_at_load() {
        let file = config_file(
            r#"
            [keycloak]
            issuer = "https://sso.example.com/realms/agents"
            "#,
        );

        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
