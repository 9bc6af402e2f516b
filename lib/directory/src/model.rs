//! Records exchanged with the admin directory.

use keygate_core::{DirectoryUserId, GroupId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

/// A user record as the directory returns it.
///
/// Fields the client does not interpret are kept in `extra` so an update
/// can send the full record back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: DirectoryUserId,
    pub username: String,
    #[serde(default)]
    pub enabled: bool,
    /// Group names, filled in by group lookups. Never sent to the directory.
    #[serde(skip)]
    pub groups: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DirectoryEntry {
    /// Creates an entry with no extra attributes.
    #[must_use]
    pub fn new(id: DirectoryUserId, username: impl Into<String>, enabled: bool) -> Self {
        Self {
            id,
            username: username.into(),
            enabled,
            groups: BTreeSet::new(),
            extra: Map::new(),
        }
    }
}

/// A group the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryGroup {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// Filter for [`list_users`](crate::DirectoryClient::list_users).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl UserQuery {
    /// Accounts waiting for approval.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            ..Self::default()
        }
    }

    /// Exact username match.
    #[must_use]
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            exact: Some(true),
            ..Self::default()
        }
    }
}

/// A self-service account registration.
///
/// The phone number doubles as the username.
#[derive(Debug)]
pub struct NewAccount {
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub password: Option<SecretString>,
    pub enabled: bool,
    /// Client role to grant; the configured user role when unset.
    pub client_role: Option<String>,
    /// Group to join after creation.
    pub group: Option<String>,
}

impl NewAccount {
    /// Creates a disabled account that must be approved before use.
    #[must_use]
    pub fn new(
        phone_number: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            password: None,
            enabled: false,
            client_role: None,
            group: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_client_role(mut self, role: impl Into<String>) -> Self {
        self.client_role = Some(role.into());
        self
    }

    #[must_use]
    pub fn join_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Builds the user representation sent on creation.
    pub(crate) fn representation(&self, email_domain: Option<&str>) -> Value {
        let mut user = json!({
            "username": self.phone_number,
            "enabled": self.enabled,
            "firstName": self.first_name,
            "lastName": self.last_name,
        });
        if let Some(domain) = email_domain {
            user["email"] = json!(format!("{}@{domain}", self.phone_number));
            user["emailVerified"] = json!(true);
        }
        if let Some(password) = &self.password {
            user["credentials"] = json!([{
                "type": "password",
                "value": password.expose_secret(),
                "temporary": false,
            }]);
        }
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_keeps_unknown_fields_for_updates() {
        let entry: DirectoryEntry = serde_json::from_value(json!({
            "id": "5b1d0c1e",
            "username": "9876543210",
            "enabled": false,
            "firstName": "Asha",
            "attributes": { "region": ["south"] }
        }))
        .expect("deserialize");

        assert_eq!(entry.extra["firstName"], "Asha");

        let mut approved = entry.clone();
        approved.enabled = true;
        let body = serde_json::to_value(&approved).expect("serialize");
        assert_eq!(body["enabled"], true);
        assert_eq!(body["firstName"], "Asha");
        assert_eq!(body["attributes"]["region"][0], "south");
        assert!(body.get("groups").is_none());
    }

    #[test]
    fn missing_enabled_means_disabled() {
        let entry: DirectoryEntry =
            serde_json::from_value(json!({ "id": "u1", "username": "u1" })).expect("deserialize");
        assert!(!entry.enabled);
    }

    #[test]
    fn disabled_query_only_sets_enabled() {
        let query = serde_json::to_value(UserQuery::disabled()).expect("serialize");
        assert_eq!(query, json!({ "enabled": false }));
    }

    #[test]
    fn account_representation_uses_phone_as_username() {
        let account = NewAccount::new("9876543210", "Asha", "Rao")
            .with_password(SecretString::from("pw".to_string()));
        let user = account.representation(Some("example.com"));

        assert_eq!(user["username"], "9876543210");
        assert_eq!(user["email"], "9876543210@example.com");
        assert_eq!(user["enabled"], false);
        assert_eq!(user["credentials"][0]["value"], "pw");
        assert_eq!(user["credentials"][0]["temporary"], false);
    }

    #[test]
    fn account_without_domain_has_no_email() {
        let user = NewAccount::new("9876543210", "Asha", "Rao").representation(None);
        assert!(user.get("email").is_none());
        assert!(user.get("credentials").is_none());
    }
}
