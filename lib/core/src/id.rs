//! Strongly-typed identifiers for identity-provider records.
//!
//! The identity provider assigns opaque string identifiers (UUIDs in
//! practice) to users, groups, and clients. They are interpolated into
//! admin API paths, so both `FromStr` and deserialization reject anything
//! that could change the shape of a path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

fn check_segment(id_type: &'static str, s: &str) -> Result<(), ParseIdError> {
    if s.is_empty() {
        return Err(ParseIdError {
            id_type,
            reason: "identifier is empty".to_string(),
        });
    }
    if let Some(c) = s
        .chars()
        .find(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace())
    {
        return Err(ParseIdError {
            id_type,
            reason: format!("identifier contains reserved character {c:?}"),
        });
    }
    Ok(())
}

/// Macro to generate a strongly-typed wrapper around a provider-assigned ID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                check_segment(stringify!($name), s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                check_segment(stringify!($name), &s)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a user record in the identity provider's directory.
    DirectoryUserId
);

define_id!(
    /// Identifier of a group in the identity provider's directory.
    GroupId
);

define_id!(
    /// Internal UUID of an OAuth client (distinct from its public `clientId`).
    ClientUuid
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uuid_like_ids() {
        let id: DirectoryUserId = "2f0c8a4e-7d0b-4d7e-9a55-0c5d2b1e8f11"
            .parse()
            .expect("should parse");
        assert_eq!(id.as_str(), "2f0c8a4e-7d0b-4d7e-9a55-0c5d2b1e8f11");
        assert_eq!(id.to_string(), "2f0c8a4e-7d0b-4d7e-9a55-0c5d2b1e8f11");
    }

    #[test]
    fn rejects_empty_id() {
        let err = "".parse::<GroupId>().unwrap_err();
        assert_eq!(err.id_type, "GroupId");
        assert!(err.reason.contains("empty"));
    }

    #[test]
    fn rejects_path_characters() {
        assert!("abc/../users".parse::<DirectoryUserId>().is_err());
        assert!("abc?x=1".parse::<DirectoryUserId>().is_err());
        assert!("a b".parse::<ClientUuid>().is_err());
    }

    #[test]
    fn id_serde_is_transparent() {
        let id: DirectoryUserId = "u1".parse().expect("should parse");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"u1\"");
        let parsed: DirectoryUserId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }

    #[test]
    fn deserialization_applies_the_same_checks() {
        let err = serde_json::from_str::<DirectoryUserId>("\"../admin\"").unwrap_err();
        assert!(err.to_string().contains("reserved character"));
        assert!(serde_json::from_str::<GroupId>("\"\"").is_err());
    }
}
