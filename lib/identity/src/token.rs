//! Access-token payload decoding.
//!
//! A JWT is `base64url(header).base64url(payload).signature`. Only the
//! payload is read here and the signature is not checked: the result feeds
//! display and screen gating, while authorization decisions are made by the
//! identity provider and the resource servers that receive the token.

use crate::error::TokenError;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// base64url that tolerates both padded and unpadded segments.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Roles granted to the subject within one OAuth client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAccess {
    /// Client-role names.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Any other fields the provider includes.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decoded access-token claims.
///
/// `exp` is required. `resource_access` is optional on the wire because the
/// provider omits it for subjects that hold no client roles. All other
/// claims are kept in `extra` so nothing is lost when re-encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, in seconds since the Unix epoch.
    pub exp: i64,
    /// Client roles, keyed by client ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_access: Option<HashMap<String, ClientAccess>>,
    /// Remaining claims, untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Returns the client-role names granted within `client_id`.
    ///
    /// Empty when the client has no entry.
    #[must_use]
    pub fn client_roles(&self, client_id: &str) -> &[String] {
        self.resource_access
            .as_ref()
            .and_then(|clients| clients.get(client_id))
            .map(|access| access.roles.as_slice())
            .unwrap_or_default()
    }

    /// Returns a string claim such as `preferred_username` or `sub`.
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(serde_json::Value::as_str)
    }

    /// Seconds from `now` (Unix seconds) until `exp`, floored at zero.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: i64) -> u64 {
        u64::try_from(self.exp.saturating_sub(now)).unwrap_or(0)
    }
}

/// Decodes the claims carried in a JWT's payload segment.
///
/// # Errors
///
/// Returns `TokenError::Malformed` when the token has no payload segment,
/// the segment is not base64url, or the decoded bytes are not a claims
/// document with a numeric `exp`.
pub fn decode_claims(jwt: &str) -> Result<Claims, TokenError> {
    let mut segments = jwt.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err(TokenError::malformed("expected a dot-separated JWT")),
    };

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|e| TokenError::malformed(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::malformed(format!("payload is not a claims document: {e}")))
}

/// Encodes claims into an unsigned JWT.
///
/// Used by tests and fakes that need a token the codec accepts; the
/// signature segment is empty.
///
/// # Errors
///
/// Returns `TokenError::Malformed` if the claims cannot be serialized,
/// for instance when `extra` holds a non-finite number.
pub fn encode_unsigned(claims: &Claims) -> Result<String, TokenError> {
    let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = serde_json::to_vec(claims)
        .map_err(|e| TokenError::malformed(format!("claims cannot be serialized: {e}")))?;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
    Ok(format!("{header}.{payload}."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
    use serde_json::json;

    fn token_with_payload(payload: &serde_json::Value) -> String {
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).expect("serialize"));
        format!("eyJhbGciOiJSUzI1NiJ9.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn decodes_keycloak_payload_without_field_loss() {
        let payload = json!({
            "exp": 1_700_000_300,
            "iat": 1_700_000_000,
            "sub": "5b1d0c1e",
            "preferred_username": "9876543210",
            "resource_access": {
                "field-app": { "roles": ["POSP-Client-1"] },
                "account": { "roles": ["manage-account", "view-profile"] }
            },
            "realm_access": { "roles": ["offline_access"] }
        });

        let claims = decode_claims(&token_with_payload(&payload)).expect("decode");

        assert_eq!(claims.exp, 1_700_000_300);
        assert_eq!(claims.client_roles("field-app"), ["POSP-Client-1"]);
        assert_eq!(claims.string_claim("preferred_username"), Some("9876543210"));
        assert_eq!(serde_json::to_value(&claims).expect("serialize"), payload);
    }

    #[test]
    fn keeps_empty_resource_access_distinct_from_absent() {
        let empty = json!({ "exp": 1_700_000_300, "resource_access": {}, "sub": "x" });
        let absent = json!({ "exp": 1_700_000_300, "sub": "x" });

        let with_empty = decode_claims(&token_with_payload(&empty)).expect("decode");
        let without = decode_claims(&token_with_payload(&absent)).expect("decode");

        assert_eq!(serde_json::to_value(&with_empty).expect("serialize"), empty);
        assert_eq!(serde_json::to_value(&without).expect("serialize"), absent);
        assert!(with_empty.client_roles("field-app").is_empty());

        let reencoded = decode_claims(&encode_unsigned(&with_empty).expect("encode")).expect("decode");
        assert_eq!(reencoded, with_empty);
    }

    #[test]
    fn accepts_padded_payload() {
        let payload = json!({ "exp": 1, "resource_access": {} , "a": "bc" });
        let body = URL_SAFE.encode(serde_json::to_vec(&payload).expect("serialize"));
        let claims = decode_claims(&format!("h.{body}.s")).expect("decode");
        assert_eq!(claims.exp, 1);
    }

    #[test]
    fn two_segments_are_enough() {
        let payload = json!({ "exp": 42 });
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).expect("serialize"));
        let claims = decode_claims(&format!("header.{body}")).expect("decode");
        assert_eq!(claims.exp, 42);
        assert!(claims.client_roles("field-app").is_empty());
    }

    #[test]
    fn rejects_token_without_payload_segment() {
        assert!(matches!(
            decode_claims("not-a-jwt"),
            Err(TokenError::Malformed { .. })
        ));
        assert!(matches!(
            decode_claims("header..sig"),
            Err(TokenError::Malformed { .. })
        ));
        assert!(matches!(decode_claims(""), Err(TokenError::Malformed { .. })));
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_claims("header.***.sig").unwrap_err();
        assert!(err.to_string().contains("base64url"));
    }

    #[test]
    fn rejects_non_json_payload() {
        let body = URL_SAFE_NO_PAD.encode(b"hello world");
        let err = decode_claims(&format!("h.{body}.s")).unwrap_err();
        assert!(err.to_string().contains("claims document"));
    }

    #[test]
    fn rejects_payload_without_exp() {
        let payload = json!({ "resource_access": {} });
        assert!(decode_claims(&token_with_payload(&payload)).is_err());
    }

    #[test]
    fn seconds_until_expiry_floors_at_zero() {
        let claims = decode_claims(&token_with_payload(&json!({ "exp": 100 }))).expect("decode");
        assert_eq!(claims.seconds_until_expiry(40), 60);
        assert_eq!(claims.seconds_until_expiry(100), 0);
        assert_eq!(claims.seconds_until_expiry(500), 0);
    }

    #[test]
    fn unsigned_encoding_decodes_back() {
        let claims = decode_claims(&token_with_payload(&json!({
            "exp": 7,
            "resource_access": { "field-app": { "roles": ["Admin-Client-1"] } }
        })))
        .expect("decode");

        let decoded = decode_claims(&encode_unsigned(&claims).expect("encode")).expect("decode");
        assert_eq!(decoded, claims);
    }
}
