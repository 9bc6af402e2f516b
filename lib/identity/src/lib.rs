//! Identity primitives for keygate.
//!
//! This crate provides:
//! - Access-token payload decoding (`decode_claims`, `Claims`)
//! - Coarse role resolution from client-role claims (`Role`, `RolePolicy`)
//! - Normalized credential bundles (`TokenResponse`, `CredentialBundle`)
//! - Identity-provider configuration (`KeycloakConfig`)
//!
//! # Example
//!
//! ```
//! use keygate_identity::{Claims, Role, RolePolicy, decode_claims, encode_unsigned};
//!
//! let claims: Claims = serde_json::from_value(serde_json::json!({
//!     "exp": 1_900_000_000,
//!     "resource_access": { "field-app": { "roles": ["User-Client-1", "Admin-Client-1"] } }
//! }))
//! .unwrap();
//! let token = encode_unsigned(&claims).unwrap();
//!
//! let decoded = decode_claims(&token).unwrap();
//! let policy = RolePolicy::new("Admin-Client-1", "User-Client-1", "POSP-Client-1");
//! assert_eq!(policy.resolve_role(&decoded, "field-app"), Role::Admin);
//! ```

pub mod credentials;
pub mod error;
pub mod keycloak;
pub mod role;
pub mod token;

// Re-export main types at crate root
pub use credentials::{CredentialBundle, TokenResponse};
pub use error::{ConfigError, TokenError};
pub use keycloak::{KeycloakConfig, KeycloakConfigBuilder};
pub use role::{Role, RolePolicy};
pub use token::{ClientAccess, Claims, decode_claims, encode_unsigned};
