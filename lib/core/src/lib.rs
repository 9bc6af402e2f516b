//! Core types shared by the keygate crates.
//!
//! This crate provides the `Result` alias used for layered error reporting
//! and the identifier types the identity provider hands out for directory
//! records.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ClientUuid, DirectoryUserId, GroupId, ParseIdError};
