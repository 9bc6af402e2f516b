//! Identity-provider admin directory client for keygate.
//!
//! This crate provides:
//!
//! - **Directory queries**: list users, look up a user's groups, filter a
//!   user list by group membership
//! - **Approvals**: find disabled accounts waiting in the approval group and
//!   enable them
//! - **Registration**: create an account, grant its client role, and remove
//!   it again if a later step fails
//!
//! Calls authenticate with an admin token obtained through the
//! client-credentials grant ([`AdminTokenProvider`]).

pub mod client;
pub mod error;
pub mod model;
pub mod token;

pub use client::{DirectoryClient, EntryPredicate};
pub use error::DirectoryError;
pub use model::{DirectoryEntry, DirectoryGroup, NewAccount, UserQuery};
pub use token::AdminTokenProvider;
