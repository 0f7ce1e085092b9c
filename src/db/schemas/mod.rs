//! Database schemas for Umbrella IAM
//!
//! Defines MongoDB document structures for users, roles, and secrets.

mod metadata;
mod role;
mod secret;
mod user;

pub use metadata::Metadata;
pub use role::{RoleDoc, ROLE_COLLECTION};
pub use secret::{SecretDoc, SECRET_COLLECTION};
pub use user::{ProfileUpdate, UserDoc, UserSnapshot, USER_COLLECTION};
