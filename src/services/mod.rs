//! Core services for Umbrella IAM
//!
//! - `CredentialManager`: password hashing, verification and the pepper
//! - `AccountService`: account and role operations with caller policy
//! - `Initializer`: idempotent deployment bootstrap

pub mod accounts;
pub mod bootstrap;
pub mod credentials;

pub use accounts::{
    AccountService, Credentials, ExpiryResponse, PasswordChange, RoleView, UserProfile,
};
pub use bootstrap::{BootstrapDiagnostics, GeneratedCredential, InitializationReport, Initializer};
pub use credentials::CredentialManager;
