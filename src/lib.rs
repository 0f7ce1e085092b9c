//! Umbrella IAM - identity and access management service
//!
//! Verifies username/password pairs, stores salted and peppered password
//! hashes, manages roles, and signs bearer tokens with an RSA keypair that
//! repairs itself when the stored key material goes missing or drifts apart.
//!
//! ## Components
//!
//! - **Stores**: secret store and object store adapters (MongoDB, filesystem, memory)
//! - **Keys**: RSA keypair lifecycle with cached, self-healing lookups
//! - **Credentials**: PBKDF2 password hashing with a shared pepper
//! - **Tokens**: RS256 bearer tokens embedding a user snapshot
//! - **Bootstrap**: idempotent convergence of role, pepper, admins and keys
//! - **Server**: hyper HTTP surface over the account service

pub mod auth;
pub mod config;
pub mod db;
pub mod keys;
pub mod routes;
pub mod server;
pub mod services;
pub mod stores;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{IamError, Lookup, Result};
