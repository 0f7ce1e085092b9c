//! Signing key material
//!
//! - `KeyManager`: self-healing RSA keypair backed by the secret and object stores
//! - `LookupCache`: explicit memo with synchronous invalidation

pub mod cache;
pub mod material;

pub use cache::{CacheStatsSnapshot, LookupCache};
pub use material::{public_key_string, KeyManager, KeyState};
