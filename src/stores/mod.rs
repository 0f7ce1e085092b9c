//! External collaborators holding key material
//!
//! - `SecretStore`: named secrets (private key, pepper)
//! - `ObjectStore`: published files (public key)

pub mod objects;
pub mod secrets;

pub use objects::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use secrets::{MemorySecretStore, MongoSecretStore, SecretStore};
