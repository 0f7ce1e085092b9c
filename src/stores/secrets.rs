//! Named secret storage
//!
//! Holds the signing private key and the password pepper. A lookup that finds
//! nothing, or finds an empty value, is [`Lookup::Absent`] rather than an
//! error so callers can decide to create the secret.

use async_trait::async_trait;
use bson::{doc, DateTime};
use dashmap::DashMap;
use tracing::debug;

use crate::db::schemas::{SecretDoc, SECRET_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{IamError, Lookup, Result};

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Lookup<String>>;

    /// Create or overwrite a secret. A previously deleted secret of the same
    /// name is recovered.
    async fn set(&self, name: &str, value: &str) -> Result<()>;

    /// Delete a secret, failing with `SecretNotAvailable` if it does not exist
    async fn delete(&self, name: &str) -> Result<()>;
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Default)]
pub struct MemorySecretStore {
    secrets: DashMap<String, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Lookup<String>> {
        Ok(self
            .secrets
            .get(name)
            .map(|value| value.value().clone())
            .filter(|value| !value.is_empty())
            .into())
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.secrets.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.secrets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IamError::SecretNotAvailable(name.to_string()))
    }
}

// =============================================================================
// MongoDB
// =============================================================================

/// Secrets kept in the `secrets` collection with soft delete
pub struct MongoSecretStore {
    collection: MongoCollection<SecretDoc>,
}

impl MongoSecretStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<SecretDoc>(SECRET_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl SecretStore for MongoSecretStore {
    async fn get(&self, name: &str) -> Result<Lookup<String>> {
        let found = self.collection.find_one(doc! { "name": name }).await?;
        Ok(found
            .map(|secret| secret.value)
            .filter(|value| !value.is_empty())
            .into())
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        let existing = self
            .collection
            .update_one(
                doc! { "name": name },
                doc! {
                    "$set": {
                        "value": value,
                        "metadata.is_deleted": false,
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$unset": { "metadata.deleted_at": "" },
                },
            )
            .await?;

        if existing.matched_count == 0 {
            self.collection
                .upsert_one(doc! { "name": name }, &SecretDoc::new(name, value))
                .await?;
        }

        debug!("Stored secret '{}'", name);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let result = self.collection.soft_delete(doc! { "name": name }).await?;
        if result.matched_count == 0 {
            return Err(IamError::SecretNotAvailable(name.to_string()));
        }
        debug!("Deleted secret '{}'", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_absent() {
        let store = MemorySecretStore::new();
        assert_eq!(store.get("PASSWORD-PEPPER").await.unwrap(), Lookup::Absent);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemorySecretStore::new();
        store.set("name", "one").await.unwrap();
        store.set("name", "two").await.unwrap();
        assert_eq!(
            store.get("name").await.unwrap(),
            Lookup::Found("two".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_value_is_absent() {
        let store = MemorySecretStore::new();
        store.set("name", "").await.unwrap();
        assert!(store.get("name").await.unwrap().is_absent());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemorySecretStore::new();
        store.set("name", "value").await.unwrap();
        store.delete("name").await.unwrap();
        assert!(store.get("name").await.unwrap().is_absent());

        let err = store.delete("name").await.unwrap_err();
        assert!(matches!(err, IamError::SecretNotAvailable(_)));
    }
}
