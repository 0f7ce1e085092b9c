//! Keyed record persistence
//!
//! Users and roles are looked up by a unique natural key (username, role
//! key), never by surrogate id. `Repository` is the seam the services depend
//! on; MongoDB and in-memory implementations are provided.

use async_trait::async_trait;
use bson::{doc, Document};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::db::mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{Lookup, Result};

/// A document stored under a unique natural key
pub trait Record:
    Serialize + DeserializeOwned + Clone + Unpin + Send + Sync + IntoIndexes + MutMetadata + 'static
{
    const COLLECTION: &'static str;
    const KEY_FIELD: &'static str;

    fn key(&self) -> &str;

    fn metadata(&self) -> &Metadata;
}

#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Insert or replace by key, stamping metadata. Returns the stored record.
    async fn save(&self, record: T) -> Result<T>;

    async fn get(&self, key: &str) -> Result<Lookup<T>>;

    async fn list(&self) -> Result<Vec<T>>;

    /// Remove every record. Test setup only.
    async fn drop_all(&self) -> Result<()>;
}

// =============================================================================
// MongoDB
// =============================================================================

pub struct MongoRepository<T>
where
    T: Record,
{
    collection: MongoCollection<T>,
}

impl<T: Record> MongoRepository<T> {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<T>(T::COLLECTION).await?;
        Ok(Self { collection })
    }
}

fn key_filter<T: Record>(key: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(T::KEY_FIELD, key);
    filter
}

#[async_trait]
impl<T: Record> Repository<T> for MongoRepository<T> {
    async fn save(&self, mut record: T) -> Result<T> {
        record.mut_metadata().stamp_save();
        self.collection
            .upsert_one(key_filter::<T>(record.key()), &record)
            .await?;
        debug!("Saved {} '{}'", T::COLLECTION, record.key());
        Ok(record)
    }

    async fn get(&self, key: &str) -> Result<Lookup<T>> {
        let found = self.collection.find_one(key_filter::<T>(key)).await?;
        Ok(found.into())
    }

    async fn list(&self) -> Result<Vec<T>> {
        self.collection.find_many(doc! {}).await
    }

    async fn drop_all(&self) -> Result<()> {
        let deleted = self.collection.delete_many(doc! {}).await?;
        debug!("Dropped {} documents from {}", deleted, T::COLLECTION);
        Ok(())
    }
}
