//! In-memory repository for dev mode and tests

use async_trait::async_trait;
use dashmap::DashMap;

use crate::db::repository::{Record, Repository};
use crate::types::{Lookup, Result};

pub struct MemoryRepository<T: Record> {
    records: DashMap<String, T>,
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn save(&self, mut record: T) -> Result<T> {
        if let Some(existing) = self.records.get(record.key()) {
            if record.metadata().created_at.is_none() {
                record.mut_metadata().created_at = existing.metadata().created_at;
            }
        }
        record.mut_metadata().stamp_save();
        self.records.insert(record.key().to_string(), record.clone());
        Ok(record)
    }

    async fn get(&self, key: &str) -> Result<Lookup<T>> {
        Ok(self
            .records
            .get(key)
            .filter(|entry| !entry.metadata().is_deleted)
            .map(|entry| entry.value().clone())
            .into())
    }

    async fn list(&self) -> Result<Vec<T>> {
        let mut records: Vec<T> = self
            .records
            .iter()
            .filter(|entry| !entry.metadata().is_deleted)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(records)
    }

    async fn drop_all(&self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}
