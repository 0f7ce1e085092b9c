//! Persistence for users, roles and secrets

pub mod memory;
pub mod mongo;
pub mod repository;
pub mod schemas;

pub use memory::MemoryRepository;
pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use repository::{MongoRepository, Record, Repository};
