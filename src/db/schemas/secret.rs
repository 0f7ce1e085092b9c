//! Secret document schema
//!
//! Backing documents of the MongoDB secret store. Deleting a secret only
//! marks it deleted, so setting the same name again recovers the document.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for secrets
pub const SECRET_COLLECTION: &str = "secrets";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SecretDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    #[serde(default)]
    pub value: String,
}

impl SecretDoc {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut secret = Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        };
        secret.metadata.stamp_save();
        secret
    }
}

impl IntoIndexes for SecretDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for SecretDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
