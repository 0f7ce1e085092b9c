//! Role document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::repository::Record;
use crate::db::schemas::Metadata;

/// Collection name for roles
pub const ROLE_COLLECTION: &str = "roles";

/// Authorization group a user belongs to
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RoleDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Unique role key, e.g. `SUPER_ADMIN`
    pub role: String,

    /// Display label
    #[serde(default)]
    pub name: String,
}

impl RoleDoc {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl IntoIndexes for RoleDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "role": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("role_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RoleDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for RoleDoc {
    const COLLECTION: &'static str = ROLE_COLLECTION;
    const KEY_FIELD: &'static str = "role";

    fn key(&self) -> &str {
        &self.role
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
