//! Common metadata for all documents
//!
//! Tracks creation, update, and soft deletion timestamps.

use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// Whether this document has been soft-deleted
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    /// Server-set on every save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Stamp a save: `updated_at` always, `created_at` only the first time.
    /// Saving a soft-deleted record revives it.
    pub fn stamp_save(&mut self) {
        let now = DateTime::now();
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
        self.is_deleted = false;
        self.deleted_at = None;
    }

    /// Whether the record has ever been persisted
    pub fn is_saved(&self) -> bool {
        self.updated_at.is_some()
    }
}
