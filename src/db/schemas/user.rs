//! User document schema
//!
//! Stores profile fields and the PBKDF2 credential pair. The credential pair
//! never leaves this type: everything shown to callers or embedded in tokens
//! goes through [`UserSnapshot`].

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::repository::Record;
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Unique, immutable lookup key
    pub username: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub organization_id: String,

    #[serde(default)]
    pub mobile: Option<i64>,

    /// Key of the user's role
    #[serde(default)]
    pub role: Option<String>,

    /// Hex-encoded PBKDF2 output
    #[serde(default)]
    pub password_hash: String,

    /// Hex-encoded per-user salt
    #[serde(default)]
    pub password_salt: String,
}

/// Non-secret view of a user, used for responses and token payloads
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserSnapshot {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub mobile: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Profile fields submitted by a client. `None` means "keep the stored
/// value"; a role cannot be cleared through an update.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserDoc {
    /// A transient record that has not been persisted yet
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn is_saved(&self) -> bool {
        self.metadata.is_saved()
    }

    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty() && !self.password_salt.is_empty()
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            organization_id: self.organization_id.clone(),
            mobile: self.mobile,
            role: self.role.clone(),
        }
    }

    /// Merge the submitted profile fields. Username and credentials are left
    /// untouched.
    pub fn apply_profile(&mut self, update: &ProfileUpdate) {
        if let Some(first_name) = &update.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &update.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(organization_id) = &update.organization_id {
            self.organization_id = organization_id.clone();
        }
        if update.mobile.is_some() {
            self.mobile = update.mobile;
        }
        if update.role.is_some() {
            self.role = update.role.clone();
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "role": 1 },
                Some(IndexOptions::builder().name("role_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for UserDoc {
    const COLLECTION: &'static str = USER_COLLECTION;
    const KEY_FIELD: &'static str = "username";

    fn key(&self) -> &str {
        &self.username
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
