//! Account and role operations behind the HTTP surface
//!
//! Every operation takes the caller's token snapshot. Lower-layer absences
//! and policy violations are turned into client errors here, with the
//! offending username or role as parameters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::permissions::{can_act_on, is_super_admin};
use crate::auth::{IssuedToken, TokenService};
use crate::db::schemas::{ProfileUpdate, RoleDoc, UserDoc, UserSnapshot};
use crate::db::Repository;
use crate::services::credentials::CredentialManager;
use crate::types::{IamError, Lookup, Result};

// =============================================================================
// DTOs
// =============================================================================

/// User fields accepted by `POST /user` and `PUT /user`. Omitted fields keep
/// their stored values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: ProfileUpdate,

    /// New password; required when the user does not exist yet
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// Body of `PATCH /authenticate`
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub username: String,
    pub password: String,
}

/// Form body of `POST /authenticate`
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleView {
    pub role: String,
    #[serde(default)]
    pub name: String,
}

impl From<RoleDoc> for RoleView {
    fn from(doc: RoleDoc) -> Self {
        Self {
            role: doc.role,
            name: doc.name,
        }
    }
}

/// Body of a successful `POST /authenticate`
#[derive(Debug, Clone, Serialize)]
pub struct ExpiryResponse {
    pub expiry: String,
}

impl From<&IssuedToken> for ExpiryResponse {
    fn from(token: &IssuedToken) -> Self {
        Self {
            expiry: token.expiry.to_rfc3339(),
        }
    }
}

// =============================================================================
// Account Service
// =============================================================================

pub struct AccountService {
    users: Arc<dyn Repository<UserDoc>>,
    roles: Arc<dyn Repository<RoleDoc>>,
    credentials: Arc<CredentialManager>,
    tokens: Arc<TokenService>,
}

fn insufficient_privileges(caller: &UserSnapshot) -> IamError {
    IamError::unauthorized(
        "Insufficient privileges",
        Some(json!({ "username": caller.username })),
    )
}

impl AccountService {
    pub fn new(
        users: Arc<dyn Repository<UserDoc>>,
        roles: Arc<dyn Repository<RoleDoc>>,
        credentials: Arc<CredentialManager>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            roles,
            credentials,
            tokens,
        }
    }

    /// Look up a user. When `create_if_absent`, a missing user comes back as
    /// a transient blank record instead of `NotFound`.
    pub async fn get_by_username(&self, username: &str, create_if_absent: bool) -> Result<UserDoc> {
        match self.users.get(username).await? {
            Lookup::Found(user) => Ok(user),
            Lookup::Absent if create_if_absent => Ok(UserDoc::new(username)),
            Lookup::Absent => Err(IamError::not_found("Username not found", json!(username))),
        }
    }

    pub async fn get_role_doc(&self, role: &str) -> Result<RoleDoc> {
        self.roles
            .get(role)
            .await?
            .found_or_else(|| IamError::not_found("Role not found", json!(role)))
    }

    async fn ensure_role_exists(&self, role: Option<&str>) -> Result<()> {
        if let Some(role) = role {
            self.get_role_doc(role).await?;
        }
        Ok(())
    }

    /// Resolve the caller from a bearer token
    pub async fn caller(&self, token: &str) -> Result<UserSnapshot> {
        self.tokens.parse(token).await
    }

    /// Verify credentials and mint a token. Unknown user and wrong password
    /// fail identically.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<IssuedToken> {
        let invalid = || {
            IamError::unauthorized(
                "Invalid credentials",
                Some(json!({ "username": credentials.username })),
            )
        };

        let user = match self.users.get(&credentials.username).await? {
            Lookup::Found(user) => user,
            Lookup::Absent => {
                self.credentials.verify_absent(&credentials.password).await?;
                warn!("Failed login for unknown user '{}'", credentials.username);
                return Err(invalid());
            }
        };

        if !self
            .credentials
            .is_password_correct(&user, &credentials.password)
            .await?
        {
            warn!("Failed login for '{}'", credentials.username);
            return Err(invalid());
        }

        let token = self.tokens.issue(&user.snapshot()).await?;
        info!("Issued token for '{}'", user.username);
        Ok(token)
    }

    /// Change a password: own account, or any account for super-admins
    pub async fn change_password(
        &self,
        caller: &UserSnapshot,
        change: &PasswordChange,
    ) -> Result<UserSnapshot> {
        if !can_act_on(caller, &change.username) {
            return Err(IamError::unauthorized(
                "Cannot change another user's password",
                Some(json!({ "username": change.username })),
            ));
        }

        let user = self.get_by_username(&change.username, false).await?;
        let saved = self.credentials.save_password(user, &change.password).await?;
        Ok(saved.snapshot())
    }

    /// Update the caller's own record
    pub async fn update_own_user(
        &self,
        caller: &UserSnapshot,
        profile: &UserProfile,
    ) -> Result<UserSnapshot> {
        if profile.user.username != caller.username {
            return Err(IamError::unauthorized(
                "Cannot update another user's data",
                Some(json!(profile.user)),
            ));
        }

        // The token may predate a role change, so privilege and the current
        // role come from the stored record.
        let stored = self.get_by_username(&caller.username, true).await?;
        let role_changed = profile
            .user
            .role
            .as_ref()
            .is_some_and(|role| stored.role.as_ref() != Some(role));
        if role_changed && !is_super_admin(&stored.snapshot()) {
            return Err(IamError::unauthorized(
                "Cannot change own role",
                Some(json!({ "username": caller.username, "role": profile.user.role })),
            ));
        }

        self.upsert(stored, profile).await
    }

    /// Create (or overwrite) any user. Super-admin only.
    pub async fn create_user(
        &self,
        caller: &UserSnapshot,
        profile: &UserProfile,
    ) -> Result<UserSnapshot> {
        if !is_super_admin(caller) {
            return Err(insufficient_privileges(caller));
        }

        let existing = self.get_by_username(&profile.user.username, true).await?;
        let created = self.upsert(existing, profile).await?;
        info!("User '{}' saved by '{}'", created.username, caller.username);
        Ok(created)
    }

    /// Merge the submitted fields into `user` (stored, or a transient new
    /// record) and persist it.
    async fn upsert(&self, mut user: UserDoc, profile: &UserProfile) -> Result<UserSnapshot> {
        if profile.user.username.trim().is_empty() {
            return Err(IamError::BadRequest("Username is required".into()));
        }
        self.ensure_role_exists(profile.user.role.as_deref()).await?;

        user.apply_profile(&profile.user);

        let saved = match &profile.password {
            Some(password) => self.credentials.save_password(user, password).await?,
            None if user.is_saved() => self.users.save(user).await?,
            None => {
                return Err(IamError::BadRequest(format!(
                    "Password is required for new user '{}'",
                    profile.user.username
                )))
            }
        };

        Ok(saved.snapshot())
    }

    /// Own record, or any record for super-admins
    pub async fn get_user(
        &self,
        caller: &UserSnapshot,
        username: Option<&str>,
    ) -> Result<UserSnapshot> {
        let target = username.unwrap_or(&caller.username);
        if !can_act_on(caller, target) {
            return Err(insufficient_privileges(caller));
        }

        Ok(self.get_by_username(target, false).await?.snapshot())
    }

    pub async fn list_users(&self, caller: &UserSnapshot) -> Result<Vec<UserSnapshot>> {
        if !is_super_admin(caller) {
            return Err(insufficient_privileges(caller));
        }

        Ok(self
            .users
            .list()
            .await?
            .iter()
            .map(UserDoc::snapshot)
            .collect())
    }

    pub async fn get_role(&self, caller: &UserSnapshot, role: &str) -> Result<RoleView> {
        if !is_super_admin(caller) {
            return Err(insufficient_privileges(caller));
        }

        Ok(self.get_role_doc(role).await?.into())
    }

    pub async fn create_role(&self, caller: &UserSnapshot, role: &RoleView) -> Result<RoleView> {
        if !is_super_admin(caller) {
            return Err(insufficient_privileges(caller));
        }
        if role.role.trim().is_empty() {
            return Err(IamError::BadRequest("Role is required".into()));
        }

        let mut doc = match self.roles.get(&role.role).await? {
            Lookup::Found(doc) => doc,
            Lookup::Absent => RoleDoc::new(role.role.clone(), ""),
        };
        doc.name = role.name.clone();

        let saved = self.roles.save(doc).await?;
        info!("Role '{}' saved by '{}'", saved.role, caller.username);
        Ok(saved.into())
    }
}
