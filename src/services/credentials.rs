//! Password credentials and the shared pepper
//!
//! Hashes are PBKDF2-HMAC-SHA256 over `password + pepper` with a random
//! per-user salt, stored hex-encoded on the user record.
//!
//! The pepper is created lazily the first time it is needed. If two processes
//! race to create it, the last write wins; the creating caller re-reads the
//! store after writing so it never caches a value that lost the race.
//! There is no pepper rotation: losing the pepper invalidates every hash.
//!
//! Derivations run on the blocking pool. A check against a user without
//! usable credentials still performs one full derivation, so a failed login
//! costs the same whether or not the username exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::auth::password::{derive_hash, generate_pepper, generate_salt, verify_hash};
use crate::config::{CredentialConfig, DERIVED_KEY_LENGTH, PEPPER_SECRET_NAME, SALT_BYTES};
use crate::db::schemas::UserDoc;
use crate::db::Repository;
use crate::keys::LookupCache;
use crate::stores::SecretStore;
use crate::types::{IamError, Lookup, Result};

pub struct CredentialManager {
    secrets: Arc<dyn SecretStore>,
    users: Arc<dyn Repository<UserDoc>>,
    config: CredentialConfig,
    pepper_cache: LookupCache<String>,
    derivations: AtomicU64,
}

impl CredentialManager {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        users: Arc<dyn Repository<UserDoc>>,
        config: CredentialConfig,
    ) -> Self {
        Self {
            secrets,
            users,
            config,
            pepper_cache: LookupCache::new(),
            derivations: AtomicU64::new(0),
        }
    }

    /// The pepper, created if it does not exist yet
    pub async fn pepper(&self) -> Result<String> {
        if let Some(pepper) = self.pepper_cache.get(PEPPER_SECRET_NAME) {
            return Ok(pepper);
        }

        let pepper = match self.secrets.get(PEPPER_SECRET_NAME).await? {
            Lookup::Found(pepper) => pepper,
            Lookup::Absent => self.create_pepper().await?,
        };

        self.pepper_cache.insert(PEPPER_SECRET_NAME, pepper.clone());
        Ok(pepper)
    }

    /// Create the pepper if it is missing. Returns whether it was created.
    pub async fn ensure_pepper(&self) -> Result<bool> {
        self.pepper_cache.invalidate(PEPPER_SECRET_NAME);
        if self.secrets.get(PEPPER_SECRET_NAME).await?.is_found() {
            return Ok(false);
        }
        self.create_pepper().await?;
        Ok(true)
    }

    pub async fn has_pepper(&self) -> Result<bool> {
        Ok(self.secrets.get(PEPPER_SECRET_NAME).await?.is_found())
    }

    async fn create_pepper(&self) -> Result<String> {
        self.secrets
            .set(PEPPER_SECRET_NAME, &generate_pepper())
            .await?;
        self.pepper_cache.invalidate(PEPPER_SECRET_NAME);
        info!("Created password pepper");

        self.secrets
            .get(PEPPER_SECRET_NAME)
            .await?
            .found_or_else(|| IamError::SecretNotAvailable(PEPPER_SECRET_NAME.to_string()))
    }

    /// PBKDF2 derivations performed by this process
    pub fn derivations(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }

    /// Run a derivation on the blocking pool with the current pepper
    async fn derive<R, F>(&self, password: &str, derivation: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&str, &str, u32) -> R + Send + 'static,
    {
        let pepper = Zeroizing::new(self.pepper().await?);
        let password = Zeroizing::new(password.to_string());
        let iterations = self.config.iterations;

        self.derivations.fetch_add(1, Ordering::Relaxed);
        tokio::task::spawn_blocking(move || derivation(&password, &pepper, iterations))
            .await
            .map_err(|e| IamError::Internal(format!("Password hashing task failed: {}", e)))
    }

    pub async fn hash(&self, password: &str, salt: &[u8]) -> Result<Vec<u8>> {
        let salt = salt.to_vec();
        self.derive(password, move |password, pepper, iterations| {
            derive_hash(password, pepper, &salt, iterations)
        })
        .await
    }

    pub async fn verify(&self, password: &str, hash: &[u8], salt: &[u8]) -> Result<bool> {
        let (hash, salt) = (hash.to_vec(), salt.to_vec());
        self.derive(password, move |password, pepper, iterations| {
            verify_hash(password, pepper, &hash, &salt, iterations)
        })
        .await
    }

    /// Burn one derivation against fixed material. Always false.
    pub async fn verify_absent(&self, password: &str) -> Result<bool> {
        let salt = [0u8; SALT_BYTES];
        let hash = [0u8; DERIVED_KEY_LENGTH];
        self.verify(password, &hash, &salt).await?;
        Ok(false)
    }

    /// Check a password against a user record. Records without credentials
    /// never match.
    pub async fn is_password_correct(&self, user: &UserDoc, password: &str) -> Result<bool> {
        if !user.has_password() {
            return self.verify_absent(password).await;
        }

        let (Ok(hash), Ok(salt)) = (hex::decode(&user.password_hash), hex::decode(&user.password_salt))
        else {
            debug!("Stored credentials for '{}' are not valid hex", user.username);
            return self.verify_absent(password).await;
        };

        self.verify(password, &hash, &salt).await
    }

    /// Re-hash with a fresh salt and persist the record.
    ///
    /// A persisted user cannot "change" to the password they already have.
    /// A record that has never been saved always succeeds.
    pub async fn save_password(&self, mut user: UserDoc, password: &str) -> Result<UserDoc> {
        if password.is_empty() {
            return Err(IamError::BadRequest("Password cannot be empty".into()));
        }

        if user.is_saved() && self.is_password_correct(&user, password).await? {
            return Err(IamError::SamePasswordReused {
                username: user.username.clone(),
            });
        }

        let salt = generate_salt();
        let hash = self.hash(password, &salt).await?;
        user.password_salt = hex::encode(&salt);
        user.password_hash = hex::encode(&hash);

        let saved = self.users.save(user).await?;
        info!("Password updated for '{}'", saved.username);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::stores::MemorySecretStore;

    struct Fixture {
        secrets: Arc<MemorySecretStore>,
        users: Arc<MemoryRepository<UserDoc>>,
        credentials: CredentialManager,
    }

    fn fixture() -> Fixture {
        let secrets = Arc::new(MemorySecretStore::new());
        let users = Arc::new(MemoryRepository::new());
        let credentials = CredentialManager::new(
            secrets.clone(),
            users.clone(),
            CredentialConfig { iterations: 1_000 },
        );
        Fixture {
            secrets,
            users,
            credentials,
        }
    }

    #[tokio::test]
    async fn test_pepper_created_once() {
        let f = fixture();
        let first = f.credentials.pepper().await.unwrap();
        let second = f.credentials.pepper().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            f.secrets.get(PEPPER_SECRET_NAME).await.unwrap(),
            Lookup::Found(first)
        );
    }

    #[tokio::test]
    async fn test_ensure_pepper_reports_creation() {
        let f = fixture();
        assert!(!f.credentials.has_pepper().await.unwrap());
        assert!(f.credentials.ensure_pepper().await.unwrap());
        assert!(!f.credentials.ensure_pepper().await.unwrap());
        assert!(f.credentials.has_pepper().await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_pepper_is_used() {
        let f = fixture();
        f.secrets.set(PEPPER_SECRET_NAME, "fixed").await.unwrap();
        assert_eq!(f.credentials.pepper().await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn test_save_and_verify_password() {
        let f = fixture();
        let user = f
            .credentials
            .save_password(UserDoc::new("john_doe"), "SomeRandomPassword")
            .await
            .unwrap();

        assert!(user.is_saved());
        assert_eq!(hex::decode(&user.password_salt).unwrap().len(), 32);
        assert!(f
            .credentials
            .is_password_correct(&user, "SomeRandomPassword")
            .await
            .unwrap());
        assert!(!f
            .credentials
            .is_password_correct(&user, "SomeRandomPassworda")
            .await
            .unwrap());

        let stored = f.users.get("john_doe").await.unwrap().into_option().unwrap();
        assert_eq!(stored.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn test_password_reuse_rejected() {
        let f = fixture();
        let user = f
            .credentials
            .save_password(UserDoc::new("john_doe"), "p")
            .await
            .unwrap();

        let err = f
            .credentials
            .save_password(user.clone(), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::SamePasswordReused { .. }));

        let changed = f.credentials.save_password(user, "pa").await.unwrap();
        assert!(f.credentials.is_password_correct(&changed, "pa").await.unwrap());
    }

    #[tokio::test]
    async fn test_unsaved_user_always_succeeds() {
        let f = fixture();
        let mut user = UserDoc::new("jane");
        let salt = generate_salt();
        user.password_salt = hex::encode(&salt);
        user.password_hash = hex::encode(f.credentials.hash("p", &salt).await.unwrap());

        assert!(f.credentials.save_password(user, "p").await.is_ok());
    }

    #[tokio::test]
    async fn test_lost_pepper_locks_out_existing_hashes() {
        let f = fixture();
        let user = f
            .credentials
            .save_password(UserDoc::new("john_doe"), "p")
            .await
            .unwrap();

        f.secrets.delete(PEPPER_SECRET_NAME).await.unwrap();
        assert!(f.credentials.ensure_pepper().await.unwrap());
        assert!(!f.credentials.is_password_correct(&user, "p").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_credentials_still_derive() {
        let f = fixture();
        let user = f
            .credentials
            .save_password(UserDoc::new("john_doe"), "p")
            .await
            .unwrap();

        let before = f.credentials.derivations();
        assert!(!f.credentials.is_password_correct(&user, "x").await.unwrap());
        let known_user_cost = f.credentials.derivations() - before;

        let before = f.credentials.derivations();
        assert!(!f
            .credentials
            .is_password_correct(&UserDoc::new("ghost"), "x")
            .await
            .unwrap());
        assert_eq!(f.credentials.derivations() - before, known_user_cost);

        let mut corrupt = UserDoc::new("corrupt");
        corrupt.password_hash = "zz".into();
        corrupt.password_salt = "zz".into();
        let before = f.credentials.derivations();
        assert!(!f.credentials.is_password_correct(&corrupt, "x").await.unwrap());
        assert_eq!(f.credentials.derivations() - before, known_user_cost);
    }

    #[tokio::test]
    async fn test_empty_password_rejected() {
        let f = fixture();
        let err = f
            .credentials
            .save_password(UserDoc::new("john_doe"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::BadRequest(_)));
    }
}
