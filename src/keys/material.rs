//! Signing keypair lifecycle.
//!
//! The private key lives in the secret store as PKCS#8 PEM. The public key is
//! published to the object store as PKCS#1 PEM under a well-known name. Any
//! path that cannot produce a usable key ends in regeneration rather than an
//! error, and regeneration always publishes the matching public key in the
//! same operation.
//!
//! # Consistency
//!
//! Keys are compared by their canonical PKCS#1 PEM text. A published public
//! key that does not match the current private key is treated as corrupt and
//! replaced. Concurrent regenerations are not coordinated: the last one to
//! publish wins.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::KeyConfig;
use crate::keys::cache::{CacheStatsSnapshot, LookupCache};
use crate::stores::{ObjectStore, SecretStore};
use crate::types::{IamError, Lookup, Result};

// =============================================================================
// Key State
// =============================================================================

/// Condition of stored key material, as seen directly in the stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Valid,
    Missing,
    /// Present but unparseable
    Invalid,
    /// Parseable public key that does not belong to the current private key
    Mismatched,
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Valid => write!(f, "valid"),
            KeyState::Missing => write!(f, "missing"),
            KeyState::Invalid => write!(f, "invalid"),
            KeyState::Mismatched => write!(f, "mismatched"),
        }
    }
}

enum Loaded<K> {
    Key(K),
    Missing,
    Invalid,
}

/// Canonical text form used to decide whether two public keys match
pub fn public_key_string(key: &RsaPublicKey) -> Result<String> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| IamError::KeyMaterial(format!("Failed to encode public key: {}", e)))
}

fn private_key_pem(key: &RsaPrivateKey) -> Result<zeroize::Zeroizing<String>> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| IamError::KeyMaterial(format!("Failed to encode private key: {}", e)))
}

// =============================================================================
// Key Manager
// =============================================================================

pub struct KeyManager {
    secrets: Arc<dyn SecretStore>,
    objects: Arc<dyn ObjectStore>,
    config: KeyConfig,
    private_cache: LookupCache<RsaPrivateKey>,
    public_cache: LookupCache<RsaPublicKey>,
}

impl KeyManager {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        objects: Arc<dyn ObjectStore>,
        config: KeyConfig,
    ) -> Self {
        Self {
            secrets,
            objects,
            config,
            private_cache: LookupCache::new(),
            public_cache: LookupCache::new(),
        }
    }

    /// The current private key, regenerating the keypair if the stored key
    /// is missing or unparseable.
    pub async fn private_key(&self) -> Result<RsaPrivateKey> {
        if let Some(key) = self.private_cache.get(&self.config.private_key_secret) {
            return Ok(key);
        }

        let key = match self.load_private().await? {
            Loaded::Key(key) => key,
            Loaded::Missing => {
                warn!(
                    "Private key '{}' not found, regenerating keypair",
                    self.config.private_key_secret
                );
                return self.regenerate().await;
            }
            Loaded::Invalid => {
                warn!(
                    "Private key '{}' is corrupt, regenerating keypair",
                    self.config.private_key_secret
                );
                return self.regenerate().await;
            }
        };

        self.private_cache
            .insert(self.config.private_key_secret.clone(), key.clone());
        Ok(key)
    }

    /// The published public key, republishing it from the current private
    /// key if it is missing, unparseable, or does not match.
    pub async fn public_key(&self) -> Result<RsaPublicKey> {
        if let Some(key) = self.public_cache.get(&self.config.public_key_file) {
            return Ok(key);
        }

        let expected = self.private_key().await?.to_public_key();

        match self.load_public().await? {
            Loaded::Key(published)
                if public_key_string(&published)? == public_key_string(&expected)? =>
            {
                self.public_cache
                    .insert(self.config.public_key_file.clone(), published.clone());
                return Ok(published);
            }
            Loaded::Key(_) => {
                warn!("Published public key does not match private key, republishing")
            }
            Loaded::Missing => {
                warn!("Public key '{}' not found, republishing", self.config.public_key_file)
            }
            Loaded::Invalid => {
                warn!("Public key '{}' is corrupt, republishing", self.config.public_key_file)
            }
        }

        self.publish_public(&expected).await?;
        self.public_cache
            .insert(self.config.public_key_file.clone(), expected.clone());
        Ok(expected)
    }

    /// PKCS#1 PEM of the current public key
    pub async fn public_key_pem(&self) -> Result<String> {
        public_key_string(&self.public_key().await?)
    }

    /// Generate a new keypair, store the private key and publish the public
    /// key. Both caches are invalidated before anything is written.
    pub async fn regenerate(&self) -> Result<RsaPrivateKey> {
        self.invalidate_caches();

        let bits = self.config.rsa_key_bits;
        // RSA generation is CPU-bound; keep it off the async workers
        let key = tokio::task::spawn_blocking(move || {
            RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        })
        .await
        .map_err(|e| IamError::Internal(format!("Key generation task failed: {}", e)))?
        .map_err(|e| IamError::KeyMaterial(format!("Key generation failed: {}", e)))?;

        let pem = private_key_pem(&key)?;
        self.secrets
            .set(&self.config.private_key_secret, pem.as_str())
            .await?;

        self.publish_public(&key.to_public_key()).await?;
        self.private_cache
            .insert(self.config.private_key_secret.clone(), key.clone());

        info!("Generated new {}-bit signing keypair", bits);
        Ok(key)
    }

    /// Regenerate the keypair unless the stored private key is valid.
    /// Returns whether regeneration happened.
    pub async fn ensure_private_key(&self) -> Result<bool> {
        self.private_cache.invalidate(&self.config.private_key_secret);
        match self.private_key_state().await? {
            KeyState::Valid => Ok(false),
            state => {
                info!("Private key is {}, regenerating keypair", state);
                self.regenerate().await?;
                Ok(true)
            }
        }
    }

    /// Republish the public key unless the published one matches.
    /// Returns whether it was republished.
    pub async fn ensure_public_key(&self) -> Result<bool> {
        self.public_cache.invalidate(&self.config.public_key_file);
        match self.public_key_state().await? {
            KeyState::Valid => Ok(false),
            state => {
                info!("Public key is {}, republishing", state);
                let key = self.private_key().await?.to_public_key();
                self.publish_public(&key).await?;
                Ok(true)
            }
        }
    }

    /// Stored private key condition, bypassing the cache
    pub async fn private_key_state(&self) -> Result<KeyState> {
        Ok(match self.load_private().await? {
            Loaded::Key(_) => KeyState::Valid,
            Loaded::Missing => KeyState::Missing,
            Loaded::Invalid => KeyState::Invalid,
        })
    }

    /// Published public key condition, bypassing the cache. Compared against
    /// the stored private key; with no usable private key nothing can match.
    pub async fn public_key_state(&self) -> Result<KeyState> {
        let published = match self.load_public().await? {
            Loaded::Key(key) => key,
            Loaded::Missing => return Ok(KeyState::Missing),
            Loaded::Invalid => return Ok(KeyState::Invalid),
        };

        let Loaded::Key(private) = self.load_private().await? else {
            return Ok(KeyState::Mismatched);
        };

        if public_key_string(&published)? == public_key_string(&private.to_public_key())? {
            Ok(KeyState::Valid)
        } else {
            Ok(KeyState::Mismatched)
        }
    }

    pub fn invalidate_caches(&self) {
        self.private_cache.invalidate_all();
        self.public_cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> (CacheStatsSnapshot, CacheStatsSnapshot) {
        (self.private_cache.stats(), self.public_cache.stats())
    }

    async fn publish_public(&self, key: &RsaPublicKey) -> Result<()> {
        let pem = public_key_string(key)?;
        let url = self
            .objects
            .upload(
                Bytes::from(pem),
                &self.config.public_key_file,
                &self.config.public_container,
            )
            .await?;
        self.public_cache.invalidate(&self.config.public_key_file);
        info!("Published public key to {}", url);
        Ok(())
    }

    async fn load_private(&self) -> Result<Loaded<RsaPrivateKey>> {
        let pem = match self.secrets.get(&self.config.private_key_secret).await? {
            Lookup::Found(pem) => zeroize::Zeroizing::new(pem),
            Lookup::Absent => return Ok(Loaded::Missing),
        };

        match RsaPrivateKey::from_pkcs8_pem(&pem) {
            Ok(key) => Ok(Loaded::Key(key)),
            Err(e) => {
                debug!("Private key failed to parse: {}", e);
                Ok(Loaded::Invalid)
            }
        }
    }

    async fn load_public(&self) -> Result<Loaded<RsaPublicKey>> {
        let url = match self
            .objects
            .get_url(&self.config.public_key_file, &self.config.public_container)
            .await?
        {
            Lookup::Found(url) => url,
            Lookup::Absent => return Ok(Loaded::Missing),
        };

        let data = match self.objects.fetch(&url).await {
            Ok(data) => data,
            Err(IamError::FileNotAvailable { .. }) => return Ok(Loaded::Missing),
            Err(e) => return Err(e),
        };

        let parsed = std::str::from_utf8(&data)
            .ok()
            .and_then(|pem| RsaPublicKey::from_pkcs1_pem(pem).ok());

        Ok(match parsed {
            Some(key) => Loaded::Key(key),
            None => Loaded::Invalid,
        })
    }
}
