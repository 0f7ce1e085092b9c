//! Bearer token issuance and validation
//!
//! Tokens are RS256 JWTs carrying the full non-secret user snapshot and an
//! absolute expiry. They are self-contained: validation needs only the
//! current public key, and there is no server-side session or denylist.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{TokenConfig, AUTH_COOKIE_NAME};
use crate::db::schemas::UserSnapshot;
use crate::keys::KeyManager;
use crate::types::{IamError, Result};

/// Payload stored in the token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    #[serde(rename = "User")]
    pub user: UserSnapshot,
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// Sign claims with the private key
pub fn encode_claims(claims: &Claims, key: &RsaPrivateKey) -> Result<String> {
    let der = key
        .to_pkcs1_der()
        .map_err(|e| IamError::KeyMaterial(format!("Failed to encode private key: {}", e)))?;

    encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_der(der.as_bytes()),
    )
    .map_err(|e| IamError::Internal(format!("Failed to sign token: {}", e)))
}

/// Verify signature and expiry, returning the claims
pub fn decode_claims(token: &str, key: &RsaPublicKey) -> Result<Claims> {
    let der = key
        .to_pkcs1_der()
        .map_err(|e| IamError::KeyMaterial(format!("Failed to encode public key: {}", e)))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    decode::<Claims>(token, &DecodingKey::from_rsa_der(der.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => IamError::unauthorized(
                "Token expired",
                Some(json!({ "authorization_token": token })),
            ),
            _ => IamError::unauthorized("Invalid authorization token", None),
        })
}

/// Mints and validates tokens with the key manager's current keypair
pub struct TokenService {
    keys: Arc<KeyManager>,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(keys: Arc<KeyManager>, config: TokenConfig) -> Self {
        Self { keys, config }
    }

    pub fn expiry_minutes(&self) -> i64 {
        self.config.expiry_minutes
    }

    pub async fn issue(&self, user: &UserSnapshot) -> Result<IssuedToken> {
        let now = Utc::now();
        let expiry = now + Duration::minutes(self.config.expiry_minutes);
        let claims = Claims {
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            user: user.clone(),
        };

        let key = self.keys.private_key().await?;
        let token = encode_claims(&claims, &key)?;

        // Report the second-precision expiry actually embedded in the token
        let expiry = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expiry);

        Ok(IssuedToken { token, expiry })
    }

    pub async fn parse(&self, token: &str) -> Result<UserSnapshot> {
        let key = self.keys.public_key().await?;
        decode_claims(token, &key).map(|claims| claims.user)
    }
}

/// Extract token from an Authorization header value
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let value = auth_header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// Extract token from a Cookie header value
pub fn extract_token_from_cookie(cookie_header: Option<&str>) -> Option<&str> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
