//! Configuration for Umbrella IAM
//!
//! CLI arguments and environment variable handling using clap, plus the
//! fixed cryptographic constants shared by every user record.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

// =============================================================================
// Fixed constants
// =============================================================================

/// Per-user salt length in bytes
pub const SALT_BYTES: usize = 32;

/// PBKDF2 derived key length in bytes
pub const DERIVED_KEY_LENGTH: usize = 32;

/// Random bytes in a freshly generated pepper (stored hex-encoded)
pub const PEPPER_BYTES: usize = 32;

/// Secret store name of the password pepper
pub const PEPPER_SECRET_NAME: &str = "PASSWORD-PEPPER";

/// Cookie carrying the bearer token
pub const AUTH_COOKIE_NAME: &str = "authorization_token";

/// Role that passes every authorization check
pub const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";

/// Length of passwords generated for bootstrap accounts
pub const GENERATED_PASSWORD_LENGTH: usize = 24;

/// Smallest RSA modulus accepted for the signing key
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Maximum accepted request body size
pub const MAX_BODY_BYTES: usize = 16 * 1024;

// =============================================================================
// Store backends
// =============================================================================

/// Where named secrets (private key, pepper) live
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    Mongo,
    Memory,
}

/// Where the public key file is published
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBackend {
    Filesystem,
    Memory,
}

// =============================================================================
// Args
// =============================================================================

/// Umbrella IAM - credentials, roles and signed bearer tokens
#[derive(Parser, Debug, Clone)]
#[command(name = "umbrella-iam")]
#[command(about = "Identity and access management service")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallbacks, cookie without Secure)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI (users, roles, and Mongo-backed secrets)
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "umbrella_iam")]
    pub mongodb_db: String,

    /// Secret store backend
    #[arg(long, env = "SECRET_STORE", value_enum, default_value = "mongo")]
    pub secret_store: SecretBackend,

    /// Object store backend
    #[arg(long, env = "OBJECT_STORE", value_enum, default_value = "filesystem")]
    pub object_store: ObjectBackend,

    /// Root directory of the filesystem object store
    #[arg(long, env = "OBJECT_STORE_ROOT", default_value = "./objects")]
    pub object_store_root: PathBuf,

    /// Public URL prefix under which object store containers are served
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Application name, used to derive key and container names
    #[arg(long, env = "APP_NAME", default_value = "Umbrella")]
    pub app_name: String,

    /// Deployment environment, used to derive key and container names
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,

    /// RSA modulus size for newly generated signing keys
    #[arg(long, env = "RSA_KEY_BITS", default_value = "4096")]
    pub rsa_key_bits: usize,

    /// PBKDF2 iteration count (changing it invalidates existing hashes)
    #[arg(long, env = "PBKDF2_ITERATIONS", default_value = "600000")]
    pub pbkdf2_iterations: u32,

    /// Bearer token lifetime in minutes
    #[arg(long, env = "TOKEN_EXPIRY_MINUTES", default_value = "30")]
    pub token_expiry_minutes: i64,

    /// Comma-separated super-admin accounts created by bootstrap
    #[arg(long, env = "SUPER_ADMIN_USERNAMES", default_value = "")]
    pub super_admin_usernames: String,

    /// Comma-separated CORS origins allowed to send credentials
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    pub allowed_origins: String,

    /// Mark the authorization cookie Secure
    #[arg(long, env = "COOKIE_SECURE", default_value_t = true, action = clap::ArgAction::Set)]
    pub cookie_secure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Names and sizes governing the signing keypair
#[derive(Debug, Clone)]
pub struct KeyConfig {
    /// Secret store name of the PKCS#8 private key
    pub private_key_secret: String,
    /// Object store container holding the public key
    pub public_container: String,
    /// Object store file name of the PKCS#1 public key
    pub public_key_file: String,
    pub rsa_key_bits: usize,
}

impl KeyConfig {
    pub fn new(app_name: &str, environment: &str, rsa_key_bits: usize) -> Self {
        let app = app_name.to_lowercase();
        let env = environment.to_lowercase();
        Self {
            private_key_secret: format!("{}-RSA-Key", app_name),
            public_container: format!("{}-iam-{}-public", app, env),
            public_key_file: format!("{}-public-key-{}.pub", app, env),
            rsa_key_bits,
        }
    }
}

/// Password derivation settings
#[derive(Debug, Clone, Copy)]
pub struct CredentialConfig {
    pub iterations: u32,
}

/// Bearer token settings
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub expiry_minutes: i64,
}

/// Cookie and CORS settings of the HTTP surface
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub cookie_secure: bool,
    pub allowed_origins: Vec<String>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Args {
    pub fn key_config(&self) -> KeyConfig {
        KeyConfig::new(&self.app_name, &self.environment, self.rsa_key_bits)
    }

    pub fn credential_config(&self) -> CredentialConfig {
        CredentialConfig {
            iterations: self.pbkdf2_iterations,
        }
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            expiry_minutes: self.token_expiry_minutes,
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            cookie_secure: self.cookie_secure && !self.dev_mode,
            allowed_origins: self.allowed_origin_list(),
        }
    }

    /// Default super-admin accounts ensured by bootstrap
    pub fn super_admin_list(&self) -> Vec<String> {
        split_list(&self.super_admin_usernames)
    }

    pub fn allowed_origin_list(&self) -> Vec<String> {
        split_list(&self.allowed_origins)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(format!(
                "RSA_KEY_BITS must be at least {}",
                MIN_RSA_KEY_BITS
            ));
        }

        if self.pbkdf2_iterations == 0 {
            return Err("PBKDF2_ITERATIONS must be greater than zero".to_string());
        }

        if self.token_expiry_minutes <= 0 {
            return Err("TOKEN_EXPIRY_MINUTES must be greater than zero".to_string());
        }

        if self.mongodb_uri.is_none() {
            if self.secret_store == SecretBackend::Mongo {
                return Err("MONGODB_URI is required for the mongo secret store".to_string());
            }
            if !self.dev_mode {
                return Err("MONGODB_URI is required in production mode".to_string());
            }
        }

        Ok(())
    }
}
