//! Authentication and authorization for Umbrella IAM
//!
//! Provides:
//! - PBKDF2 password hashing with a shared pepper
//! - RS256 bearer token issuance and validation
//! - Single-role allow-list checks with an implicit super-admin

pub mod jwt;
pub mod password;
pub mod permissions;

pub use jwt::{
    decode_claims, encode_claims, extract_token_from_cookie, extract_token_from_header, Claims,
    IssuedToken, TokenService,
};
pub use password::{derive_hash, generate_password, generate_pepper, generate_salt, verify_hash};
pub use permissions::{can_act_on, is_authorized, is_super_admin};
