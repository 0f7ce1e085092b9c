//! Password hashing and verification using PBKDF2-HMAC-SHA256
//!
//! The derivation input is `password + pepper`; the per-user salt is random.
//! Iteration count, salt length and output length are shared by every user
//! record, so changing any of them invalidates every stored hash.

use pbkdf2::pbkdf2_hmac;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::config::{DERIVED_KEY_LENGTH, PEPPER_BYTES, SALT_BYTES};

/// Derive the stored hash for a password
pub fn derive_hash(password: &str, pepper: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let input = Zeroizing::new(format!("{}{}", password, pepper));
    let mut output = vec![0u8; DERIVED_KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(input.as_bytes(), salt, iterations, &mut output);
    output
}

/// Recompute the derivation and compare in constant time
pub fn verify_hash(
    password: &str,
    pepper: &str,
    expected: &[u8],
    salt: &[u8],
    iterations: u32,
) -> bool {
    let actual = derive_hash(password, pepper, salt, iterations);
    actual.ct_eq(expected).into()
}

pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// A fresh hex-encoded pepper
pub fn generate_pepper() -> String {
    let mut bytes = [0u8; PEPPER_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Random alphanumeric password for generated accounts
pub fn generate_password(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITERATIONS: u32 = 1_000;

    #[test]
    fn test_hash_and_verify() {
        let salt = generate_salt();
        let hash = derive_hash("SomeRandomPassword", "pepper", &salt, ITERATIONS);
        assert_eq!(hash.len(), DERIVED_KEY_LENGTH);

        assert!(verify_hash("SomeRandomPassword", "pepper", &hash, &salt, ITERATIONS));
        assert!(!verify_hash("SomeRandomPassworda", "pepper", &hash, &salt, ITERATIONS));
    }

    #[test]
    fn test_pepper_changes_hash() {
        let salt = generate_salt();
        let hash = derive_hash("password", "pepper-one", &salt, ITERATIONS);
        assert!(!verify_hash("password", "pepper-two", &hash, &salt, ITERATIONS));
    }

    #[test]
    fn test_different_salts() {
        let hash1 = derive_hash("same-password", "p", &generate_salt(), ITERATIONS);
        let hash2 = derive_hash("same-password", "p", &generate_salt(), ITERATIONS);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_truncated_hash_does_not_verify() {
        let salt = generate_salt();
        let hash = derive_hash("password", "p", &salt, ITERATIONS);
        assert!(!verify_hash("password", "p", &hash[..16], &salt, ITERATIONS));
    }

    #[test]
    fn test_generated_values() {
        assert_eq!(generate_salt().len(), SALT_BYTES);

        let pepper = generate_pepper();
        assert_eq!(pepper.len(), PEPPER_BYTES * 2);
        assert!(pepper.chars().all(|c| c.is_ascii_hexdigit()));

        let password = generate_password(24);
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
