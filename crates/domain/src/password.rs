//! Password hashing.

use common::Result;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Turns passwords into stored hashes and checks them back.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    /// Returns true if `password` produced `hash`.
    fn verify(&self, hash: &str, password: &str) -> bool;
}

/// Salted SHA-256 stored as `<salt>$<hex digest>`, with a fresh salt per
/// password.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl PasswordHasher for Sha256Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = digest(&salt, password);
        Ok(format!("{salt}${digest}"))
    }

    fn verify(&self, hash: &str, password: &str) -> bool {
        hash.split_once('$')
            .is_some_and(|(salt, expected)| digest(salt, password) == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_hashed_password() {
        let hash = Sha256Hasher.hash("secret").unwrap();
        assert!(Sha256Hasher.verify(&hash, "secret"));
        assert!(!Sha256Hasher.verify(&hash, "Secret"));
        assert!(!Sha256Hasher.verify("no-separator", "secret"));
    }

    #[test]
    fn same_password_hashes_differently() {
        let first = Sha256Hasher.hash("secret").unwrap();
        let second = Sha256Hasher.hash("secret").unwrap();
        assert_ne!(first, second);
        assert!(!first.contains("secret"));
    }
}
