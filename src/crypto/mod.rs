//! Password hashing and opaque token helpers.
//!
//! Passwords are stored as Argon2id PHC strings. Session and reset tokens are
//! random hex strings handed to the client once; only their SHA-256 digest is
//! persisted.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::Argon2Config;

/// Bytes of entropy in a session token (256 bits)
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Bytes of entropy in a password reset token
pub const RESET_TOKEN_BYTES: usize = 24;

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Argon2id hasher with configured cost parameters.
#[derive(Clone)]
pub struct PasswordHashing {
    params: Params,
    /// Hash verified against when the account does not exist, so that an
    /// unknown email costs as much as a wrong password.
    dummy_hash: String,
}

impl PasswordHashing {
    pub fn new(config: &Argon2Config) -> Result<Self, HashError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| HashError(e.to_string()))?;

        let mut hashing = Self {
            params,
            dummy_hash: String::new(),
        };
        hashing.dummy_hash = hashing.hash("superclient-dummy-password")?;
        Ok(hashing)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored PHC string.
    ///
    /// The cost parameters embedded in the stored hash are used, so hashes
    /// written under older settings keep verifying.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Spend one verification worth of work and discard the result
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }

    /// [`hash`](Self::hash) on the blocking thread pool
    pub async fn hash_blocking(&self, password: &str) -> Result<String, HashError> {
        let hashing = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hashing.hash(&password))
            .await
            .map_err(|e| HashError(e.to_string()))?
    }

    /// Verify on the blocking thread pool. `None` as the stored hash runs the
    /// dummy verification and always fails.
    pub async fn verify_blocking(&self, password: &str, hash: Option<&str>) -> bool {
        let hashing = self.clone();
        let password = password.to_string();
        let hash = hash.map(str::to_string);
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hashing.verify(&password, &hash),
            None => {
                hashing.verify_dummy(&password);
                false
            }
        })
        .await
        .unwrap_or(false)
    }
}

impl std::fmt::Debug for PasswordHashing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHashing")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Generate a random hex token carrying `bytes` bytes of entropy
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) fn test_hashing() -> PasswordHashing {
    PasswordHashing::new(&Argon2Config {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}
