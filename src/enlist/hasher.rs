//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so the
//! salt and work factor travel with the hash and `verify` needs nothing else.

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("entropy source failure: {0}")]
    Entropy(String),
    #[error("invalid work factor: {0}")]
    Config(String),
    #[error("hashing failed: {0}")]
    Digest(String),
    #[error("hashing worker failed: {0}")]
    Worker(String),
}

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    /// Argon2 recommended parameters: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashConfig {
    #[must_use]
    pub const fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    fn params(self) -> Result<Params, HashError> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|err| HashError::Config(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SecretHasher {
    params: Params,
}

impl SecretHasher {
    /// # Errors
    /// Returns `HashError::Config` if the work factor is outside Argon2's limits.
    pub fn new(config: HashConfig) -> Result<Self, HashError> {
        Ok(Self {
            params: config.params()?,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext secret with a fresh random salt.
    ///
    /// # Errors
    /// Returns `HashError::Entropy` if the OS RNG fails, `HashError::Digest` otherwise.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let mut bytes = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| HashError::Entropy(err.to_string()))?;
        let salt =
            SaltString::encode_b64(&bytes).map_err(|err| HashError::Digest(err.to_string()))?;

        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| HashError::Digest(err.to_string()))
    }

    /// Returns `false` on mismatch and on hashes that do not parse.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            self.argon2()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok()
        })
    }

    /// Hash on the blocking pool so the async workers keep serving other requests.
    ///
    /// # Errors
    /// Same as [`SecretHasher::hash`], plus `HashError::Worker` if the blocking task
    /// panics or is cancelled.
    pub async fn hash_blocking(&self, plaintext: SecretString) -> Result<String, HashError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(plaintext.expose_secret()))
            .await
            .map_err(|err| HashError::Worker(err.to_string()))?
    }
}
