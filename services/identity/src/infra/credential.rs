use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::config::IdentityConfig;
use crate::domain::repository::CredentialVerifier;
use crate::domain::types::HashedPassword;
use crate::error::ErrorKind;

/// Argon2id password hashing with PHC-encoded output.
#[derive(Clone)]
pub struct Argon2Verifier {
    argon2: Argon2<'static>,
    dummy: HashedPassword,
}

impl Argon2Verifier {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, ErrorKind> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow!("invalid argon2 params: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy = hash_with(&argon2, "gatehouse-dummy-password")?;
        Ok(Self { argon2, dummy })
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self, ErrorKind> {
        Self::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
        )
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<HashedPassword, ErrorKind> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?
        .to_string();
    Ok(HashedPassword::new(hash))
}

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, password: &str) -> Result<HashedPassword, ErrorKind> {
        hash_with(&self.argon2, password)
    }

    fn verify(&self, password: &str, hash: &HashedPassword) -> Result<bool, ErrorKind> {
        let parsed = PasswordHash::new(hash.as_str())
            .map_err(|e| anyhow!("invalid password hash format: {e}"))?;
        // Parameters are read from the encoded hash, so hashes made under older
        // cost settings still verify.
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("password verification failed: {e}").into()),
        }
    }

    fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy);
    }
}
