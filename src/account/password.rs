/// Argon2id password hashing and password strength rules
use crate::{
    config::AuthConfig,
    error::{ApiError, ApiResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

const MIN_PASSWORD_LENGTH: usize = 8;

/// Password hasher with configurable cost
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &AuthConfig) -> ApiResult<Self> {
        let params = Params::new(config.argon2_memory_kib, config.argon2_iterations, 1, None)
            .map_err(|e| ApiError::Internal(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into a PHC string
    pub fn hash(&self, password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored PHC string
    pub fn verify(&self, password: &str, hash: &str) -> ApiResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| ApiError::Internal(format!("Stored password hash is invalid: {}", e)))?;

        // Parameters are read from the PHC string, so older hashes still verify
        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Check password strength, returning field messages for every failed rule
pub fn password_problems(password: &str, email: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    let local_part = email.split('@').next().unwrap_or_default();
    if local_part.len() >= 3 && password.eq_ignore_ascii_case(local_part) {
        problems.push("The password is too similar to the email address.".to_string());
    }

    problems
}
