//! Credential hashing with Argon2id.
//!
//! Hashing and verification run on the blocking thread pool so the slow hash
//! cannot starve the async runtime under concurrent logins.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};

// OWASP-recommended Argon2id parameters.
const MEMORY_COST_KIB: u32 = 19_456;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;
const OUTPUT_LEN: usize = 32;

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a PHC-format digest.
///
/// # Errors
/// Returns an error if hashing fails; the plaintext is never logged.
pub(crate) async fn hash_password(plaintext: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let digest = hasher()?
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(digest.to_string())
    })
    .await
    .context("password hashing task failed")?
}

/// Verify a plaintext password against a stored digest.
///
/// A malformed digest verifies as `false` so callers treat it as invalid
/// credentials rather than a system error.
///
/// # Errors
/// Returns an error only if the blocking task itself fails.
pub(crate) async fn verify_password(plaintext: String, digest: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&digest) else {
            return false;
        };
        // Parameters are read back from the digest itself.
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .context("password verification task failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_and_verify_round_trip() -> Result<()> {
        let digest = hash_password("Aa1!aaaa".to_string()).await?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(verify_password("Aa1!aaaa".to_string(), digest.clone()).await?);
        assert!(!verify_password("wrong-password1".to_string(), digest).await?);
        Ok(())
    }

    #[tokio::test]
    async fn same_password_hashes_differently() -> Result<()> {
        let first = hash_password("Aa1!aaaa".to_string()).await?;
        let second = hash_password("Aa1!aaaa".to_string()).await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_digest_verifies_false() -> Result<()> {
        assert!(!verify_password("anything1".to_string(), "not-a-digest".to_string()).await?);
        assert!(!verify_password("anything1".to_string(), String::new()).await?);
        Ok(())
    }
}
