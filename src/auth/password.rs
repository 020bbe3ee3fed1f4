use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

fn hash_blocking(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!("cannot hash password: {e}")
        })
}

fn verify_blocking(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash is not a PHC string");
        anyhow::anyhow!("stored password hash is unreadable: {e}")
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Argon2 hash of a registration password, computed on the blocking pool.
pub async fn hash_password(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_blocking(&plain))
        .await
        .context("password hashing task failed")?
}

/// Checks a login attempt against the stored PHC string, on the blocking pool.
pub async fn verify_password(plain: String, stored: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_blocking(&plain, &stored))
        .await
        .context("password verification task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registration_hash_verifies_only_its_password() {
        let hash = hash_password("password123".into()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("password123"));
        assert!(verify_password("password123".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("password124".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let a = hash_password("password123".into()).await.unwrap();
        let b = hash_password("password123".into()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unreadable_stored_hash_is_an_error() {
        let err = verify_password("anything".into(), "plain-text".into())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unreadable"));
    }
}
