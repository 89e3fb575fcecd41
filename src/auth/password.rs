use bcrypt::{ hash, verify };

use super::AuthError;

/// Hashing is CPU bound; run it on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task
        ::spawn_blocking(move || hash(password, cost)).await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .map_err(AuthError::from)
}

pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    tokio::task
        ::spawn_blocking(move || verify(password, &password_hash)).await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .map_err(AuthError::from)
}
