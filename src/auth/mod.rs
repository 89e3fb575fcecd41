pub mod password;
pub mod session;

use log::info;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::chat::User;
use self::password::{ hash_password, verify_password };

pub use session::{ SessionKeys, SessionUser };

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Session is invalid or expired")]
    InvalidSession,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Errors the user can act on, shown back on the form.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::UsernameTaken | AuthError::Validation(_)
        )
    }
}

#[derive(Clone)]
pub struct AuthService {
    db: SqlitePool,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(db: SqlitePool) -> Self {
        Self::with_hash_cost(db, bcrypt::DEFAULT_COST)
    }

    pub fn with_hash_cost(db: SqlitePool, hash_cost: u32) -> Self {
        Self { db, hash_cost }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        validate_credentials(username, password)?;

        if self.username_exists(username).await? {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = hash_password(password, self.hash_cost).await?;
        let result = sqlx
            ::query("INSERT INTO user (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(&password_hash)
            .execute(&self.db).await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            // Lost a race against a concurrent registration.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AuthError::UsernameTaken);
            }
            Err(e) => {
                return Err(e.into());
            }
        };

        info!("Registered user {} ({})", username, id);
        Ok(User {
            id,
            username: username.to_string(),
            password_hash,
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .get_user_by_username(username.trim()).await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        info!("User {} logged in", user.username);
        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, AuthError> {
        let user = sqlx
            ::query_as::<_, User>("SELECT id, username, password_hash FROM user WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db).await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx
            ::query_as::<_, User>("SELECT id, username, password_hash FROM user WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db).await?;
        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AuthError> {
        let count: (i64,) = sqlx
            ::query_as("SELECT COUNT(*) FROM user WHERE username = ?")
            .bind(username)
            .fetch_one(&self.db).await?;
        Ok(count.0 > 0)
    }
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LEN || len > MAX_USERNAME_LEN {
        return Err(
            AuthError::Validation(
                format!(
                    "Username must be between {} and {} characters",
                    MIN_USERNAME_LEN,
                    MAX_USERNAME_LEN
                )
            )
        );
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(
            AuthError::Validation(
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN)
            )
        );
    }
    Ok(())
}
