use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Input rejected before any statement ran.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A unique, foreign key or check constraint refused the write.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("DB lock poisoned: {0}")]
    LockPoisoned(String),
}

impl DbError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                Self::Integrity(msg.unwrap_or_else(|| e.to_string()))
            }
            other => Self::Sqlite(other),
        }
    }
}

impl From<argon2::password_hash::Error> for DbError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::PasswordHash(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
