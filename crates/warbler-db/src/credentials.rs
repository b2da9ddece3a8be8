use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString},
};
use rand_core::OsRng;
use tracing::{debug, info, warn};

use crate::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, NewUser, UserRow};
use crate::{Database, DbError, Result};

/// Hash a password with Argon2id, returning the PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Hash checked when the username is unknown, so both failure paths pay for
/// one Argon2 verification.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| match hash_password("warbler-dummy-password") {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Could not prepare dummy password hash: {}", e);
                None
            }
        })
        .as_deref()
}

impl Database {
    /// Validate and hash the credential, then insert the user.
    ///
    /// Validation happens before the database is touched. A taken username
    /// or email comes back from the insert as `DbError::Integrity`.
    pub fn signup(&self, new: &NewUser) -> Result<UserRow> {
        if new.username.trim().is_empty() {
            return Err(DbError::validation("username is required"));
        }
        if new.email.trim().is_empty() {
            return Err(DbError::validation("email is required"));
        }
        let password = new
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DbError::validation("password must be non-empty"))?;

        let password_hash = hash_password(password)?;
        let image_url = new
            .image_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_IMAGE_URL)
            .to_string();
        let created_at = crate::timestamp_now();

        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password, image_url, header_image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.username,
                    new.email,
                    password_hash,
                    image_url,
                    DEFAULT_HEADER_IMAGE_URL,
                    created_at
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!(user_id = id, username = %new.username, "User signed up");
        Ok(UserRow {
            id,
            username: new.username.clone(),
            email: new.email.clone(),
            password: password_hash,
            image_url,
            header_image_url: DEFAULT_HEADER_IMAGE_URL.to_string(),
            bio: None,
            location: None,
            created_at,
        })
    }

    /// Returns the user when the password verifies. Unknown usernames and
    /// wrong passwords are both `Ok(None)`.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRow>> {
        let Some(user) = self.get_user_by_username(username)? else {
            debug!(%username, "Authentication for unknown user");
            if let Some(hash) = dummy_hash() {
                verify_password(password, hash)?;
            }
            return Ok(None);
        };

        if verify_password(password, &user.password)? {
            Ok(Some(user))
        } else {
            debug!(%username, "Authentication with wrong password");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str, password: Option<&str>) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password: password.map(Into::into),
            image_url: None,
        }
    }

    #[test]
    fn signup_stores_hash_not_plaintext() {
        let db = Database::open_in_memory().unwrap();
        let user = db.signup(&new_user("tuser", "tuser@user.com", Some("pass"))).unwrap();

        let stored = db.get_user_by_id(user.id).unwrap().unwrap();
        assert_eq!(stored.username, "tuser");
        assert_ne!(stored.password, "pass");
        assert!(stored.password.starts_with("$argon2"));
        assert_eq!(stored.image_url, DEFAULT_IMAGE_URL);
    }

    #[test]
    fn signup_keeps_custom_image() {
        let db = Database::open_in_memory().unwrap();
        let mut new = new_user("pic", "pic@test.com", Some("pass"));
        new.image_url = Some("https://img.test/me.png".into());

        let user = db.signup(&new).unwrap();
        assert_eq!(user.image_url, "https://img.test/me.png");
    }

    #[test]
    fn signup_rejects_empty_or_missing_password() {
        let db = Database::open_in_memory().unwrap();

        let empty = db.signup(&new_user("testtest", "email@email.com", Some("")));
        assert!(matches!(empty, Err(DbError::Validation(_))));

        let missing = db.signup(&new_user("testtest", "email@email.com", None));
        assert!(matches!(missing, Err(DbError::Validation(_))));

        assert!(db.get_user_by_username("testtest").unwrap().is_none());
    }

    #[test]
    fn signup_rejects_duplicate_username_and_email() {
        let db = Database::open_in_memory().unwrap();
        db.signup(&new_user("test1", "test1@email.com", Some("testpass"))).unwrap();

        let same_name = db.signup(&new_user("test1", "other@email.com", Some("passs")));
        assert!(matches!(same_name, Err(DbError::Integrity(_))));

        let same_email = db.signup(&new_user("other", "test1@email.com", Some("passs")));
        assert!(matches!(same_email, Err(DbError::Integrity(_))));
    }

    #[test]
    fn authenticate_outcomes() {
        let db = Database::open_in_memory().unwrap();
        let user = db.signup(&new_user("test1", "test1@email.com", Some("testpass"))).unwrap();

        let ok = db.authenticate("test1", "testpass").unwrap();
        assert_eq!(ok.map(|u| u.id), Some(user.id));

        assert!(db.authenticate("test1", "1").unwrap().is_none());
        assert!(db.authenticate("tttttt", "testpass").unwrap().is_none());
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(verify_password("pass", "not-a-phc-string").is_err());
    }

    #[test]
    fn unknown_user_still_runs_a_verification() {
        let hash = dummy_hash().unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!verify_password("testpass", hash).unwrap());

        let db = Database::open_in_memory().unwrap();
        assert!(db.authenticate("nobody", "testpass").unwrap().is_none());
    }
}
