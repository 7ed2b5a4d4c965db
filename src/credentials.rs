//! The credential subsystem: password hashing, registration, login with the
//! legacy plaintext upgrade path, verification/reset codes, and the Google
//! sign-in upsert.
//!
//! Uniqueness is never pre-checked: the `users.email` UNIQUE constraint is
//! the guarantee, and violations are translated to `Conflict`. Code
//! redemption is one conditional UPDATE that also clears the code, so of N
//! concurrent redemptions exactly one succeeds.

use anyhow::Context as _;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::Utc;
use rand::Rng as _;
use tracing::info;

use crate::db::Db;
use crate::error::{Error, is_unique_violation};
use crate::models::User;

/// Verification codes are valid for 10 minutes.
pub const VERIFICATION_TTL_MS: i64 = 10 * 60 * 1000;
/// Password reset codes are valid for 1 hour.
pub const RESET_TTL_MS: i64 = 60 * 60 * 1000;

pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), salt.as_salt())
        .context("failed to hash password")?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Whether a stored credential is a recognized argon2 hash. Anything else
/// is treated as a legacy plaintext password eligible for upgrade-on-login.
pub fn is_password_hash(stored: &str) -> bool {
    stored.starts_with("$argon2")
}

/// A random 6-digit numeric code for email verification or password reset.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// A random 12-character temporary password for generated officer accounts.
pub fn generate_password() -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%";
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
        .collect()
}

pub fn generate_username(first_name: &str, last_name: &str) -> String {
    let n = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}.{}.{n}",
        first_name.to_lowercase(),
        last_name.to_lowercase()
    )
}

pub struct NewUser {
    pub username: Option<String>,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_photo: Option<String>,
}

/// Create a regular user account.
///
/// The row is inserted unverified and immediately promoted in the same
/// transaction; there is no verification gate on login, only the optional
/// code flow.
pub async fn register(db: &Db, new_user: NewUser) -> Result<User, Error> {
    let hash = hash_password(&new_user.password)?;

    let mut tx = db.begin().await?;

    let inserted = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password, first_name, last_name, profile_photo, role)
         VALUES (?, ?, ?, ?, ?, ?, 'user')
         RETURNING *",
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&hash)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(&new_user.profile_photo)
    .fetch_one(&mut *tx)
    .await;

    let user = match inserted {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            return Err(Error::conflict("Email already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET email_verified = 1, updated_at = datetime('now')
         WHERE id = ? RETURNING *",
    )
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("new account: {}", user.email);
    Ok(user)
}

/// Authenticate by email and password.
///
/// A stored credential that is not a recognized hash is compared as
/// plaintext; on success it is transparently rehashed and persisted, so the
/// next login verifies against a real hash.
pub async fn login(db: &Db, email: &str, password: &str) -> Result<User, Error> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::auth("Invalid credentials"))?;

    let stored = user
        .password
        .as_deref()
        .ok_or_else(|| Error::auth("Invalid credentials"))?;

    let matched = if is_password_hash(stored) {
        verify_password(password, stored)
    } else {
        let plaintext_match = stored == password;
        if plaintext_match {
            let rehashed = hash_password(password)?;
            sqlx::query("UPDATE users SET password = ?, updated_at = datetime('now') WHERE id = ?")
                .bind(&rehashed)
                .bind(user.id)
                .execute(db)
                .await?;
        }
        plaintext_match
    };

    if !matched {
        return Err(Error::auth("Invalid credentials"));
    }

    if user.status != "active" || !user.is_active {
        return Err(Error::forbidden("Account is inactive"));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET last_login = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(user.id)
    .fetch_one(db)
    .await?;

    Ok(user)
}

/// Persist a fresh code with the given lifetime on the user row and return
/// it for delivery. Reissuing replaces any previous code.
pub async fn issue_code(db: &Db, email: &str, ttl_ms: i64) -> Result<(User, String), Error> {
    let code = generate_code();
    let expiry = Utc::now().timestamp_millis() + ttl_ms;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET reset_code = ?, reset_code_expiry = ?, updated_at = datetime('now')
         WHERE email = ? RETURNING *",
    )
    .bind(&code)
    .bind(expiry)
    .bind(email)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::not_found("Email not found"))?;

    Ok((user, code))
}

/// Redeem a verification code: marks the email verified and clears the code
/// in one conditional update.
pub async fn verify_email(db: &Db, email: &str, code: &str) -> Result<(), Error> {
    let now = Utc::now().timestamp_millis();
    let redeemed = sqlx::query(
        "UPDATE users
         SET email_verified = 1, reset_code = NULL, reset_code_expiry = NULL,
             updated_at = datetime('now')
         WHERE email = ? AND reset_code = ? AND reset_code_expiry > ?",
    )
    .bind(email)
    .bind(code)
    .bind(now)
    .execute(db)
    .await?;

    if redeemed.rows_affected() == 1 {
        return Ok(());
    }
    Err(classify_code_failure(db, email, code).await?)
}

/// Redeem a reset code and set the new password in one conditional update.
/// All existing sessions for the user are revoked.
pub async fn reset_password(
    db: &Db,
    email: &str,
    code: &str,
    new_password: &str,
) -> Result<(), Error> {
    let hash = hash_password(new_password)?;
    let now = Utc::now().timestamp_millis();

    let redeemed = sqlx::query_as::<_, User>(
        "UPDATE users
         SET password = ?, reset_code = NULL, reset_code_expiry = NULL,
             updated_at = datetime('now')
         WHERE email = ? AND reset_code = ? AND reset_code_expiry > ?
         RETURNING *",
    )
    .bind(&hash)
    .bind(email)
    .bind(code)
    .bind(now)
    .fetch_optional(db)
    .await?;

    match redeemed {
        Some(user) => {
            crate::auth::revoke_sessions(db, user.id).await?;
            Ok(())
        }
        None => Err(classify_code_failure(db, email, code).await?),
    }
}

/// The conditional update did not match; work out why. The read here only
/// classifies the failure, it is not part of the redemption guarantee.
async fn classify_code_failure(db: &Db, email: &str, code: &str) -> Result<Error, Error> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    match (&user.reset_code, user.reset_code_expiry) {
        (Some(stored), Some(expiry)) if stored == code => {
            if expiry <= Utc::now().timestamp_millis() {
                Ok(Error::ExpiredCode("Code has expired".to_owned()))
            } else {
                // Matched and unexpired yet the update missed: another
                // request redeemed it between our two statements.
                Ok(Error::InvalidCode("Invalid code".to_owned()))
            }
        }
        _ => Ok(Error::InvalidCode("Invalid code".to_owned())),
    }
}

/// Verify the current password and store a new hash.
pub async fn change_password(
    db: &Db,
    user_id: i64,
    old_password: &str,
    new_password: &str,
) -> Result<(), Error> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    let stored = user
        .password
        .as_deref()
        .ok_or_else(|| Error::auth("Current password is incorrect"))?;

    let matched = if is_password_hash(stored) {
        verify_password(old_password, stored)
    } else {
        stored == old_password
    };
    if !matched {
        return Err(Error::auth("Current password is incorrect"));
    }

    let hash = hash_password(new_password)?;
    sqlx::query("UPDATE users SET password = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(&hash)
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(())
}

/// Idempotent Google sign-in upsert. An existing account registered through
/// another method conflicts rather than being silently linked.
pub async fn google_signin(
    db: &Db,
    email: &str,
    display_name: Option<&str>,
    photo_url: Option<&str>,
) -> Result<User, Error> {
    if let Some(user) = fetch_google_user(db, email).await? {
        return Ok(user);
    }

    let (first_name, last_name) = split_display_name(display_name);
    let username = email.split('@').next().unwrap_or(email).to_owned();

    let inserted = sqlx::query_as::<_, User>(
        "INSERT INTO users
             (username, email, password, first_name, last_name, profile_photo,
              role, email_verified, auth_method)
         VALUES (?, ?, NULL, ?, ?, ?, 'user', 1, 'GOOGLE')
         RETURNING *",
    )
    .bind(&username)
    .bind(email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(photo_url)
    .fetch_one(db)
    .await;

    match inserted {
        Ok(user) => {
            info!("new Google account: {}", user.email);
            Ok(user)
        }
        Err(err) if is_unique_violation(&err) => {
            // Lost a creation race; the row now exists, re-run the lookup.
            fetch_google_user(db, email)
                .await?
                .ok_or_else(|| Error::conflict("This email is already registered"))
        }
        Err(err) => Err(err.into()),
    }
}

async fn fetch_google_user(db: &Db, email: &str) -> Result<Option<User>, Error> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?;

    match user {
        Some(user) if user.auth_method != "GOOGLE" => Err(Error::conflict(
            "This email is already registered. Please sign in with username and password.",
        )),
        other => Ok(other),
    }
}

fn split_display_name(display_name: Option<&str>) -> (String, String) {
    let name = display_name.unwrap_or("").trim();
    if name.is_empty() {
        return ("User".to_owned(), "Account".to_owned());
    }
    match name.split_once(' ') {
        Some((first, last)) => (first.to_owned(), last.to_owned()),
        None => (name.to_owned(), "Account".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(is_password_hash(&hash));
        assert!(verify_password("hunter2!", &hash));
        assert!(!verify_password("hunter3!", &hash));
    }

    #[test]
    fn plaintext_is_not_a_hash() {
        assert!(!is_password_hash("password123"));
        assert!(!is_password_hash(""));
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn generated_passwords_are_twelve_chars() {
        let password = generate_password();
        assert_eq!(password.len(), 12);
    }

    #[test]
    fn display_name_splitting() {
        assert_eq!(
            split_display_name(Some("Alice Santos")),
            ("Alice".to_owned(), "Santos".to_owned())
        );
        assert_eq!(
            split_display_name(Some("Cher")),
            ("Cher".to_owned(), "Account".to_owned())
        );
        assert_eq!(
            split_display_name(None),
            ("User".to_owned(), "Account".to_owned())
        );
    }
}
