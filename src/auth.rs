//! Session handling and request authentication.
//!
//! Sessions are opaque random identifiers persisted with an expiry, not
//! reversible or self-describing tokens: possession of the id is the whole
//! credential, lookups join the user row, and revocation is a DELETE.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{AppState, db::Db, error::Error, metrics};

/// Mint a new session for `user_id` and return its opaque id.
pub async fn create_session(db: &Db, user_id: i64, ttl_hours: i64) -> Result<String, Error> {
    let id = Uuid::new_v4().to_string();
    let expires_at = (Utc::now() + Duration::hours(ttl_hours))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(user_id)
        .bind(expires_at)
        .execute(db)
        .await?;

    Ok(id)
}

/// Revoke every session belonging to `user_id`. Called after password
/// resets so a leaked session does not outlive the credential change.
pub async fn revoke_sessions(db: &Db, user_id: i64) -> Result<(), Error> {
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// The caller behind a valid, unexpired session.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub display_name: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    email: String,
    role: String,
    status: String,
    is_active: bool,
    first_name: String,
    last_name: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| Error::auth("missing bearer token"))?;

        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT u.id, u.email, u.role, u.status, u.is_active, u.first_name, u.last_name
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.id = ? AND s.expires_at > datetime('now')",
        )
        .bind(token)
        .fetch_optional(&state.db)
        .await?;

        let Some(row) = row else {
            ::metrics::counter!(metrics::AUTH_FAILED).increment(1);
            return Err(Error::auth("invalid or expired session"));
        };

        if row.status != "active" || !row.is_active {
            return Err(Error::forbidden("account is inactive"));
        }

        Ok(Self {
            id: row.id,
            email: row.email,
            role: row.role,
            display_name: format!("{} {}", row.first_name, row.last_name)
                .trim()
                .to_owned(),
        })
    }
}

/// An authenticated caller with the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.role != "admin" {
            return Err(Error::forbidden("admin role required"));
        }
        Ok(Self(user))
    }
}
