use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Result,
    auth::{AdminUser, AuthenticatedUser},
    credentials,
    db::Db,
    error::{Envelope, Error},
    logging::log_activity,
    models::{User, UserView},
    services::Services,
};

/// Columns safe to project to clients; keep in sync with `UserView`.
const USER_VIEW_COLUMNS: &str = "id, username, email, first_name, last_name, role, status, \
     email_verified, is_active, profile_completed, profile_photo, auth_method, \
     last_login, created_at";

fn ensure_self_or_admin(caller: &AuthenticatedUser, user_id: i64) -> Result<()> {
    if caller.id == user_id || caller.role == "admin" {
        Ok(())
    } else {
        Err(Error::forbidden("not allowed to manage this account"))
    }
}

async fn list_users(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<Vec<UserView>>>> {
    let users = sqlx::query_as::<_, UserView>(&format!(
        "SELECT {USER_VIEW_COLUMNS} FROM users ORDER BY created_at DESC"
    ))
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(users))
}

async fn get_user(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<UserView>>> {
    let user = sqlx::query_as::<_, UserView>(&format!(
        "SELECT {USER_VIEW_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("User not found"))?;

    Ok(Envelope::data(user))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserInput {
    first_name: Option<String>,
    last_name: Option<String>,
    is_active: Option<bool>,
    profile_photo: Option<String>,
}

async fn update_user(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<Envelope<UserView>>> {
    ensure_self_or_admin(&caller, id)?;
    if input.is_active.is_some() && caller.role != "admin" {
        return Err(Error::forbidden("only admins can change account activation"));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET
             first_name = COALESCE(?, first_name),
             last_name = COALESCE(?, last_name),
             is_active = COALESCE(?, is_active),
             profile_photo = COALESCE(?, profile_photo),
             updated_at = datetime('now')
         WHERE id = ?
         RETURNING *",
    )
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(input.is_active)
    .bind(&input.profile_photo)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("User not found"))?;

    Ok(Envelope::data(user.into()))
}

async fn delete_user(
    admin: AdminUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("User not found"));
    }

    log_activity(&db, admin.0.id, "delete_user", Some("user"), Some(id), None).await;
    Ok(Envelope::message("User deleted successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushTokenInput {
    user_id: i64,
    push_token: String,
    device_id: Option<String>,
}

async fn save_push_token(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<PushTokenInput>,
) -> Result<Json<Envelope<()>>> {
    ensure_self_or_admin(&caller, input.user_id)?;

    let result = sqlx::query(
        "UPDATE users SET push_token = ?, device_id = ?, updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(&input.push_token)
    .bind(&input.device_id)
    .bind(input.user_id)
    .execute(&db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("User not found"));
    }
    Ok(Envelope::message("Push token saved successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordInput {
    old_password: String,
    new_password: String,
}

async fn change_password(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<ChangePasswordInput>,
) -> Result<Json<Envelope<()>>> {
    ensure_self_or_admin(&caller, id)?;
    if input.new_password.is_empty() {
        return Err(Error::validation("New password is required"));
    }

    credentials::change_password(&db, id, &input.old_password, &input.new_password).await?;
    log_activity(&db, caller.id, "change_password", Some("user"), Some(id), None).await;
    Ok(Envelope::message("Password changed successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadPhotoInput {
    image_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadPhotoData {
    photo_url: String,
}

async fn upload_photo(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(id): Path<i64>,
    Json(input): Json<UploadPhotoInput>,
) -> Result<Json<Envelope<UploadPhotoData>>> {
    ensure_self_or_admin(&caller, id)?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&db)
        .await?
        .is_some();
    if !exists {
        return Err(Error::not_found("User not found"));
    }

    // Storage is the purpose of this endpoint, so its failure is the
    // response, not a warning.
    let photo_url = services
        .images
        .store_from_url(&input.image_url, &format!("profiles/{id}"))
        .await
        .map_err(|err| Error::External(format!("Failed to upload profile photo: {err:#}")))?;

    sqlx::query("UPDATE users SET profile_photo = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(&photo_url)
        .bind(id)
        .execute(&db)
        .await?;

    Ok(Envelope::with_message(
        UploadPhotoData { photo_url },
        "Profile photo uploaded successfully",
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/push-token", post(save_push_token))
        .route("/users/{id}/change-password", post(change_password))
        .route("/users/{id}/upload-photo", post(upload_photo))
}
