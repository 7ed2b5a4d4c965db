use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, warn};

use crate::{
    AppState, Result,
    auth::{AdminUser, AuthenticatedUser},
    credentials,
    db::Db,
    error::{Envelope, Error, is_unique_violation},
    logging::log_activity,
    models::OfficerView,
    services::{self, Services},
};

const OFFICER_VIEW_QUERY: &str = "SELECT o.id, o.user_id, u.email, u.username, u.first_name, u.last_name, \
            o.badge_number, o.rank, o.department, o.years_of_service, \
            o.assigned_cases, o.resolved_cases, o.is_available, u.is_active \
     FROM officers o JOIN users u ON u.id = o.user_id";

async fn list_officers(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<Vec<OfficerView>>>> {
    let officers =
        sqlx::query_as::<_, OfficerView>(&format!("{OFFICER_VIEW_QUERY} ORDER BY u.last_name"))
            .fetch_all(&db)
            .await?;

    Ok(Envelope::data(officers))
}

async fn get_officer(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<OfficerView>>> {
    let officer =
        sqlx::query_as::<_, OfficerView>(&format!("{OFFICER_VIEW_QUERY} WHERE o.user_id = ?"))
            .bind(user_id)
            .fetch_optional(&db)
            .await?
            .ok_or_else(|| Error::not_found("Officer not found"))?;

    Ok(Envelope::data(officer))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOfficerInput {
    first_name: String,
    last_name: String,
    email: String,
    department: String,
    badge_number: Option<String>,
    rank: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedCredentials {
    username: String,
    password: String,
    note: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOfficerData {
    officer: OfficerView,
    credentials: GeneratedCredentials,
}

/// Create an officer account with generated credentials. The user row and
/// its officer extension commit together; a duplicate email or badge number
/// rolls back both.
async fn create_officer(
    admin: AdminUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Json(input): Json<CreateOfficerInput>,
) -> Result<(StatusCode, Json<Envelope<CreateOfficerData>>)> {
    let username = credentials::generate_username(&input.first_name, &input.last_name);
    let password = credentials::generate_password();
    let hash = credentials::hash_password(&password)?;

    let mut tx = db.begin().await?;

    let user_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users
             (username, email, password, first_name, last_name, role,
              email_verified, profile_completed)
         VALUES (?, ?, ?, ?, ?, 'officer', 1, 1)
         RETURNING id",
    )
    .bind(&username)
    .bind(&input.email)
    .bind(&hash)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict("Email already exists")
        } else {
            err.into()
        }
    })?;

    sqlx::query(
        "INSERT INTO officers (user_id, badge_number, rank, department) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&input.badge_number)
    .bind(&input.rank)
    .bind(&input.department)
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict("Badge number already exists")
        } else {
            err.into()
        }
    })?;

    tx.commit().await?;
    info!("officer account created: {username}");

    let full_name = format!("{} {}", input.first_name, input.last_name);
    let (subject, html) = services::officer_credentials_email(&full_name, &username, &password);
    if let Err(err) = services.mailer.send(&input.email, &subject, &html).await {
        warn!("credentials email to {} failed: {err:#}", input.email);
    }

    log_activity(
        &db,
        admin.0.id,
        "create_officer",
        Some("user"),
        Some(user_id),
        None,
    )
    .await;

    let officer =
        sqlx::query_as::<_, OfficerView>(&format!("{OFFICER_VIEW_QUERY} WHERE o.user_id = ?"))
            .bind(user_id)
            .fetch_one(&db)
            .await?;

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(
            CreateOfficerData {
                officer,
                credentials: GeneratedCredentials {
                    username,
                    password,
                    note: "Share these credentials with the officer. They can change the password after first login.".to_owned(),
                },
            },
            "Officer account created successfully",
        ),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateOfficerInput {
    first_name: Option<String>,
    last_name: Option<String>,
    department: Option<String>,
    badge_number: Option<String>,
    rank: Option<String>,
    years_of_service: Option<i64>,
    is_available: Option<bool>,
}

async fn update_officer(
    _admin: AdminUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
    Json(input): Json<UpdateOfficerInput>,
) -> Result<Json<Envelope<OfficerView>>> {
    let mut tx = db.begin().await?;

    let updated = sqlx::query(
        "UPDATE users SET
             first_name = COALESCE(?, first_name),
             last_name = COALESCE(?, last_name),
             updated_at = datetime('now')
         WHERE id = ? AND role = 'officer'",
    )
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::not_found("Officer not found"));
    }

    sqlx::query(
        "UPDATE officers SET
             department = COALESCE(?, department),
             badge_number = COALESCE(?, badge_number),
             rank = COALESCE(?, rank),
             years_of_service = COALESCE(?, years_of_service),
             is_available = COALESCE(?, is_available),
             updated_at = datetime('now')
         WHERE user_id = ?",
    )
    .bind(&input.department)
    .bind(&input.badge_number)
    .bind(&input.rank)
    .bind(input.years_of_service)
    .bind(input.is_available)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict("Badge number already exists")
        } else {
            err.into()
        }
    })?;

    tx.commit().await?;

    let officer =
        sqlx::query_as::<_, OfficerView>(&format!("{OFFICER_VIEW_QUERY} WHERE o.user_id = ?"))
            .bind(user_id)
            .fetch_one(&db)
            .await?;

    Ok(Envelope::with_message(officer, "Officer updated successfully"))
}

async fn delete_officer(
    admin: AdminUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    // Deleting the user cascades to the officer extension record.
    let result = sqlx::query("DELETE FROM users WHERE id = ? AND role = 'officer'")
        .bind(user_id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Officer not found"));
    }

    log_activity(
        &db,
        admin.0.id,
        "delete_officer",
        Some("user"),
        Some(user_id),
        None,
    )
    .await;
    Ok(Envelope::message("Officer deleted successfully"))
}

async fn set_officer_active(db: &Db, user_id: i64, active: bool) -> Result<()> {
    let result = sqlx::query(
        "UPDATE users SET is_active = ?, updated_at = datetime('now')
         WHERE id = ? AND role = 'officer'",
    )
    .bind(active)
    .bind(user_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Officer not found"));
    }
    Ok(())
}

async fn activate_officer(
    _admin: AdminUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    set_officer_active(&db, user_id, true).await?;
    Ok(Envelope::message("Officer activated successfully"))
}

async fn deactivate_officer(
    _admin: AdminUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    set_officer_active(&db, user_id, false).await?;
    Ok(Envelope::message("Officer deactivated successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCredentialsInput {
    username: String,
    password: String,
    email: String,
    first_name: String,
    last_name: String,
}

async fn send_credentials(
    _admin: AdminUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(user_id): Path<i64>,
    Json(input): Json<SendCredentialsInput>,
) -> Result<Json<Envelope<()>>> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db)
        .await?
        .is_some();
    if !exists {
        return Err(Error::not_found("Officer not found"));
    }

    let full_name = format!("{} {}", input.first_name, input.last_name);
    let (subject, html) =
        services::officer_credentials_email(&full_name, &input.username, &input.password);
    services
        .mailer
        .send(&input.email, &subject, &html)
        .await
        .map_err(|err| Error::External(format!("Failed to send credentials: {err:#}")))?;

    Ok(Envelope::message(format!(
        "Credentials sent successfully to {}",
        input.email
    )))
}

#[derive(FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct DepartmentView {
    department: String,
    officer_count: i64,
}

async fn list_departments(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<Vec<DepartmentView>>>> {
    let departments = sqlx::query_as::<_, DepartmentView>(
        "SELECT department, COUNT(*) AS officer_count
         FROM officers GROUP BY department ORDER BY department",
    )
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(departments))
}

async fn department_officers(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(name): Path<String>,
) -> Result<Json<Envelope<Vec<OfficerView>>>> {
    let officers = sqlx::query_as::<_, OfficerView>(&format!(
        "{OFFICER_VIEW_QUERY} WHERE o.department = ? ORDER BY u.last_name"
    ))
    .bind(&name)
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(officers))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/officers", get(list_officers).post(create_officer))
        .route(
            "/officers/{id}",
            get(get_officer).put(update_officer).delete(delete_officer),
        )
        .route("/officers/{id}/activate", put(activate_officer))
        .route("/officers/{id}/deactivate", put(deactivate_officer))
        .route("/officers/{id}/send-credentials", post(send_credentials))
        .route("/departments", get(list_departments))
        .route("/departments/{name}/officers", get(department_officers))
}
