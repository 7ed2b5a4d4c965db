use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Result,
    analytics::resolution_rate,
    auth::AdminUser,
    db::Db,
    error::{Envelope, Error},
    logging::log_activity,
    models::{User, UserView},
};

#[derive(Deserialize)]
struct SetRoleInput {
    role: String,
}

/// The one path that mutates a role. Everywhere else the role a user was
/// created with is immutable.
async fn set_role(
    admin: AdminUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<SetRoleInput>,
) -> Result<Json<Envelope<UserView>>> {
    if !matches!(input.role.as_str(), "user" | "officer" | "admin") {
        return Err(Error::validation(format!("unknown role `{}`", input.role)));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET role = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(&input.role)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("User not found"))?;

    log_activity(
        &db,
        admin.0.id,
        "set_role",
        Some("user"),
        Some(id),
        Some(&input.role),
    )
    .await;

    Ok(Envelope::with_message(user.into(), "Role updated successfully"))
}

#[derive(Deserialize)]
struct SetStatusInput {
    status: String,
}

async fn set_status(
    admin: AdminUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<SetStatusInput>,
) -> Result<Json<Envelope<UserView>>> {
    if !matches!(input.status.as_str(), "active" | "suspended" | "deactivated") {
        return Err(Error::validation(format!("unknown status `{}`", input.status)));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET status = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(&input.status)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("User not found"))?;

    log_activity(
        &db,
        admin.0.id,
        "set_status",
        Some("user"),
        Some(id),
        Some(&input.status),
    )
    .await;

    Ok(Envelope::with_message(user.into(), "Status updated successfully"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemStatistics {
    total_users: i64,
    total_officers: i64,
    total_admins: i64,
    total_reports: i64,
    resolved_reports: i64,
    archived_reports: i64,
    overall_resolution_rate: f64,
    total_notifications: i64,
    unread_notifications: i64,
}

async fn statistics(
    _admin: AdminUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<SystemStatistics>>> {
    let count = |sql: &'static str| {
        let db = db.clone();
        async move { sqlx::query_scalar::<_, i64>(sql).fetch_one(&db).await }
    };

    let total_users = count("SELECT COUNT(*) FROM users").await?;
    let total_officers = count("SELECT COUNT(*) FROM users WHERE role = 'officer'").await?;
    let total_admins = count("SELECT COUNT(*) FROM users WHERE role = 'admin'").await?;
    let total_reports = count("SELECT COUNT(*) FROM reports").await?;
    let resolved_reports = count("SELECT COUNT(*) FROM reports WHERE status = 'Resolved'").await?;
    let archived_reports = count("SELECT COUNT(*) FROM reports WHERE is_archived = 1").await?;
    let assigned_reports =
        count("SELECT COUNT(*) FROM reports WHERE assigned_officer_id IS NOT NULL").await?;
    let total_notifications = count("SELECT COUNT(*) FROM notifications").await?;
    let unread_notifications =
        count("SELECT COUNT(*) FROM notifications WHERE is_read = 0").await?;

    Ok(Envelope::data(SystemStatistics {
        total_users,
        total_officers,
        total_admins,
        total_reports,
        resolved_reports,
        archived_reports,
        overall_resolution_rate: resolution_rate(resolved_reports, assigned_reports),
        total_notifications,
        unread_notifications,
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users/{id}/role", put(set_role))
        .route("/admin/users/{id}/status", put(set_status))
        .route("/admin/statistics", get(statistics))
}
