//! Append-only log records: activity, audit, login, and error logs.
//!
//! Audit entries ride inside the caller's transaction so a lifecycle change
//! and its trail commit together. Activity, login, and error logs are
//! best-effort: a failed insert is warned about and dropped, never surfaced
//! to the client.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::db::Db;
use crate::error::ErrorDetail;

pub async fn log_activity(
    db: &Db,
    user_id: i64,
    action: &str,
    entity_type: Option<&str>,
    entity_id: Option<i64>,
    details: Option<&str>,
) {
    let result = sqlx::query(
        "INSERT INTO activity_logs (user_id, action, entity_type, entity_id, details)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details)
    .execute(db)
    .await;

    if let Err(err) = result {
        warn!("failed to record activity log: {err}");
    }
}

/// Record a field-level change on a report. Runs on the caller's executor so
/// it can participate in a transaction.
pub async fn log_audit<'a, E>(
    exec: E,
    report_id: i64,
    changed_by: i64,
    action: &str,
    field_name: Option<&str>,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'a, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO audit_logs (report_id, changed_by, action, field_name, old_value, new_value)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(report_id)
    .bind(changed_by)
    .bind(action)
    .bind(field_name)
    .bind(old_value)
    .bind(new_value)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn log_login(db: &Db, user_id: i64, status: &str, failure_reason: Option<&str>) {
    let result = sqlx::query(
        "INSERT INTO login_logs (user_id, status, failure_reason) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(status)
    .bind(failure_reason)
    .execute(db)
    .await;

    if let Err(err) = result {
        warn!("failed to record login log: {err}");
    }
}

/// Delete log rows older than `days_old` days across all four log tables.
/// Returns the total number of rows removed.
pub async fn prune_logs(db: &Db, days_old: i64) -> Result<u64, sqlx::Error> {
    let cutoff = format!("-{days_old} days");
    let mut removed = 0;

    for table in ["activity_logs", "audit_logs", "login_logs", "error_logs"] {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE created_at < datetime('now', ?)"
        ))
        .bind(&cutoff)
        .execute(db)
        .await?;
        removed += result.rows_affected();
    }

    Ok(removed)
}

/// Response-inspection layer: any 5xx that passes through gets an error log
/// row, with the detail the error handler attached as a response extension.
pub async fn error_log_layer(State(db): State<Db>, req: Request, next: Next) -> Response {
    let endpoint = format!("{} {}", req.method(), req.uri().path());
    let response = next.run(req).await;

    if response.status().is_server_error() {
        let message = response
            .extensions()
            .get::<ErrorDetail>()
            .map_or_else(|| response.status().to_string(), |detail| detail.0.clone());

        let result = sqlx::query(
            "INSERT INTO error_logs (severity, message, endpoint) VALUES ('error', ?, ?)",
        )
        .bind(message)
        .bind(endpoint)
        .execute(&db)
        .await;

        if let Err(err) = result {
            warn!("failed to record error log: {err}");
        }
    }

    response
}
