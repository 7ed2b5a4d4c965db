use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{delete, get},
};
use serde::Deserialize;

use crate::{
    AppState, Result,
    auth::AdminUser,
    db::Db,
    error::{Envelope, Error},
    logging::prune_logs,
    models::{ActivityLog, AuditLog, ErrorLog, LoginLog},
};

const DEFAULT_LIMIT: i64 = 100;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityQuery {
    user_id: Option<i64>,
    limit: Option<i64>,
}

async fn activity_logs(
    _admin: AdminUser,
    State(db): State<Db>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Envelope<Vec<ActivityLog>>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM activity_logs WHERE 1=1");
    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(query.limit.unwrap_or(DEFAULT_LIMIT));

    let logs = qb.build_query_as::<ActivityLog>().fetch_all(&db).await?;
    Ok(Envelope::data(logs))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditQuery {
    report_id: Option<i64>,
    limit: Option<i64>,
}

async fn audit_logs(
    _admin: AdminUser,
    State(db): State<Db>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Envelope<Vec<AuditLog>>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM audit_logs WHERE 1=1");
    if let Some(report_id) = query.report_id {
        qb.push(" AND report_id = ").push_bind(report_id);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(query.limit.unwrap_or(DEFAULT_LIMIT));

    let logs = qb.build_query_as::<AuditLog>().fetch_all(&db).await?;
    Ok(Envelope::data(logs))
}

async fn login_logs(
    _admin: AdminUser,
    State(db): State<Db>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Envelope<Vec<LoginLog>>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM login_logs WHERE 1=1");
    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(query.limit.unwrap_or(DEFAULT_LIMIT));

    let logs = qb.build_query_as::<LoginLog>().fetch_all(&db).await?;
    Ok(Envelope::data(logs))
}

#[derive(Deserialize)]
struct ErrorQuery {
    severity: Option<String>,
    limit: Option<i64>,
}

async fn error_logs(
    _admin: AdminUser,
    State(db): State<Db>,
    Query(query): Query<ErrorQuery>,
) -> Result<Json<Envelope<Vec<ErrorLog>>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM error_logs WHERE 1=1");
    if let Some(severity) = &query.severity {
        qb.push(" AND severity = ").push_bind(severity.clone());
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(query.limit.unwrap_or(DEFAULT_LIMIT));

    let logs = qb.build_query_as::<ErrorLog>().fetch_all(&db).await?;
    Ok(Envelope::data(logs))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearQuery {
    days_old: i64,
}

async fn clear_logs(
    _admin: AdminUser,
    State(db): State<Db>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<Envelope<()>>> {
    if query.days_old < 1 {
        return Err(Error::validation("daysOld must be at least 1"));
    }

    let removed = prune_logs(&db, query.days_old).await?;
    Ok(Envelope::message(format!(
        "Cleared {removed} log entries older than {} days",
        query.days_old
    )))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/logs/activity", get(activity_logs))
        .route("/logs/audit", get(audit_logs))
        .route("/logs/login", get(login_logs))
        .route("/logs/errors", get(error_logs))
        .route("/logs/clear", delete(clear_logs))
}
