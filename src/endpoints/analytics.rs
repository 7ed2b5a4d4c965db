use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Result,
    analytics::{like_pattern, resolution_rate},
    auth::AuthenticatedUser,
    db::Db,
    error::{Envelope, Error},
    lifecycle::{CasePriority, CaseStatus},
    models::Report,
    services::Services,
};

async fn count_reports(db: &Db, predicate: &str) -> Result<i64> {
    let count =
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM reports WHERE {predicate}"))
            .fetch_one(db)
            .await?;
    Ok(count)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardData {
    total_reports: i64,
    pending_reports: i64,
    resolved_reports: i64,
    archived_reports: i64,
    active_reports: i64,
}

async fn analytics_dashboard(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<DashboardData>>> {
    let total = count_reports(&db, "1=1").await?;
    let pending = count_reports(&db, "status = 'Pending'").await?;
    let resolved = count_reports(&db, "status = 'Resolved'").await?;
    let archived = count_reports(&db, "is_archived = 1").await?;

    Ok(Envelope::data(DashboardData {
        total_reports: total,
        pending_reports: pending,
        resolved_reports: resolved,
        archived_reports: archived,
        active_reports: total - archived,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OfficerAnalytics {
    assigned_cases: i64,
    resolved_cases: i64,
    pending_cases: i64,
    ongoing_cases: i64,
    resolution_rate: f64,
}

async fn officer_analytics_data(db: &Db, user_id: i64) -> Result<OfficerAnalytics> {
    let assigned =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reports WHERE assigned_officer_id = ?")
            .bind(user_id)
            .fetch_one(db)
            .await?;
    let by_status = |status: &'static str| {
        let db = db.clone();
        async move {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM reports WHERE assigned_officer_id = ? AND status = ?",
            )
            .bind(user_id)
            .bind(status)
            .fetch_one(&db)
            .await
        }
    };
    let resolved = by_status("Resolved").await?;
    let pending = by_status("Pending").await?;
    let ongoing = by_status("Ongoing").await?;

    Ok(OfficerAnalytics {
        assigned_cases: assigned,
        resolved_cases: resolved,
        pending_cases: pending,
        ongoing_cases: ongoing,
        resolution_rate: resolution_rate(resolved, assigned),
    })
}

async fn officer_analytics(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<OfficerAnalytics>>> {
    Ok(Envelope::data(officer_analytics_data(&db, user_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateRangeQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

async fn officer_reports(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Envelope<Vec<Report>>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        "SELECT * FROM reports WHERE assigned_officer_id = ",
    );
    qb.push_bind(user_id);
    if let Some(start) = &range.start_date {
        qb.push(" AND incident_date >= ").push_bind(start.clone());
    }
    if let Some(end) = &range.end_date {
        qb.push(" AND incident_date <= ").push_bind(end.clone());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let reports = qb.build_query_as::<Report>().fetch_all(&db).await?;
    Ok(Envelope::data(reports))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminDashboard {
    total_reports: i64,
    pending_reports: i64,
    ongoing_reports: i64,
    resolved_reports: i64,
    total_users: i64,
    total_officers: i64,
    active_users: i64,
    recent_reports: Vec<Report>,
}

async fn admin_dashboard(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<AdminDashboard>>> {
    let total = count_reports(&db, "1=1").await?;
    let pending = count_reports(&db, "status = 'Pending'").await?;
    let ongoing = count_reports(&db, "status = 'Ongoing'").await?;
    let resolved = count_reports(&db, "status = 'Resolved'").await?;

    let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&db)
        .await?;
    let total_officers =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'officer'")
            .fetch_one(&db)
            .await?;
    let active_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = 1")
        .fetch_one(&db)
        .await?;

    let recent_reports = sqlx::query_as::<_, Report>(
        "SELECT * FROM reports ORDER BY created_at DESC, id DESC LIMIT 5",
    )
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(AdminDashboard {
        total_reports: total,
        pending_reports: pending,
        ongoing_reports: ongoing,
        resolved_reports: resolved,
        total_users,
        total_officers,
        active_users,
        recent_reports,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OfficerDashboard {
    #[serde(flatten)]
    analytics: OfficerAnalytics,
    recent_cases: Vec<Report>,
}

async fn officer_dashboard(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<OfficerDashboard>>> {
    let analytics = officer_analytics_data(&db, user_id).await?;
    let recent_cases = sqlx::query_as::<_, Report>(
        "SELECT * FROM reports WHERE assigned_officer_id = ?
         ORDER BY created_at DESC, id DESC LIMIT 5",
    )
    .bind(user_id)
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(OfficerDashboard {
        analytics,
        recent_cases,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuickStats {
    today: PeriodStats,
    this_week: PeriodStats,
    this_month: PeriodStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodStats {
    new_reports: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_reports: Option<i64>,
}

async fn quick_stats(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<QuickStats>>> {
    let today = count_reports(&db, "date(created_at) = date('now')").await?;
    let week = count_reports(&db, "created_at >= datetime('now', '-7 days')").await?;
    let month =
        count_reports(&db, "strftime('%Y-%m', created_at) = strftime('%Y-%m', 'now')").await?;
    let month_resolved = count_reports(
        &db,
        "strftime('%Y-%m', created_at) = strftime('%Y-%m', 'now') AND status = 'Resolved'",
    )
    .await?;

    Ok(Envelope::data(QuickStats {
        today: PeriodStats {
            new_reports: today,
            resolved_reports: None,
        },
        this_week: PeriodStats {
            new_reports: week,
            resolved_reports: None,
        },
        this_month: PeriodStats {
            new_reports: month,
            resolved_reports: Some(month_resolved),
        },
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingActions {
    pending_reports: i64,
    overdue_reports: i64,
    unassigned_reports: i64,
    hearings_today: i64,
}

async fn pending_actions(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<PendingActions>>> {
    let pending = count_reports(&db, "status = 'Pending' AND is_archived = 0").await?;
    // A pending case untouched for a week counts as overdue.
    let overdue = count_reports(
        &db,
        "status = 'Pending' AND is_archived = 0 AND created_at < datetime('now', '-7 days')",
    )
    .await?;
    let unassigned =
        count_reports(&db, "assigned_officer_id IS NULL AND is_archived = 0").await?;
    let hearings_today =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM hearings WHERE hearing_date = date('now')")
            .fetch_one(&db)
            .await?;

    Ok(Envelope::data(PendingActions {
        pending_reports: pending,
        overdue_reports: overdue,
        unassigned_reports: unassigned,
        hearings_today,
    }))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
    #[serde(rename = "type")]
    incident_type: Option<String>,
    status: Option<String>,
    priority: Option<String>,
}

async fn search_reports(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Envelope<Vec<Report>>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM reports WHERE 1=1");

    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = like_pattern(q.trim());
        qb.push(" AND (case_number LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR incident_type LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR incident_location LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR narrative LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
    if let Some(incident_type) = &query.incident_type {
        qb.push(" AND incident_type = ").push_bind(incident_type.clone());
    }
    if let Some(status) = &query.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(priority) = &query.priority {
        qb.push(" AND priority = ").push_bind(priority.clone());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let reports = qb.build_query_as::<Report>().fetch_all(&db).await?;
    Ok(Envelope::data(reports))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedSearchInput {
    case_number: Option<String>,
    incident_type: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    location: Option<String>,
}

#[derive(Serialize)]
struct AdvancedSearchData {
    reports: Vec<Report>,
    count: usize,
}

async fn advanced_search(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<AdvancedSearchInput>,
) -> Result<Json<Envelope<AdvancedSearchData>>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM reports WHERE 1=1");

    if let Some(case_number) = &input.case_number {
        qb.push(" AND case_number LIKE ");
        qb.push_bind(like_pattern(case_number));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(incident_type) = &input.incident_type {
        qb.push(" AND incident_type = ").push_bind(incident_type.clone());
    }
    if let Some(status) = &input.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(priority) = &input.priority {
        qb.push(" AND priority = ").push_bind(priority.clone());
    }
    if let Some(location) = &input.location {
        qb.push(" AND incident_location LIKE ");
        qb.push_bind(like_pattern(location));
        qb.push(" ESCAPE '\\'");
    }
    // Incident dates are ISO strings; lexical comparison is date order.
    if let Some(from) = &input.date_from {
        qb.push(" AND incident_date >= ").push_bind(from.clone());
    }
    if let Some(to) = &input.date_to {
        qb.push(" AND incident_date <= ").push_bind(to.clone());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let reports = qb.build_query_as::<Report>().fetch_all(&db).await?;
    let count = reports.len();
    Ok(Envelope::data(AdvancedSearchData { reports, count }))
}

async fn incident_types(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<Vec<String>>>> {
    let types = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT incident_type FROM reports
         WHERE trim(incident_type) != '' ORDER BY incident_type",
    )
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(types))
}

async fn statuses(_caller: AuthenticatedUser) -> Json<Envelope<Vec<&'static str>>> {
    Envelope::data(CaseStatus::ALL.map(CaseStatus::as_str).to_vec())
}

async fn priorities(_caller: AuthenticatedUser) -> Json<Envelope<Vec<&'static str>>> {
    Envelope::data(CasePriority::ALL.map(CasePriority::as_str).to_vec())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportInput {
    report_ids: Vec<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportData {
    url: String,
}

async fn export_reports(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(format): Path<String>,
    Json(input): Json<ExportInput>,
) -> Result<Json<Envelope<ExportData>>> {
    if !matches!(format.as_str(), "pdf" | "csv" | "excel") {
        return Err(Error::validation(format!("unsupported export format `{format}`")));
    }
    if input.report_ids.is_empty() {
        return Err(Error::validation("reportIds must not be empty"));
    }

    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM reports WHERE id IN (");
    {
        let mut separated = qb.separated(", ");
        for id in &input.report_ids {
            separated.push_bind(*id);
        }
    }
    qb.push(") ORDER BY id");

    let reports = qb.build_query_as::<Report>().fetch_all(&db).await?;
    if reports.is_empty() {
        return Err(Error::not_found("No matching reports"));
    }

    let url = services
        .exporter
        .export(&format, &reports)
        .await
        .map_err(|err| Error::External(format!("Failed to export reports: {err:#}")))?;

    Ok(Envelope::with_message(
        ExportData { url },
        format!("{} exported successfully", format.to_uppercase()),
    ))
}

#[derive(Deserialize)]
struct MonthlyReportInput {
    month: u32,
    year: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodReport {
    total_reports: i64,
    resolved_reports: i64,
    pending_reports: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    archived_reports: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    month: Option<u32>,
    year: i32,
    generated_at: String,
}

async fn monthly_report(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<MonthlyReportInput>,
) -> Result<Json<Envelope<PeriodReport>>> {
    if !(1..=12).contains(&input.month) {
        return Err(Error::validation("month must be between 1 and 12"));
    }

    let period = format!("{:04}-{:02}", input.year, input.month);
    let in_month = "strftime('%Y-%m', created_at) = ?";

    let count_in_month = |extra: &'static str| {
        let db = db.clone();
        let period = period.clone();
        async move {
            sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM reports WHERE {in_month}{extra}"
            ))
            .bind(period)
            .fetch_one(&db)
            .await
        }
    };

    let total = count_in_month("").await?;
    let resolved = count_in_month(" AND status = 'Resolved'").await?;
    let pending = count_in_month(" AND status = 'Pending'").await?;

    Ok(Envelope::with_message(
        PeriodReport {
            total_reports: total,
            resolved_reports: resolved,
            pending_reports: pending,
            archived_reports: None,
            month: Some(input.month),
            year: input.year,
            generated_at: Utc::now().to_rfc3339(),
        },
        "Monthly report generated successfully",
    ))
}

#[derive(Deserialize)]
struct AnnualReportInput {
    year: i32,
}

async fn annual_report(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<AnnualReportInput>,
) -> Result<Json<Envelope<PeriodReport>>> {
    let year = format!("{:04}", input.year);
    let in_year = "strftime('%Y', created_at) = ?";

    let count_in_year = |extra: &'static str| {
        let db = db.clone();
        let year = year.clone();
        async move {
            sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM reports WHERE {in_year}{extra}"
            ))
            .bind(year)
            .fetch_one(&db)
            .await
        }
    };

    let total = count_in_year("").await?;
    let resolved = count_in_year(" AND status = 'Resolved'").await?;
    let pending = count_in_year(" AND status = 'Pending'").await?;
    let archived = count_in_year(" AND is_archived = 1").await?;

    Ok(Envelope::with_message(
        PeriodReport {
            total_reports: total,
            resolved_reports: resolved,
            pending_reports: pending,
            archived_reports: Some(archived),
            month: None,
            year: input.year,
            generated_at: Utc::now().to_rfc3339(),
        },
        "Annual report generated successfully",
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics/dashboard", get(analytics_dashboard))
        .route("/analytics/officer/{id}", get(officer_analytics))
        .route("/analytics/officer/{id}/reports", get(officer_reports))
        .route("/dashboard/admin", get(admin_dashboard))
        .route("/dashboard/officer/{id}", get(officer_dashboard))
        .route("/dashboard/stats", get(quick_stats))
        .route("/dashboard/pending-actions", get(pending_actions))
        .route("/search/reports", get(search_reports))
        .route("/search/advanced", post(advanced_search))
        .route("/search/incident-types", get(incident_types))
        .route("/search/statuses", get(statuses))
        .route("/search/priorities", get(priorities))
        .route("/export/reports/{format}", post(export_reports))
        .route("/export/monthly-report", post(monthly_report))
        .route("/export/annual-report", post(annual_report))
}
