use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::info;

use crate::{
    AppState, Result,
    auth::{AdminUser, AuthenticatedUser},
    db::Db,
    error::{Envelope, Error, is_unique_violation},
    lifecycle::{self, CasePriority, CaseStatus},
    logging::{log_activity, log_audit},
    metrics,
    models::{Evidence, Hearing, Report, Resolution, Suspect, Witness},
    services::Services,
};

use super::notifications::dispatch;

async fn fetch_report(db: &Db, id: i64) -> Result<Report> {
    sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found("Report not found"))
}

/// Validate a status write against the lifecycle table, checking the
/// resolution requirement for terminal states. Returns the parsed target
/// when the write is an actual move (not a same-state no-op).
async fn check_status_change(
    db: &Db,
    report: &Report,
    new_status: &str,
) -> Result<Option<CaseStatus>> {
    let from = CaseStatus::parse(&report.status)?;
    let to = CaseStatus::parse(new_status)?;

    if !lifecycle::validate_transition(from, to)? {
        return Ok(None);
    }

    if to.requires_resolution() {
        let resolutions =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM resolutions WHERE report_id = ?")
                .bind(report.id)
                .fetch_one(db)
                .await?;
        if resolutions == 0 {
            return Err(Error::validation(format!(
                "case cannot be {} without a resolution record",
                to.as_str()
            )));
        }
    }

    Ok(Some(to))
}

/// Notify the user who filed the report, when known. Best-effort.
async fn notify_filer(db: &Db, services: &Services, report: &Report, title: &str, message: &str) {
    if let Some(filer_id) = report.filed_by_id {
        dispatch(
            db,
            services,
            filer_id,
            title,
            message,
            "case_update",
            Some(report.id),
        )
        .await;
    }
}

#[derive(Deserialize)]
struct ListQuery {
    archived: Option<bool>,
}

async fn list_reports(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<Report>>>> {
    // Archived reports are hidden from the default listing but have their
    // own view; direct id lookup is unaffected.
    let archived = query.archived.unwrap_or(false);
    let reports = sqlx::query_as::<_, Report>(
        "SELECT * FROM reports WHERE is_archived = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(archived)
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(reports))
}

async fn get_report(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Report>>> {
    Ok(Envelope::data(fetch_report(&db, id).await?))
}

async fn reports_by_status(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(status): Path<String>,
) -> Result<Json<Envelope<Vec<Report>>>> {
    let status = CaseStatus::parse(&status)?;
    let reports = sqlx::query_as::<_, Report>(
        "SELECT * FROM reports WHERE status = ? AND is_archived = 0
         ORDER BY created_at DESC, id DESC",
    )
    .bind(status.as_str())
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(reports))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReportInput {
    case_number: String,
    incident_type: String,
    incident_date: String,
    incident_time: String,
    incident_location: String,
    narrative: String,
    complainant_name: Option<String>,
    complainant_contact: Option<String>,
    complainant_address: Option<String>,
    complainant_email: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    assigned_officer: Option<String>,
    assigned_officer_id: Option<i64>,
    filed_by: Option<String>,
    filed_by_id: Option<i64>,
}

async fn create_report(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<CreateReportInput>,
) -> Result<(StatusCode, Json<Envelope<Report>>)> {
    if input.case_number.trim().is_empty() {
        return Err(Error::validation("Case number is required"));
    }

    let status = match &input.status {
        Some(s) => CaseStatus::parse(s)?,
        None => CaseStatus::Pending,
    };
    let priority = match &input.priority {
        Some(p) => CasePriority::parse(p)?,
        None => CasePriority::Normal,
    };

    let filed_by = input.filed_by.unwrap_or_else(|| caller.display_name.clone());
    let filed_by_id = input.filed_by_id.unwrap_or(caller.id);

    let report = sqlx::query_as::<_, Report>(
        "INSERT INTO reports
             (case_number, incident_type, incident_date, incident_time,
              incident_location, narrative, complainant_name, complainant_contact,
              complainant_address, complainant_email, status, priority,
              assigned_officer, assigned_officer_id, filed_by, filed_by_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&input.case_number)
    .bind(&input.incident_type)
    .bind(&input.incident_date)
    .bind(&input.incident_time)
    .bind(&input.incident_location)
    .bind(&input.narrative)
    .bind(&input.complainant_name)
    .bind(&input.complainant_contact)
    .bind(&input.complainant_address)
    .bind(&input.complainant_email)
    .bind(status.as_str())
    .bind(priority.as_str())
    .bind(&input.assigned_officer)
    .bind(input.assigned_officer_id)
    .bind(&filed_by)
    .bind(filed_by_id)
    .fetch_one(&db)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict("Case number already exists")
        } else {
            err.into()
        }
    })?;

    ::metrics::counter!(metrics::REPORTS_CREATED).increment(1);
    info!("new case filed: {}", report.case_number);
    log_activity(
        &db,
        caller.id,
        "create_report",
        Some("report"),
        Some(report.id),
        Some(&report.case_number),
    )
    .await;

    Ok((StatusCode::CREATED, Envelope::data(report)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateReportInput {
    incident_type: Option<String>,
    incident_date: Option<String>,
    incident_time: Option<String>,
    incident_location: Option<String>,
    narrative: Option<String>,
    complainant_name: Option<String>,
    complainant_contact: Option<String>,
    complainant_address: Option<String>,
    complainant_email: Option<String>,
    status: Option<String>,
    priority: Option<String>,
}

async fn update_report(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateReportInput>,
) -> Result<Json<Envelope<Report>>> {
    let report = fetch_report(&db, id).await?;

    let status_change = match &input.status {
        Some(new_status) => check_status_change(&db, &report, new_status).await?,
        None => None,
    };
    let priority = match &input.priority {
        Some(p) => Some(CasePriority::parse(p)?),
        None => None,
    };

    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, Report>(
        "UPDATE reports SET
             incident_type = COALESCE(?, incident_type),
             incident_date = COALESCE(?, incident_date),
             incident_time = COALESCE(?, incident_time),
             incident_location = COALESCE(?, incident_location),
             narrative = COALESCE(?, narrative),
             complainant_name = COALESCE(?, complainant_name),
             complainant_contact = COALESCE(?, complainant_contact),
             complainant_address = COALESCE(?, complainant_address),
             complainant_email = COALESCE(?, complainant_email),
             status = COALESCE(?, status),
             priority = COALESCE(?, priority),
             updated_at = datetime('now')
         WHERE id = ?
         RETURNING *",
    )
    .bind(&input.incident_type)
    .bind(&input.incident_date)
    .bind(&input.incident_time)
    .bind(&input.incident_location)
    .bind(&input.narrative)
    .bind(&input.complainant_name)
    .bind(&input.complainant_contact)
    .bind(&input.complainant_address)
    .bind(&input.complainant_email)
    .bind(status_change.map(CaseStatus::as_str))
    .bind(priority.map(CasePriority::as_str))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(to) = status_change {
        log_audit(
            &mut *tx,
            id,
            caller.id,
            "status_change",
            Some("status"),
            Some(&report.status),
            Some(to.as_str()),
        )
        .await?;
        if to == CaseStatus::Resolved {
            ::metrics::counter!(metrics::REPORTS_RESOLVED).increment(1);
        }
    }

    tx.commit().await?;

    if let Some(to) = status_change {
        notify_filer(
            &db,
            &services,
            &updated,
            "Case status updated",
            &format!("Case {} is now {}", updated.case_number, to.as_str()),
        )
        .await;
    }

    Ok(Envelope::data(updated))
}

async fn delete_report(
    admin: AdminUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    // Children (suspects, witnesses, evidence, hearings, resolutions, audit
    // trail) cascade with the report.
    let result = sqlx::query("DELETE FROM reports WHERE id = ?")
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Report not found"));
    }

    log_activity(&db, admin.0.id, "delete_report", Some("report"), Some(id), None).await;
    Ok(Envelope::message("Report deleted successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignInput {
    assigned_officer_id: i64,
    assigned_officer_name: String,
}

async fn assign_report(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(id): Path<i64>,
    Json(input): Json<AssignInput>,
) -> Result<Json<Envelope<Report>>> {
    let report = fetch_report(&db, id).await?;
    let from = CaseStatus::parse(&report.status)?;

    // Assignment advances a fresh case to Assigned; anything already past
    // that keeps its status.
    let new_status = if from == CaseStatus::Pending {
        CaseStatus::Assigned
    } else {
        from
    };

    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, Report>(
        "UPDATE reports SET
             assigned_officer = ?, assigned_officer_id = ?, status = ?,
             updated_at = datetime('now')
         WHERE id = ?
         RETURNING *",
    )
    .bind(&input.assigned_officer_name)
    .bind(input.assigned_officer_id)
    .bind(new_status.as_str())
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE officers SET assigned_cases = assigned_cases + 1, updated_at = datetime('now')
         WHERE user_id = ?",
    )
    .bind(input.assigned_officer_id)
    .execute(&mut *tx)
    .await?;

    if new_status != from {
        log_audit(
            &mut *tx,
            id,
            caller.id,
            "status_change",
            Some("status"),
            Some(from.as_str()),
            Some(new_status.as_str()),
        )
        .await?;
    }
    log_audit(
        &mut *tx,
        id,
        caller.id,
        "assign",
        Some("assigned_officer"),
        report.assigned_officer.as_deref(),
        Some(&input.assigned_officer_name),
    )
    .await?;

    tx.commit().await?;

    dispatch(
        &db,
        &services,
        input.assigned_officer_id,
        "Case assigned to you",
        &format!("You have been assigned case {}", updated.case_number),
        "assignment",
        Some(id),
    )
    .await;

    Ok(Envelope::with_message(updated, "Report assigned successfully"))
}

async fn unassign_report(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Report>>> {
    let report = fetch_report(&db, id).await?;

    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, Report>(
        "UPDATE reports SET
             assigned_officer = NULL, assigned_officer_id = NULL,
             updated_at = datetime('now')
         WHERE id = ?
         RETURNING *",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    log_audit(
        &mut *tx,
        id,
        caller.id,
        "unassign",
        Some("assigned_officer"),
        report.assigned_officer.as_deref(),
        None,
    )
    .await?;

    tx.commit().await?;
    Ok(Envelope::with_message(updated, "Report unassigned successfully"))
}

async fn set_archived(db: &Db, id: i64, archived: bool) -> Result<Report> {
    let report = sqlx::query_as::<_, Report>(
        "UPDATE reports SET is_archived = ?, updated_at = datetime('now')
         WHERE id = ?
         RETURNING *",
    )
    .bind(archived)
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::not_found("Report not found"))?;

    Ok(report)
}

async fn archive_report(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Report>>> {
    let report = set_archived(&db, id, true).await?;
    ::metrics::counter!(metrics::REPORTS_ARCHIVED).increment(1);
    Ok(Envelope::with_message(report, "Report archived successfully"))
}

async fn unarchive_report(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Report>>> {
    let report = set_archived(&db, id, false).await?;
    Ok(Envelope::with_message(report, "Report unarchived successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReopenInput {
    reason: String,
    to_status: Option<String>,
}

async fn reopen_report(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(id): Path<i64>,
    Json(input): Json<ReopenInput>,
) -> Result<Json<Envelope<Report>>> {
    if input.reason.trim().is_empty() {
        return Err(Error::validation("A reason is required to reopen a case"));
    }

    let report = fetch_report(&db, id).await?;
    let from = CaseStatus::parse(&report.status)?;
    let to = match &input.to_status {
        Some(s) => CaseStatus::parse(s)?,
        None => CaseStatus::Pending,
    };
    lifecycle::validate_reopen(from, to)?;

    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, Report>(
        "UPDATE reports SET status = ?, updated_at = datetime('now') WHERE id = ? RETURNING *",
    )
    .bind(to.as_str())
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    log_audit(
        &mut *tx,
        id,
        caller.id,
        "reopen",
        Some("status"),
        Some(from.as_str()),
        Some(&format!("{} ({})", to.as_str(), input.reason.trim())),
    )
    .await?;

    tx.commit().await?;

    notify_filer(
        &db,
        &services,
        &updated,
        "Case reopened",
        &format!("Case {} has been reopened", updated.case_number),
    )
    .await;

    Ok(Envelope::with_message(updated, "Case reopened successfully"))
}

// --- Child entities ---------------------------------------------------------

async fn list_suspects(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Vec<Suspect>>>> {
    fetch_report(&db, id).await?;
    let suspects =
        sqlx::query_as::<_, Suspect>("SELECT * FROM suspects WHERE report_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&db)
            .await?;
    Ok(Envelope::data(suspects))
}

#[derive(Deserialize)]
struct SuspectInput {
    name: String,
    age: Option<i64>,
    address: Option<String>,
    description: Option<String>,
}

async fn add_suspect(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<SuspectInput>,
) -> Result<(StatusCode, Json<Envelope<Suspect>>)> {
    fetch_report(&db, id).await?;
    let suspect = sqlx::query_as::<_, Suspect>(
        "INSERT INTO suspects (report_id, name, age, address, description)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(id)
    .bind(&input.name)
    .bind(input.age)
    .bind(&input.address)
    .bind(&input.description)
    .fetch_one(&db)
    .await?;

    Ok((StatusCode::CREATED, Envelope::data(suspect)))
}

#[derive(Deserialize)]
struct UpdateSuspectInput {
    name: Option<String>,
    age: Option<i64>,
    address: Option<String>,
    description: Option<String>,
}

async fn update_suspect(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path((id, suspect_id)): Path<(i64, i64)>,
    Json(input): Json<UpdateSuspectInput>,
) -> Result<Json<Envelope<Suspect>>> {
    let suspect = sqlx::query_as::<_, Suspect>(
        "UPDATE suspects SET
             name = COALESCE(?, name), age = COALESCE(?, age),
             address = COALESCE(?, address), description = COALESCE(?, description)
         WHERE id = ? AND report_id = ?
         RETURNING *",
    )
    .bind(&input.name)
    .bind(input.age)
    .bind(&input.address)
    .bind(&input.description)
    .bind(suspect_id)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("Suspect not found"))?;

    Ok(Envelope::data(suspect))
}

async fn delete_suspect(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path((id, suspect_id)): Path<(i64, i64)>,
) -> Result<Json<Envelope<()>>> {
    let result = sqlx::query("DELETE FROM suspects WHERE id = ? AND report_id = ?")
        .bind(suspect_id)
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Suspect not found"));
    }
    Ok(Envelope::message("Suspect deleted successfully"))
}

async fn list_witnesses(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Vec<Witness>>>> {
    fetch_report(&db, id).await?;
    let witnesses =
        sqlx::query_as::<_, Witness>("SELECT * FROM witnesses WHERE report_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&db)
            .await?;
    Ok(Envelope::data(witnesses))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WitnessInput {
    name: String,
    contact_number: Option<String>,
    address: Option<String>,
    statement: Option<String>,
}

async fn add_witness(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<WitnessInput>,
) -> Result<(StatusCode, Json<Envelope<Witness>>)> {
    fetch_report(&db, id).await?;
    let witness = sqlx::query_as::<_, Witness>(
        "INSERT INTO witnesses (report_id, name, contact_number, address, statement)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(id)
    .bind(&input.name)
    .bind(&input.contact_number)
    .bind(&input.address)
    .bind(&input.statement)
    .fetch_one(&db)
    .await?;

    Ok((StatusCode::CREATED, Envelope::data(witness)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWitnessInput {
    name: Option<String>,
    contact_number: Option<String>,
    address: Option<String>,
    statement: Option<String>,
}

async fn update_witness(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path((id, witness_id)): Path<(i64, i64)>,
    Json(input): Json<UpdateWitnessInput>,
) -> Result<Json<Envelope<Witness>>> {
    let witness = sqlx::query_as::<_, Witness>(
        "UPDATE witnesses SET
             name = COALESCE(?, name), contact_number = COALESCE(?, contact_number),
             address = COALESCE(?, address), statement = COALESCE(?, statement)
         WHERE id = ? AND report_id = ?
         RETURNING *",
    )
    .bind(&input.name)
    .bind(&input.contact_number)
    .bind(&input.address)
    .bind(&input.statement)
    .bind(witness_id)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("Witness not found"))?;

    Ok(Envelope::data(witness))
}

async fn delete_witness(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path((id, witness_id)): Path<(i64, i64)>,
) -> Result<Json<Envelope<()>>> {
    let result = sqlx::query("DELETE FROM witnesses WHERE id = ? AND report_id = ?")
        .bind(witness_id)
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Witness not found"));
    }
    Ok(Envelope::message("Witness deleted successfully"))
}

async fn list_evidence(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Vec<Evidence>>>> {
    fetch_report(&db, id).await?;
    let evidence =
        sqlx::query_as::<_, Evidence>("SELECT * FROM evidence WHERE report_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&db)
            .await?;
    Ok(Envelope::data(evidence))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvidenceInput {
    evidence_type: String,
    description: String,
    location_found: Option<String>,
    photo_url: Option<String>,
    collected_by: Option<String>,
}

async fn add_evidence(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<EvidenceInput>,
) -> Result<(StatusCode, Json<Envelope<Evidence>>)> {
    fetch_report(&db, id).await?;
    let evidence = sqlx::query_as::<_, Evidence>(
        "INSERT INTO evidence
             (report_id, evidence_type, description, location_found, photo_url, collected_by)
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(id)
    .bind(&input.evidence_type)
    .bind(&input.description)
    .bind(&input.location_found)
    .bind(&input.photo_url)
    .bind(&input.collected_by)
    .fetch_one(&db)
    .await?;

    Ok((StatusCode::CREATED, Envelope::data(evidence)))
}

async fn delete_evidence(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path((id, evidence_id)): Path<(i64, i64)>,
) -> Result<Json<Envelope<()>>> {
    let result = sqlx::query("DELETE FROM evidence WHERE id = ? AND report_id = ?")
        .bind(evidence_id)
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Evidence not found"));
    }
    Ok(Envelope::message("Evidence deleted successfully"))
}

async fn report_hearings(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Vec<Hearing>>>> {
    fetch_report(&db, id).await?;
    let hearings = sqlx::query_as::<_, Hearing>(
        "SELECT * FROM hearings WHERE report_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(id)
    .fetch_all(&db)
    .await?;
    Ok(Envelope::data(hearings))
}

async fn get_resolution(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Option<Resolution>>>> {
    fetch_report(&db, id).await?;
    let resolution = sqlx::query_as::<_, Resolution>(
        "SELECT * FROM resolutions WHERE report_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&db)
    .await?;
    Ok(Envelope::data(resolution))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionInput {
    resolution_date: String,
    resolution_type: String,
    description: Option<String>,
    outcome: Option<String>,
    approved_by: Option<String>,
    /// Move the case to Resolved in the same transaction. Defaults to true.
    close_case: Option<bool>,
}

async fn create_resolution(
    caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Path(id): Path<i64>,
    Json(input): Json<ResolutionInput>,
) -> Result<(StatusCode, Json<Envelope<Resolution>>)> {
    let report = fetch_report(&db, id).await?;
    let from = CaseStatus::parse(&report.status)?;

    let close_case = input.close_case.unwrap_or(true);
    if close_case {
        // Already-resolved cases accept further resolution records without a
        // transition; backward moves are still rejected.
        if from != CaseStatus::Resolved && from != CaseStatus::Closed {
            lifecycle::validate_transition(from, CaseStatus::Resolved)?;
        }
    }

    let mut tx = db.begin().await?;

    let resolution = sqlx::query_as::<_, Resolution>(
        "INSERT INTO resolutions
             (report_id, resolution_date, resolution_type, description, outcome,
              approved_by, status)
         VALUES (?, ?, ?, ?, ?, ?, 'Approved') RETURNING *",
    )
    .bind(id)
    .bind(&input.resolution_date)
    .bind(&input.resolution_type)
    .bind(&input.description)
    .bind(&input.outcome)
    .bind(&input.approved_by)
    .fetch_one(&mut *tx)
    .await?;

    if close_case && from != CaseStatus::Resolved && from != CaseStatus::Closed {
        sqlx::query("UPDATE reports SET status = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(CaseStatus::Resolved.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(officer_id) = report.assigned_officer_id {
            sqlx::query(
                "UPDATE officers SET resolved_cases = resolved_cases + 1,
                     updated_at = datetime('now')
                 WHERE user_id = ?",
            )
            .bind(officer_id)
            .execute(&mut *tx)
            .await?;
        }

        log_audit(
            &mut *tx,
            id,
            caller.id,
            "status_change",
            Some("status"),
            Some(from.as_str()),
            Some(CaseStatus::Resolved.as_str()),
        )
        .await?;
        ::metrics::counter!(metrics::REPORTS_RESOLVED).increment(1);
    }

    tx.commit().await?;

    if close_case {
        notify_filer(
            &db,
            &services,
            &report,
            "Case resolved",
            &format!("Case {} has been resolved", report.case_number),
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(resolution, "Case resolved successfully"),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResolutionInput {
    resolution_date: Option<String>,
    resolution_type: Option<String>,
    description: Option<String>,
    outcome: Option<String>,
    approved_by: Option<String>,
}

async fn update_resolution(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateResolutionInput>,
) -> Result<Json<Envelope<Resolution>>> {
    let resolution = sqlx::query_as::<_, Resolution>(
        "UPDATE resolutions SET
             resolution_date = COALESCE(?, resolution_date),
             resolution_type = COALESCE(?, resolution_type),
             description = COALESCE(?, description),
             outcome = COALESCE(?, outcome),
             approved_by = COALESCE(?, approved_by)
         WHERE id = (SELECT id FROM resolutions WHERE report_id = ? ORDER BY id DESC LIMIT 1)
         RETURNING *",
    )
    .bind(&input.resolution_date)
    .bind(&input.resolution_type)
    .bind(&input.description)
    .bind(&input.outcome)
    .bind(&input.approved_by)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("Resolution not found"))?;

    Ok(Envelope::with_message(resolution, "Resolution updated successfully"))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(create_report))
        .route(
            "/reports/{id}",
            get(get_report).put(update_report).delete(delete_report),
        )
        .route("/reports/status/{status}", get(reports_by_status))
        .route("/reports/{id}/assign", put(assign_report))
        .route("/reports/{id}/unassign", put(unassign_report))
        .route("/reports/{id}/archive", put(archive_report))
        .route("/reports/{id}/unarchive", put(unarchive_report))
        .route("/reports/{id}/reopen", post(reopen_report))
        .route("/reports/{id}/suspects", get(list_suspects).post(add_suspect))
        .route(
            "/reports/{id}/suspects/{sid}",
            put(update_suspect).delete(delete_suspect),
        )
        .route("/reports/{id}/witnesses", get(list_witnesses).post(add_witness))
        .route(
            "/reports/{id}/witnesses/{wid}",
            put(update_witness).delete(delete_witness),
        )
        .route("/reports/{id}/evidence", get(list_evidence).post(add_evidence))
        .route("/reports/{id}/evidence/{eid}", axum::routing::delete(delete_evidence))
        .route("/reports/{id}/hearings", get(report_hearings))
        .route(
            "/reports/{id}/resolution",
            get(get_resolution)
                .post(create_resolution)
                .put(update_resolution),
        )
}
