use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use crate::{
    AppState, Result,
    auth::AuthenticatedUser,
    db::Db,
    error::{Envelope, Error},
    models::Hearing,
};

async fn list_hearings(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
) -> Result<Json<Envelope<Vec<Hearing>>>> {
    let hearings = sqlx::query_as::<_, Hearing>(
        "SELECT * FROM hearings ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(hearings))
}

#[derive(Deserialize)]
struct CalendarQuery {
    month: u32,
    year: i32,
}

async fn calendar(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Envelope<Vec<Hearing>>>> {
    if !(1..=12).contains(&query.month) {
        return Err(Error::validation("month must be between 1 and 12"));
    }

    // Hearing dates are ISO strings, so the month/year extraction happens
    // in SQL rather than over the full table in memory.
    let hearings = sqlx::query_as::<_, Hearing>(
        "SELECT * FROM hearings
         WHERE CAST(strftime('%m', hearing_date) AS INTEGER) = ?
           AND CAST(strftime('%Y', hearing_date) AS INTEGER) = ?
         ORDER BY hearing_date, hearing_time",
    )
    .bind(query.month)
    .bind(query.year)
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(hearings))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateHearingInput {
    report_id: i64,
    hearing_date: String,
    hearing_time: String,
    location: String,
    purpose: Option<String>,
    presider: Option<String>,
    attendees: Option<String>,
    notes: Option<String>,
    status: Option<String>,
}

async fn create_hearing(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<CreateHearingInput>,
) -> Result<(StatusCode, Json<Envelope<Hearing>>)> {
    let report_exists = sqlx::query_scalar::<_, i64>("SELECT id FROM reports WHERE id = ?")
        .bind(input.report_id)
        .fetch_optional(&db)
        .await?
        .is_some();
    if !report_exists {
        return Err(Error::not_found("Report not found"));
    }

    let hearing = sqlx::query_as::<_, Hearing>(
        "INSERT INTO hearings
             (report_id, hearing_date, hearing_time, location, purpose,
              presider, attendees, notes, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(input.report_id)
    .bind(&input.hearing_date)
    .bind(&input.hearing_time)
    .bind(&input.location)
    .bind(&input.purpose)
    .bind(&input.presider)
    .bind(&input.attendees)
    .bind(&input.notes)
    .bind(input.status.as_deref().unwrap_or("Scheduled"))
    .fetch_one(&db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(hearing, "Hearing created successfully"),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateHearingInput {
    hearing_date: Option<String>,
    hearing_time: Option<String>,
    location: Option<String>,
    purpose: Option<String>,
    presider: Option<String>,
    attendees: Option<String>,
    notes: Option<String>,
    status: Option<String>,
}

async fn update_hearing(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateHearingInput>,
) -> Result<Json<Envelope<Hearing>>> {
    let hearing = sqlx::query_as::<_, Hearing>(
        "UPDATE hearings SET
             hearing_date = COALESCE(?, hearing_date),
             hearing_time = COALESCE(?, hearing_time),
             location = COALESCE(?, location),
             purpose = COALESCE(?, purpose),
             presider = COALESCE(?, presider),
             attendees = COALESCE(?, attendees),
             notes = COALESCE(?, notes),
             status = COALESCE(?, status)
         WHERE id = ?
         RETURNING *",
    )
    .bind(&input.hearing_date)
    .bind(&input.hearing_time)
    .bind(&input.location)
    .bind(&input.purpose)
    .bind(&input.presider)
    .bind(&input.attendees)
    .bind(&input.notes)
    .bind(&input.status)
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("Hearing not found"))?;

    Ok(Envelope::with_message(hearing, "Hearing updated successfully"))
}

async fn delete_hearing(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    let result = sqlx::query("DELETE FROM hearings WHERE id = ?")
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Hearing not found"));
    }
    Ok(Envelope::message("Hearing deleted successfully"))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hearings", get(list_hearings).post(create_hearing))
        .route("/hearings/calendar", get(calendar))
        .route("/hearings/{id}", axum::routing::put(update_hearing).delete(delete_hearing))
}
