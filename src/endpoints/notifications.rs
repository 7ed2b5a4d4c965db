use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    AppState, Result,
    auth::AuthenticatedUser,
    db::Db,
    error::{Envelope, Error},
    metrics,
    models::Notification,
    services::Services,
};

/// Persist a notification record. The record is the source of truth; push
/// delivery happens afterwards and cannot undo it.
async fn store(
    db: &Db,
    user_id: i64,
    title: &str,
    message: &str,
    kind: &str,
    related_report_id: Option<i64>,
) -> Result<Notification> {
    let notification = sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (user_id, title, message, kind, related_report_id)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(kind)
    .bind(related_report_id)
    .fetch_one(db)
    .await?;

    ::metrics::counter!(metrics::NOTIFICATIONS_STORED).increment(1);
    Ok(notification)
}

/// Forward a stored notification to the recipient's device when they have a
/// registered token. Failures are logged and swallowed.
async fn push_best_effort(db: &Db, services: &Services, notification: &Notification) {
    if !services.push.is_enabled() {
        return;
    }

    let token = match sqlx::query_scalar::<_, Option<String>>(
        "SELECT push_token FROM users WHERE id = ?",
    )
    .bind(notification.user_id)
    .fetch_optional(db)
    .await
    {
        Ok(Some(Some(token))) => token,
        Ok(_) => return,
        Err(err) => {
            warn!("push token lookup failed: {err}");
            return;
        }
    };

    let mut data = HashMap::from([
        ("notificationId".to_owned(), notification.id.to_string()),
        ("type".to_owned(), notification.kind.clone()),
    ]);
    if let Some(report_id) = notification.related_report_id {
        drop(data.insert("relatedReportId".to_owned(), report_id.to_string()));
    }

    match services
        .push
        .send(&token, &notification.title, &notification.message, data)
        .await
    {
        Ok(_) => ::metrics::counter!(metrics::NOTIFICATIONS_PUSHED).increment(1),
        Err(err) => {
            ::metrics::counter!(metrics::PUSH_FAILED).increment(1);
            warn!(
                "push delivery for notification {} failed (record kept): {err:#}",
                notification.id
            );
        }
    }
}

/// Store-and-push for other modules raising case events. Entirely
/// best-effort: a failure here must never fail the caller's operation.
pub(crate) async fn dispatch(
    db: &Db,
    services: &Services,
    user_id: i64,
    title: &str,
    message: &str,
    kind: &str,
    related_report_id: Option<i64>,
) {
    match store(db, user_id, title, message, kind, related_report_id).await {
        Ok(notification) => push_best_effort(db, services, &notification).await,
        Err(err) => warn!("failed to store notification for user {user_id}: {err}"),
    }
}

async fn list_for_user(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<Vec<Notification>>>> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&db)
    .await?;

    Ok(Envelope::data(notifications))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateNotificationInput {
    user_id: i64,
    title: String,
    message: String,
    #[serde(rename = "type")]
    kind: String,
    related_report_id: Option<i64>,
}

async fn create_notification(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<CreateNotificationInput>,
) -> Result<(StatusCode, Json<Envelope<Notification>>)> {
    let notification = store(
        &db,
        input.user_id,
        &input.title,
        &input.message,
        &input.kind,
        input.related_report_id,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(notification, "Notification sent successfully"),
    ))
}

async fn send_push(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    State(services): State<Services>,
    Json(input): Json<CreateNotificationInput>,
) -> Result<(StatusCode, Json<Envelope<Notification>>)> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(input.user_id)
        .fetch_optional(&db)
        .await?
        .is_some();
    if !exists {
        return Err(Error::not_found("User not found"));
    }

    let notification = store(
        &db,
        input.user_id,
        &input.title,
        &input.message,
        &input.kind,
        input.related_report_id,
    )
    .await?;

    // Delivery is best-effort; the stored record already succeeded.
    push_best_effort(&db, &services, &notification).await;

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(notification, "Notification sent successfully"),
    ))
}

async fn mark_read(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Notification>>> {
    let notification = sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET is_read = 1, read_at = datetime('now')
         WHERE id = ? RETURNING *",
    )
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found("Notification not found"))?;

    Ok(Envelope::with_message(notification, "Notification marked as read"))
}

async fn delete_notification(
    _caller: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<()>>> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
        .bind(id)
        .execute(&db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("Notification not found"));
    }
    Ok(Envelope::message("Notification deleted successfully"))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", post(create_notification))
        .route("/notifications/send-push", post(send_push))
        .route("/notifications/{id}", delete(delete_notification))
        .route("/notifications/{id}/read", put(mark_read))
        .route("/notifications/user/{id}", get(list_for_user))
}
