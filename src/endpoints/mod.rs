use axum::Router;

use crate::AppState;

mod admin;
mod analytics;
mod auth;
mod hearings;
mod logs;
mod notifications;
mod officers;
mod reports;
mod users;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(officers::routes())
        .merge(reports::routes())
        .merge(hearings::routes())
        .merge(notifications::routes())
        .merge(analytics::routes())
        .merge(logs::routes())
        .merge(admin::routes())
}
