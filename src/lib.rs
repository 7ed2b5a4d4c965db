//! Blotter Management System backend.
mod analytics;
mod auth;
mod config;
mod credentials;
mod db;
mod endpoints;
pub mod error;
mod lifecycle;
mod logging;
mod metrics;
mod models;
mod serve;
mod services;
#[cfg(test)]
mod tests;

pub use serve::{AppState, Result, run};

/// The index (/) route.
async fn index() -> impl axum::response::IntoResponse {
    r"
blotterd - Blotter Management System API

Incident reports, officers, hearings, and resolutions for a barangay
case desk.

API routes are under /api/
Health check is at /health
    "
}
