use std::net::SocketAddr;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// Address to listen on. Defaults to 127.0.0.1:8000 when absent.
    pub listen_address: Option<SocketAddr>,
    /// Database connection string, e.g. `sqlite://data/blotter.db`.
    #[serde(default = "default_db")]
    pub db: String,
    /// Session lifetime in hours.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,
    /// Test mode: outbound collaborator calls are skipped entirely.
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub upload: Option<UploadConfig>,
    #[serde(default)]
    pub export: Option<ExportConfig>,
    #[serde(default)]
    pub metrics: Option<MetricConfig>,
}

fn default_db() -> String {
    "sqlite://data/blotter.db".to_owned()
}

const fn default_session_ttl() -> i64 {
    24
}

/// Outbound email gateway. Unset means email delivery is disabled and
/// sends are logged and skipped.
#[derive(Deserialize, Debug, Clone)]
pub struct EmailConfig {
    pub endpoint: String,
    pub from: String,
}

/// Push-notification gateway for registered device tokens.
#[derive(Deserialize, Debug, Clone)]
pub struct PushConfig {
    pub endpoint: String,
}

/// Image storage service for profile photos.
#[derive(Deserialize, Debug, Clone)]
pub struct UploadConfig {
    pub endpoint: String,
    pub folder: String,
}

/// Document rendering service for PDF/CSV/Excel exports.
#[derive(Deserialize, Debug, Clone)]
pub struct ExportConfig {
    pub endpoint: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum MetricConfig {
    PrometheusPush(PrometheusConfig),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrometheusConfig {
    pub url: String,
}
