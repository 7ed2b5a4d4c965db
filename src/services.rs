//! Outbound collaborator capabilities: email, push notifications, image
//! storage, and document export.
//!
//! Each capability is a cloneable handle around the shared HTTP client and
//! its config section. An unconfigured capability is *disabled*: calls log
//! and return without contacting anything, so the service runs fine without
//! any of them (tests point the endpoints at a local fake instead). Every
//! call is time-bounded; none of them may block a persistence path.

use std::{collections::HashMap, time::Duration};

use anyhow::{Context as _, anyhow};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{AppConfig, EmailConfig, ExportConfig, PushConfig, UploadConfig};
use crate::models::Report;

/// Timeout for any single collaborator call.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Services {
    pub mailer: Mailer,
    pub push: PushGateway,
    pub images: ImageStore,
    pub exporter: Exporter,
}

impl Services {
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        // Test mode severs all outbound calls regardless of configuration.
        let enabled = !config.test;
        Self {
            mailer: Mailer {
                client: client.clone(),
                config: config.email.clone().filter(|_| enabled),
            },
            push: PushGateway {
                client: client.clone(),
                config: config.push.clone().filter(|_| enabled),
            },
            images: ImageStore {
                client: client.clone(),
                config: config.upload.clone().filter(|_| enabled),
            },
            exporter: Exporter {
                client,
                config: config.export.clone().filter(|_| enabled),
            },
        }
    }
}

/// Email delivery: `(to, subject, html body) -> delivered?`.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    config: Option<EmailConfig>,
}

impl Mailer {
    /// Send an email. Returns `Ok(false)` when the mailer is disabled.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<bool> {
        let Some(config) = &self.config else {
            debug!("mailer disabled, skipping email to {to}");
            return Ok(false);
        };

        let resp = self
            .client
            .post(&config.endpoint)
            .timeout(CALL_TIMEOUT)
            .json(&json!({
                "from": config.from,
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("email gateway unreachable")?;

        if !resp.status().is_success() {
            return Err(anyhow!("email gateway returned {}", resp.status()));
        }
        Ok(true)
    }
}

/// Push delivery: `(device token, title, body, data) -> message id`.
#[derive(Clone)]
pub struct PushGateway {
    client: reqwest::Client,
    config: Option<PushConfig>,
}

impl PushGateway {
    pub const fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: HashMap<String, String>,
    ) -> anyhow::Result<String> {
        let Some(config) = &self.config else {
            debug!("push gateway disabled, skipping notification");
            return Ok(String::new());
        };

        let resp = self
            .client
            .post(&config.endpoint)
            .timeout(CALL_TIMEOUT)
            .json(&json!({
                "token": token,
                "title": title,
                "body": body,
                "data": data,
            }))
            .send()
            .await
            .context("push gateway unreachable")?;

        if !resp.status().is_success() {
            return Err(anyhow!("push gateway returned {}", resp.status()));
        }

        let reply: serde_json::Value = resp.json().await.unwrap_or_default();
        Ok(reply
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned())
    }
}

/// Image storage: `(source url, folder) -> public url`.
#[derive(Clone)]
pub struct ImageStore {
    client: reqwest::Client,
    config: Option<UploadConfig>,
}

impl ImageStore {
    /// Re-host an image from `source_url` and return its public URL.
    ///
    /// When the store is disabled the source URL passes through unchanged,
    /// matching the original deployment's behavior without a CDN.
    pub async fn store_from_url(&self, source_url: &str, folder: &str) -> anyhow::Result<String> {
        let Some(config) = &self.config else {
            warn!("image store disabled, keeping source url");
            return Ok(source_url.to_owned());
        };

        let resp = self
            .client
            .post(&config.endpoint)
            .timeout(CALL_TIMEOUT)
            .json(&json!({
                "url": source_url,
                "folder": format!("{}/{folder}", config.folder),
            }))
            .send()
            .await
            .context("image store unreachable")?;

        if !resp.status().is_success() {
            return Err(anyhow!("image store returned {}", resp.status()));
        }

        let reply: serde_json::Value = resp.json().await.context("invalid image store reply")?;
        reply
            .get("url")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned)
            .context("image store reply missing url")
    }
}

/// Document rendering: `(format, rows) -> download url`.
#[derive(Clone)]
pub struct Exporter {
    client: reqwest::Client,
    config: Option<ExportConfig>,
}

impl Exporter {
    /// Render the given reports into `format` ("pdf", "csv", "xlsx").
    ///
    /// Unlike the other capabilities there is no useful disabled fallback:
    /// export *is* the operation, so an unconfigured exporter is an error
    /// the caller surfaces to the client.
    pub async fn export(&self, format: &str, reports: &[Report]) -> anyhow::Result<String> {
        let Some(config) = &self.config else {
            return Err(anyhow!("export service is not configured"));
        };

        let resp = self
            .client
            .post(&config.endpoint)
            .timeout(CALL_TIMEOUT)
            .json(&json!({
                "format": format,
                "reports": reports,
            }))
            .send()
            .await
            .context("export service unreachable")?;

        if !resp.status().is_success() {
            return Err(anyhow!("export service returned {}", resp.status()));
        }

        let reply: serde_json::Value = resp.json().await.context("invalid export reply")?;
        reply
            .get("url")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned)
            .context("export reply missing url")
    }
}

/// Render the verification-code email.
pub fn verification_email(name: &str, code: &str) -> (String, String) {
    (
        "BMS Account Verification Code".to_owned(),
        format!(
            "<p>Hello <strong>{name}</strong>,</p>\
             <p>Your verification code is <strong>{code}</strong>. \
             It expires in 10 minutes.</p>\
             <p>If you did not request this code, ignore this email.</p>"
        ),
    )
}

/// Render the password-reset email.
pub fn password_reset_email(name: &str, code: &str) -> (String, String) {
    (
        "BMS Password Reset Code".to_owned(),
        format!(
            "<p>Hello <strong>{name}</strong>,</p>\
             <p>Your password reset code is <strong>{code}</strong>. \
             It expires in 1 hour.</p>\
             <p>If you did not request a reset, ignore this email.</p>"
        ),
    )
}

/// Render the generated-credentials email for a new officer account.
pub fn officer_credentials_email(name: &str, username: &str, password: &str) -> (String, String) {
    (
        "Your BMS Officer Account".to_owned(),
        format!(
            "<p>Hello <strong>{name}</strong>,</p>\
             <p>An officer account has been created for you.</p>\
             <p>Username: <strong>{username}</strong><br>\
             Temporary password: <strong>{password}</strong></p>\
             <p>Change the password after your first login.</p>"
        ),
    )
}
