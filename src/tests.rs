//! Testing utilities for the blotter backend.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context as _, Result};
use figment::{Figment, providers::Format as _};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Db;
use crate::serve::{build_router, build_state};

/// Global test state, created once for all tests.
static TEST_STATE: OnceCell<TestState> = OnceCell::const_new();

/// A temporary test directory that will be cleaned up when the struct is dropped.
struct TempDir {
    /// The path to the directory.
    path: PathBuf,
}

impl TempDir {
    /// Create a new temporary directory.
    fn new() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("blotterd-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Get the path to the directory.
    fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Test state for the application.
struct TestState {
    /// The temporary directory for test data.
    _temp_dir: TempDir,
    /// The address the test server is listening on.
    address: SocketAddr,
    /// A database handle into the same store the server uses.
    db: Db,
    /// The HTTP client.
    client: reqwest::Client,
}

impl TestState {
    /// Create a new test state and start the app in a background task.
    async fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;

        // Find a free port
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))?;
        let address = listener.local_addr()?;
        drop(listener);

        // Configure the test app
        #[derive(Serialize, Deserialize)]
        struct TestConfigInput {
            db: Option<String>,
            listen_address: Option<SocketAddr>,
            test: Option<bool>,
        }

        let test_config = TestConfigInput {
            db: Some(format!("sqlite://{}/test.db", temp_dir.path().display())),
            listen_address: Some(address),
            test: Some(true),
        };

        let config: AppConfig = Figment::new()
            .admerge(figment::providers::Toml::string("session_ttl_hours = 24"))
            .merge(figment::providers::Serialized::defaults(test_config))
            .extract()?;

        let state = build_state(config).await.context("failed to build state")?;
        let db = state.db.clone();
        let app = build_router(state);

        // Host the shared server on a dedicated thread with its own runtime so
        // it outlives the individual `#[tokio::test]` runtime that happens to
        // initialize `TEST_STATE`. Spawning onto the initializing test's
        // runtime would leave the server dead once that test completes.
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build test server runtime");
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::bind(&address)
                    .await
                    .expect("failed to bind address");
                let _ = axum::serve(listener, app.into_make_service()).await;
            });
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(200)).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            _temp_dir: temp_dir,
            address,
            db,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    /// Register an account and return `(user id, session token)`.
    async fn register(&self, email: &str, password: &str) -> Result<(i64, String)> {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": email.split('@').next(),
                "email": email,
                "password": password,
                "confirmPassword": password,
                "firstName": "Test",
                "lastName": "User",
            }))
            .send()
            .await?;
        anyhow::ensure!(response.status() == 201, "register failed: {}", response.status());

        let body: Value = response.json().await?;
        let user_id = body["data"]["user"]["id"].as_i64().context("no user id")?;
        let token = body["data"]["token"].as_str().context("no token")?.to_owned();
        Ok((user_id, token))
    }

    /// Log in and return the response body.
    async fn login(&self, email: &str, password: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?)
    }

    /// Promote a user to admin directly in the store.
    async fn make_admin(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET role = 'admin' WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Initialize the test state.
async fn init_test_state() -> Result<&'static TestState> {
    TEST_STATE.get_or_try_init(TestState::new).await
}

#[tokio::test]
async fn register_validates_and_conflicts() -> Result<()> {
    let state = init_test_state().await?;

    // Mismatched confirmation never inserts a row.
    let response = state
        .client
        .post(state.url("/api/auth/register"))
        .json(&json!({
            "email": "mismatch@example.com",
            "password": "one",
            "confirmPassword": "two",
            "firstName": "No",
            "lastName": "Body",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let inserted =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind("mismatch@example.com")
            .fetch_one(&state.db)
            .await?;
    assert_eq!(inserted, 0);

    // First registration succeeds; the duplicate conflicts and leaves the
    // stored hash untouched.
    let (_, _) = state.register("dup@example.com", "password1!").await?;
    let hash_before =
        sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE email = ?")
            .bind("dup@example.com")
            .fetch_one(&state.db)
            .await?;

    let response = state
        .client
        .post(state.url("/api/auth/register"))
        .json(&json!({
            "email": "dup@example.com",
            "password": "different2!",
            "confirmPassword": "different2!",
            "firstName": "Du",
            "lastName": "Plicate",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);

    let hash_after =
        sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE email = ?")
            .bind("dup@example.com")
            .fetch_one(&state.db)
            .await?;
    assert_eq!(hash_before, hash_after);

    Ok(())
}

#[tokio::test]
async fn login_returns_token_and_never_the_hash() -> Result<()> {
    let state = init_test_state().await?;
    state.register("carol@example.com", "secret123!").await?;

    let response = state.login("carol@example.com", "secret123!").await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["data"]["user"].get("password").is_none());
    assert!(!body.to_string().contains("$argon2"));

    // Wrong password is a 401.
    let response = state.login("carol@example.com", "wrong").await?;
    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn inactive_account_is_forbidden() -> Result<()> {
    let state = init_test_state().await?;
    let (user_id, _) = state.register("inactive@example.com", "secret123!").await?;

    sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
        .bind(user_id)
        .execute(&state.db)
        .await?;

    let response = state.login("inactive@example.com", "secret123!").await?;
    assert_eq!(response.status(), 403);

    Ok(())
}

#[tokio::test]
async fn legacy_plaintext_password_upgrades_on_login() -> Result<()> {
    let state = init_test_state().await?;

    sqlx::query(
        "INSERT INTO users (email, password, first_name, last_name) VALUES (?, ?, 'Old', 'Timer')",
    )
    .bind("legacy@example.com")
    .bind("plaintextpw")
    .execute(&state.db)
    .await?;

    let response = state.login("legacy@example.com", "plaintextpw").await?;
    assert_eq!(response.status(), 200);

    let stored = sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE email = ?")
        .bind("legacy@example.com")
        .fetch_one(&state.db)
        .await?;
    assert!(stored.starts_with("$argon2"), "password was not rehashed");

    // The same credential still works against the upgraded hash.
    let response = state.login("legacy@example.com", "plaintextpw").await?;
    assert_eq!(response.status(), 200);

    Ok(())
}

#[tokio::test]
async fn reset_codes_are_single_use_and_expire() -> Result<()> {
    let state = init_test_state().await?;
    state.register("resetme@example.com", "original1!").await?;

    // Let the registration's background verification-code task finish so it
    // cannot overwrite the reset code issued below.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let response = state
        .client
        .post(state.url("/api/auth/forgot-password"))
        .json(&json!({ "email": "resetme@example.com" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let code = sqlx::query_scalar::<_, String>("SELECT reset_code FROM users WHERE email = ?")
        .bind("resetme@example.com")
        .fetch_one(&state.db)
        .await?;

    // Redeem once.
    let response = state
        .client
        .post(state.url("/api/auth/reset-password"))
        .json(&json!({
            "email": "resetme@example.com",
            "code": code,
            "newPassword": "changed2!",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(state.login("resetme@example.com", "changed2!").await?.status(), 200);

    // The code was cleared; a second redemption fails.
    let response = state
        .client
        .post(state.url("/api/auth/reset-password"))
        .json(&json!({
            "email": "resetme@example.com",
            "code": code,
            "newPassword": "changed3!",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert!(body["message"].as_str().unwrap_or_default().contains("Invalid"));

    // A matching code past its expiry is rejected as expired.
    sqlx::query(
        "UPDATE users SET reset_code = '123456', reset_code_expiry = 1 WHERE email = ?",
    )
    .bind("resetme@example.com")
    .execute(&state.db)
    .await?;

    let response = state
        .client
        .post(state.url("/api/auth/reset-password"))
        .json(&json!({
            "email": "resetme@example.com",
            "code": "123456",
            "newPassword": "changed4!",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert!(body["message"].as_str().unwrap_or_default().contains("expired"));

    Ok(())
}

#[tokio::test]
async fn google_signin_conflicts_with_password_accounts() -> Result<()> {
    let state = init_test_state().await?;
    state.register("mixed@example.com", "password1!").await?;

    let response = state
        .client
        .post(state.url("/api/auth/google-signin"))
        .json(&json!({ "email": "mixed@example.com", "displayName": "Mixed Up" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    // A fresh email is created and the upsert is idempotent.
    for _ in 0..2 {
        let response = state
            .client
            .post(state.url("/api/auth/google-signin"))
            .json(&json!({ "email": "googler@example.com", "displayName": "Goo Gler" }))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
    }
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind("googler@example.com")
        .fetch_one(&state.db)
        .await?;
    assert_eq!(count, 1);

    Ok(())
}

#[tokio::test]
async fn report_lifecycle_end_to_end() -> Result<()> {
    let state = init_test_state().await?;
    let (alice_id, token) = state.register("alice@example.com", "wonderland1!").await?;
    state.make_admin(alice_id).await?;

    let authed = |req: reqwest::RequestBuilder| req.header("Authorization", format!("Bearer {token}"));

    // File a case; status defaults to Pending.
    let response = authed(state.client.post(state.url("/api/reports")))
        .json(&json!({
            "caseNumber": "CASE-0001",
            "incidentType": "Theft",
            "incidentDate": "2025-06-01",
            "incidentTime": "21:30",
            "incidentLocation": "Market Street",
            "narrative": "Stolen bicycle outside the market.",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await?;
    let report_id = body["data"]["id"].as_i64().context("no report id")?;
    assert_eq!(body["data"]["status"], "Pending");

    // Duplicate case numbers conflict.
    let response = authed(state.client.post(state.url("/api/reports")))
        .json(&json!({
            "caseNumber": "CASE-0001",
            "incidentType": "Theft",
            "incidentDate": "2025-06-02",
            "incidentTime": "10:00",
            "incidentLocation": "Elsewhere",
            "narrative": "Duplicate.",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    // Assign an officer; the case advances to Assigned.
    let response = authed(
        state
            .client
            .put(state.url(&format!("/api/reports/{report_id}/assign"))),
    )
    .json(&json!({ "assignedOfficerId": alice_id, "assignedOfficerName": "Officer Alice" }))
    .send()
    .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["status"], "Assigned");

    // The Assigned status view includes it.
    let response = authed(state.client.get(state.url("/api/reports/status/Assigned")))
        .send()
        .await?;
    let body: Value = response.json().await?;
    let listed = body["data"]
        .as_array()
        .context("no data array")?
        .iter()
        .any(|r| r["caseNumber"] == "CASE-0001");
    assert!(listed);

    // Backward status writes are rejected.
    let response = authed(
        state
            .client
            .put(state.url(&format!("/api/reports/{report_id}"))),
    )
    .json(&json!({ "status": "Pending" }))
    .send()
    .await?;
    assert_eq!(response.status(), 400);

    // Resolved requires a resolution record.
    let response = authed(
        state
            .client
            .put(state.url(&format!("/api/reports/{report_id}"))),
    )
    .json(&json!({ "status": "Resolved" }))
    .send()
    .await?;
    assert_eq!(response.status(), 400);

    // Filing a resolution closes the case.
    let response = authed(
        state
            .client
            .post(state.url(&format!("/api/reports/{report_id}/resolution"))),
    )
    .json(&json!({
        "resolutionDate": "2025-06-10",
        "resolutionType": "Mediation",
        "description": "Settled between parties.",
    }))
    .send()
    .await?;
    assert_eq!(response.status(), 201);

    let response = authed(
        state
            .client
            .get(state.url(&format!("/api/reports/{report_id}"))),
    )
    .send()
    .await?;
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["status"], "Resolved");

    // Reopening needs a reason and produces an audit entry.
    let response = authed(
        state
            .client
            .post(state.url(&format!("/api/reports/{report_id}/reopen"))),
    )
    .json(&json!({ "reason": "" }))
    .send()
    .await?;
    assert_eq!(response.status(), 400);

    let response = authed(
        state
            .client
            .post(state.url(&format!("/api/reports/{report_id}/reopen"))),
    )
    .json(&json!({ "reason": "New evidence surfaced" }))
    .send()
    .await?;
    assert_eq!(response.status(), 200);
    let audit_entries = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM audit_logs WHERE report_id = ? AND action = 'reopen'",
    )
    .bind(report_id)
    .fetch_one(&state.db)
    .await?;
    assert_eq!(audit_entries, 1);

    // Archive: hidden from the default list, present in the archived view,
    // still fetchable by id.
    let response = authed(
        state
            .client
            .put(state.url(&format!("/api/reports/{report_id}/archive"))),
    )
    .send()
    .await?;
    assert_eq!(response.status(), 200);

    let body: Value = authed(state.client.get(state.url("/api/reports")))
        .send()
        .await?
        .json()
        .await?;
    let in_default = body["data"]
        .as_array()
        .context("no data array")?
        .iter()
        .any(|r| r["caseNumber"] == "CASE-0001");
    assert!(!in_default);

    let body: Value = authed(state.client.get(state.url("/api/reports?archived=true")))
        .send()
        .await?
        .json()
        .await?;
    let in_archived = body["data"]
        .as_array()
        .context("no data array")?
        .iter()
        .any(|r| r["caseNumber"] == "CASE-0001");
    assert!(in_archived);

    let response = authed(
        state
            .client
            .get(state.url(&format!("/api/reports/{report_id}"))),
    )
    .send()
    .await?;
    assert_eq!(response.status(), 200);

    Ok(())
}

#[tokio::test]
async fn reports_require_authentication() -> Result<()> {
    let state = init_test_state().await?;

    let response = state.client.get(state.url("/api/reports")).send().await?;
    assert_eq!(response.status(), 401);

    let response = state
        .client
        .get(state.url("/api/reports"))
        .header("Authorization", "Bearer not-a-session")
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn notifications_persist_and_mark_read() -> Result<()> {
    let state = init_test_state().await?;
    let (user_id, token) = state.register("notify@example.com", "password1!").await?;

    let response = state
        .client
        .post(state.url("/api/notifications"))
        .header("Authorization", format!("Bearer {token}"))
        .json(&json!({
            "userId": user_id,
            "title": "Hearing scheduled",
            "message": "Your hearing is on Friday.",
            "type": "hearing",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await?;
    let notification_id = body["data"]["id"].as_i64().context("no id")?;
    assert_eq!(body["data"]["isRead"], false);

    let response = state
        .client
        .put(state.url(&format!("/api/notifications/{notification_id}/read")))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["isRead"], true);
    assert!(body["data"]["readAt"].as_str().is_some());

    // Unknown ids are a 404.
    let response = state
        .client
        .put(state.url("/api/notifications/999999/read"))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn search_and_dashboard_cover_archived_flags() -> Result<()> {
    let state = init_test_state().await?;
    let (_, token) = state.register("searcher@example.com", "password1!").await?;
    let authed = |req: reqwest::RequestBuilder| req.header("Authorization", format!("Bearer {token}"));

    let response = authed(state.client.post(state.url("/api/reports")))
        .json(&json!({
            "caseNumber": "CASE-SRCH-1",
            "incidentType": "Vandalism",
            "incidentDate": "2025-05-20",
            "incidentTime": "02:00",
            "incidentLocation": "Riverside Park",
            "narrative": "Graffiti on the pavilion wall.",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);

    // Case-insensitive substring search over the narrative.
    let body: Value = authed(state.client.get(state.url("/api/search/reports?q=GRAFFITI")))
        .send()
        .await?
        .json()
        .await?;
    let found = body["data"]
        .as_array()
        .context("no data array")?
        .iter()
        .any(|r| r["caseNumber"] == "CASE-SRCH-1");
    assert!(found);

    // Date-range filtering is real: a window around the incident matches, a
    // disjoint one does not.
    let body: Value = authed(state.client.post(state.url("/api/search/advanced")))
        .json(&json!({ "dateFrom": "2025-05-01", "dateTo": "2025-05-31", "location": "riverside" }))
        .send()
        .await?
        .json()
        .await?;
    assert!(body["data"]["count"].as_u64().unwrap_or(0) >= 1);

    let body: Value = authed(state.client.post(state.url("/api/search/advanced")))
        .json(&json!({ "dateFrom": "2024-01-01", "dateTo": "2024-12-31", "location": "riverside" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["count"].as_u64().unwrap_or(99), 0);

    let body: Value = authed(state.client.get(state.url("/api/analytics/dashboard")))
        .send()
        .await?
        .json()
        .await?;
    assert!(body["data"]["totalReports"].as_i64().unwrap_or(0) >= 1);

    Ok(())
}
