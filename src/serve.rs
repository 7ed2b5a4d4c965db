use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use anyhow::Context as _;
use axum::{
    Json, Router,
    extract::FromRef,
    middleware,
    routing::get,
};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity, log::LevelFilter};
use figment::{Figment, providers::Format as _};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::credentials;
use crate::db::{Db, establish_pool};
use crate::logging;
use crate::services::Services;
pub use crate::error::Error;

/// The application user agent. Concatenates the package name and version. e.g. `blotterd/0.1.0`.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// The application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug, Clone)]
/// Command line arguments.
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "default.toml")]
    pub config: PathBuf,
    /// The verbosity level.
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Clone, FromRef)]
/// The application state, shared across all routes.
pub struct AppState {
    /// The application configuration.
    pub config: AppConfig,
    /// The database connection pool.
    pub db: Db,
    /// The HTTP client for outbound collaborator calls.
    pub client: reqwest::Client,
    /// Outbound capability handles (email, push, images, export).
    pub services: Services,
}

/// The health check route.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Build the application state from a loaded configuration: database pool,
/// migrations, outbound client, capability handles.
pub(crate) async fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let client = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .context("failed to build requester client")?;

    let db = establish_pool(&config.db)
        .await
        .context("failed to establish database connection pool")?;

    sqlx::migrate!()
        .run(&db)
        .await
        .context("failed to apply migrations")?;

    let services = Services::new(client.clone(), &config);

    Ok(AppState {
        config,
        db,
        client,
        services,
    })
}

/// Assemble the router over a prepared state.
pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(super::index))
        .route("/health", get(health))
        .nest("/api", super::endpoints::routes())
        .layer(middleware::from_fn_with_state(
            state.db.clone(),
            logging::error_log_layer,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main application entry point.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up trace logging to console and account for the user-provided verbosity flag.
    if args.verbosity.log_level_filter() != LevelFilter::Off {
        let lvl = match args.verbosity.log_level_filter() {
            LevelFilter::Error => tracing::Level::ERROR,
            LevelFilter::Warn => tracing::Level::WARN,
            LevelFilter::Info | LevelFilter::Off => tracing::Level::INFO,
            LevelFilter::Debug => tracing::Level::DEBUG,
            LevelFilter::Trace => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(lvl).init();
    }

    if !args.config.exists() {
        // Not fatal: every setting can come from the environment, but a
        // missing file usually means a forgotten mount.
        warn!(
            "configuration file {} does not exist",
            args.config.display()
        );
    }

    // Read and parse the user-provided configuration.
    let config: AppConfig = Figment::new()
        .admerge(figment::providers::Toml::file(args.config))
        .admerge(figment::providers::Env::prefixed("BLOTTERD_"))
        .extract()
        .context("failed to load configuration")?;

    if config.test {
        warn!("blotterd starting up in TEST mode.");
        warn!("Outbound email/push/export calls are disabled.");
        warn!(
            "If you want to turn this off, either set `test` to false in the config or define `BLOTTERD_TEST = false`"
        );
    }

    // Initialize metrics reporting.
    crate::metrics::setup(config.metrics.as_ref()).context("failed to set up metrics exporter")?;

    if let Some(parent) = config
        .db
        .strip_prefix("sqlite://")
        .map(PathBuf::from)
        .and_then(|p| p.parent().map(PathBuf::from))
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(&parent)
            .await
            .context("failed to create data directory")?;
    }

    let addr = config
        .listen_address
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000));

    let state = build_state(config).await?;
    let db = state.db.clone();
    let app = build_router(state);

    info!("listening on {addr}");
    info!("connect to: http://127.0.0.1:{}", addr.port());

    // Determine whether or not this was the first startup (i.e. no admin
    // account exists). If so, create one and share its credentials via the
    // console.
    let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(&db)
        .await
        .context("failed to query admin accounts")?;

    #[expect(clippy::print_stdout)]
    if admins == 0 {
        let password = credentials::generate_password();
        let hash = credentials::hash_password(&password)?;

        sqlx::query(
            "INSERT INTO users
                 (username, email, password, first_name, last_name, role,
                  email_verified, profile_completed)
             VALUES ('admin', 'admin@blotterd.local', ?, 'System', 'Administrator',
                     'admin', 1, 1)",
        )
        .bind(&hash)
        .execute(&db)
        .await
        .context("failed to create admin account")?;

        // N.B: This is a sensitive message, so we're bypassing `tracing` here and
        // logging it directly to console.
        println!("=====================================");
        println!("            FIRST STARTUP            ");
        println!("=====================================");
        println!("Sign in as admin@blotterd.local with:");
        println!("{password}");
        println!("=====================================");
    }

    let listener = TcpListener::bind(&addr)
        .await
        .context("failed to bind address")?;

    axum::serve(listener, app.into_make_service())
        .await
        .context("failed to serve app")
}
