use std::str::FromStr as _;

use anyhow::Context as _;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};

/// The application-wide database handle.
pub type Db = SqlitePool;

/// Open (creating if missing) the SQLite database behind `url`.
///
/// Foreign keys are enforced on every connection; child-entity cascade on
/// report deletion depends on it.
pub async fn establish_pool(url: &str) -> anyhow::Result<Db> {
    let opts = SqliteConnectOptions::from_str(url)
        .context("failed to parse database options")?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePool::connect_with(opts)
        .await
        .context("failed to open database")
}
