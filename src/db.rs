use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = config.db.effective_path();

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Connect with a read-only handle for the delegated query agent.
///
/// The agent's prompt tells the model to never mutate, but prompt text is
/// advisory; this connection is the enforced boundary. Any INSERT, UPDATE,
/// DELETE, or DDL the model slips past the textual guard fails at the
/// database layer.
pub async fn connect_read_only(config: &Config) -> Result<SqlitePool> {
    let db_path = config.db.effective_path();

    // No journal-mode pragma here: changing it needs write access, which
    // this connection deliberately lacks.
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
