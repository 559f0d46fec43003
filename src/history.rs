//! Chat history store.
//!
//! One table, two operations: append a completed exchange, and fetch the
//! most recent N turns in chronological order for prompt context. Rows are
//! never updated or deleted.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

/// One persisted exchange: the verbatim user input and the normalized
/// answer that was returned for it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatTurn {
    pub id: i64,
    pub user_message: String,
    pub ai_response: String,
}

/// Insert a completed turn. Committed before returning.
///
/// Empty strings are legal values; the columns are NOT NULL but carry no
/// non-empty constraint.
pub async fn append_turn(pool: &SqlitePool, user_message: &str, ai_response: &str) -> Result<()> {
    sqlx::query("INSERT INTO chat_history (user_message, ai_response) VALUES (?1, ?2)")
        .bind(user_message)
        .bind(ai_response)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch the last `n` turns, oldest of the window first.
///
/// Selects ordered by id descending with a limit, then reverses locally.
/// The two steps together are what define "last N, oldest-first"; a native
/// ascending query would return the first N instead.
pub async fn fetch_recent(pool: &SqlitePool, n: i64) -> Result<Vec<ChatTurn>> {
    let mut turns: Vec<ChatTurn> = sqlx::query_as(
        "SELECT id, user_message, ai_response FROM chat_history ORDER BY id DESC LIMIT ?1",
    )
    .bind(n)
    .fetch_all(pool)
    .await?;

    turns.reverse();
    Ok(turns)
}
