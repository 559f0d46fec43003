//! Delegated query agent.
//!
//! The orchestrator hands the agent one directive string and gets back one
//! best-effort answer; everything in between is the agent's business. The
//! real implementation, [`SqlAgent`], runs a small plan → guard → execute →
//! compose loop:
//!
//! 1. **Plan** — ask the model for either a single SELECT or a direct
//!    general-knowledge answer.
//! 2. **Guard** — reject anything that is not a lone read-only statement,
//!    and run it on a read-only pool so the database, not the prompt text,
//!    is the actual safety boundary.
//! 3. **Execute** — cap the row count and convert results to JSON.
//! 4. **Compose** — a second model call turns the rows into prose, or falls
//!    back to general knowledge when nothing matched.
//!
//! No SQL text or intermediate step leaks to the caller; the contract is
//! `invoke(directive) -> Result<String>` and nothing more.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::prompt::{
    build_composer_prompt, build_fallback_prompt, build_planner_prompt, SearchStrategy,
};

/// An external collaborator that answers one directive with one string.
///
/// Modeled as a capability rather than a library call so the orchestrator
/// can be tested against fakes.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn invoke(&self, directive: &str) -> Result<String>;
}

/// What the planning call decided.
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    /// Run this SELECT against the catalog.
    Sql(String),
    /// Answer directly from general knowledge.
    Answer(String),
}

/// Text-to-SQL agent over the product catalog.
pub struct SqlAgent {
    llm: Arc<dyn LlmClient>,
    pool: SqlitePool,
    strategy: SearchStrategy,
    max_result_rows: i64,
    /// One-line schema summary included in the planning prompt,
    /// e.g. `product_details(product_name, price, available, rating)`.
    schema: String,
}

impl SqlAgent {
    /// Build an agent over a read-only catalog pool.
    ///
    /// Introspects the catalog table's columns once so every planning
    /// prompt carries the real schema. Fails if the table does not exist —
    /// the catalog is externally owned and must pre-exist.
    pub async fn new(
        llm: Arc<dyn LlmClient>,
        pool: SqlitePool,
        config: &AgentConfig,
    ) -> Result<Self> {
        let strategy = SearchStrategy::parse(&config.search_strategy).ok_or_else(|| {
            anyhow::anyhow!("Unknown agent.search_strategy: {}", config.search_strategy)
        })?;

        let schema = introspect_table(&pool, &config.catalog_table).await?;

        Ok(Self {
            llm,
            pool,
            strategy,
            max_result_rows: config.max_result_rows,
            schema,
        })
    }
}

#[async_trait]
impl QueryAgent for SqlAgent {
    async fn invoke(&self, directive: &str) -> Result<String> {
        let planner_prompt = build_planner_prompt(self.strategy, &self.schema, directive);
        let reply = self
            .llm
            .generate(&planner_prompt)
            .await
            .context("agent planning call failed")?;

        let sql = match parse_plan(&reply) {
            Plan::Answer(text) => return Ok(text),
            Plan::Sql(sql) => sql,
        };

        ensure_read_only(&sql)?;
        let sql = apply_row_limit(&sql, self.max_result_rows);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("catalog query failed: {}", sql))?;

        if rows.is_empty() {
            // No database match: switch to general knowledge.
            return self.llm.generate(&build_fallback_prompt(directive)).await;
        }

        let rows_json = serde_json::to_string_pretty(&rows_to_json(&rows)?)?;
        self.llm
            .generate(&build_composer_prompt(directive, &sql, &rows_json))
            .await
    }
}

/// List a table's columns as `name(col, col, ...)`.
async fn introspect_table(pool: &SqlitePool, table: &str) -> Result<String> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .bind(table)
            .fetch_all(pool)
            .await?;

    if columns.is_empty() {
        bail!("catalog table '{}' not found in database", table);
    }

    Ok(format!("{}({})", table, columns.join(", ")))
}

/// Decide whether the model's planning reply is a query or a direct answer.
///
/// Accepts `SQL:` / `ANSWER:` prefixes per the output protocol, tolerates
/// markdown code fences, and treats a bare `SELECT`/`WITH` as a query.
/// Anything else is a direct answer returned verbatim.
fn parse_plan(reply: &str) -> Plan {
    let text = strip_code_fence(reply.trim());

    if let Some(rest) = strip_prefix_ci(text, "SQL:") {
        return Plan::Sql(strip_code_fence(rest.trim()).trim().to_string());
    }
    if let Some(rest) = strip_prefix_ci(text, "ANSWER:") {
        return Plan::Answer(rest.trim().to_string());
    }

    let first_word = text
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if first_word == "select" || first_word == "with" {
        return Plan::Sql(text.trim().to_string());
    }

    Plan::Answer(text.trim().to_string())
}

/// Remove one layer of ``` fencing, with or without a language tag.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some(s) = trimmed.strip_prefix("```sql") {
        s
    } else if let Some(s) = trimmed.strip_prefix("```") {
        s
    } else {
        trimmed
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Reject anything that is not a single read-only statement.
///
/// The agent's pool is already opened read-only; this check exists so a
/// mutating statement fails with a readable message before reaching the
/// database, and so statement stacking (`SELECT 1; DROP ...`) is caught
/// even where the driver would run only the first statement.
fn ensure_read_only(sql: &str) -> Result<()> {
    let trimmed = sql.trim().trim_end_matches(';').trim();

    if trimmed.is_empty() {
        bail!("agent produced an empty SQL statement");
    }
    if trimmed.contains(';') {
        bail!("agent produced multiple SQL statements");
    }

    let first_word = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if first_word != "select" && first_word != "with" {
        bail!("agent produced a non-SELECT statement: {}", first_word);
    }

    // "replace" is absent on purpose: replace() is a legitimate string
    // function, and the mutating form (INSERT OR REPLACE) is already
    // caught by "insert".
    const FORBIDDEN: &[&str] = &[
        "insert", "update", "delete", "drop", "alter", "create", "pragma", "attach", "detach",
        "vacuum", "reindex",
    ];
    for word in trimmed.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        let lower = word.to_ascii_lowercase();
        if FORBIDDEN.contains(&lower.as_str()) {
            bail!("agent produced a forbidden SQL keyword: {}", lower);
        }
    }

    Ok(())
}

/// Append `LIMIT n` when the statement has none.
fn apply_row_limit(sql: &str, max_rows: i64) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let has_limit = trimmed
        .split_whitespace()
        .any(|w| w.eq_ignore_ascii_case("limit"));
    if has_limit {
        trimmed.to_string()
    } else {
        format!("{} LIMIT {}", trimmed, max_rows)
    }
}

/// Convert dynamically-typed result rows into a JSON array of objects.
fn rows_to_json(rows: &[SqliteRow]) -> Result<serde_json::Value> {
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let mut obj = serde_json::Map::new();
        for (i, column) in row.columns().iter().enumerate() {
            let raw = row.try_get_raw(i)?;
            let value = if raw.is_null() {
                serde_json::Value::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => serde_json::Value::from(row.try_get::<i64, _>(i)?),
                    "REAL" | "NUMERIC" => serde_json::Value::from(row.try_get::<f64, _>(i)?),
                    "TEXT" | "DATETIME" => serde_json::Value::from(row.try_get::<String, _>(i)?),
                    // BLOB and anything exotic: report length only
                    _ => serde_json::Value::from(format!(
                        "<{} bytes>",
                        row.try_get::<Vec<u8>, _>(i).map(|b| b.len()).unwrap_or(0)
                    )),
                }
            };
            obj.insert(column.name().to_string(), value);
        }
        out.push(serde_json::Value::Object(obj));
    }

    Ok(serde_json::Value::Array(out))
}
