use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl DbConfig {
    /// The effective database location. `DATABASE_URL` in the environment
    /// takes precedence over the config file; secrets and deploy-specific
    /// connection strings never live in the TOML.
    pub fn effective_path(&self) -> PathBuf {
        match std::env::var("DATABASE_URL") {
            Ok(url) => PathBuf::from(url.trim_start_matches("sqlite:").to_string()),
            Err(_) => self.path.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: 30,
            max_retries: 5,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_temperature() -> f64 {
    0.0
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

/// How the agent is told to match product names in generated SQL.
///
/// The strategies differ only in the static directive text prepended to the
/// agent's system prefix; see [`crate::prompt::SearchStrategy`].
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_catalog_table")]
    pub catalog_table: String,
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: i64,
    #[serde(default = "default_search_strategy")]
    pub search_strategy: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            catalog_table: default_catalog_table(),
            max_result_rows: default_max_result_rows(),
            search_strategy: default_search_strategy(),
        }
    }
}

fn default_catalog_table() -> String {
    "product_details".to_string()
}
fn default_max_result_rows() -> i64 {
    10
}
fn default_search_strategy() -> String {
    "fuzzy".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_context_turns")]
    pub context_turns: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            context_turns: default_context_turns(),
        }
    }
}

fn default_context_turns() -> i64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.llm.provider.as_str() {
        "gemini" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be gemini or disabled.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.agent.max_result_rows < 1 {
        anyhow::bail!("agent.max_result_rows must be >= 1");
    }

    match config.agent.search_strategy.as_str() {
        "exact" | "fuzzy" | "two-step" => {}
        other => anyhow::bail!(
            "Unknown agent.search_strategy: '{}'. Must be exact, fuzzy, or two-step.",
            other
        ),
    }

    if config.history.context_turns < 1 {
        anyhow::bail!("history.context_turns must be >= 1");
    }

    if config.agent.catalog_table.is_empty() {
        anyhow::bail!("agent.catalog_table must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let f = write_config(
            r#"
[db]
path = "./data/assistant.sqlite"

[server]
bind = "127.0.0.1:8080"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.history.context_turns, 5);
        assert_eq!(cfg.agent.max_result_rows, 10);
        assert_eq!(cfg.agent.catalog_table, "product_details");
        assert_eq!(cfg.agent.search_strategy, "fuzzy");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let f = write_config(
            r#"
[db]
path = "x.sqlite"

[llm]
provider = "openai"

[server]
bind = "127.0.0.1:8080"
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_unknown_search_strategy_rejected() {
        let f = write_config(
            r#"
[db]
path = "x.sqlite"

[agent]
search_strategy = "regex"

[server]
bind = "127.0.0.1:8080"
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("search_strategy"));
    }

    #[test]
    fn test_bad_context_turns_rejected() {
        let f = write_config(
            r#"
[db]
path = "x.sqlite"

[history]
context_turns = 0

[server]
bind = "127.0.0.1:8080"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
