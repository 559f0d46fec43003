//! Request orchestration.
//!
//! One linear state machine per query, no retries, no branching:
//! validate → fetch history → assemble directive → invoke agent →
//! normalize → persist → respond. Every dependency is injected through
//! [`Assistant`], constructed once at startup and shared across requests;
//! there is no process-global state.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::agent::{QueryAgent, SqlAgent};
use crate::config::Config;
use crate::db;
use crate::history;
use crate::llm::{self, LlmClient};
use crate::migrate;
use crate::prompt::{assemble_directive, build_normalizer_prompt};

/// Error message for a blank query. The HTTP layer maps exactly this
/// message to a 400; everything else is a 500.
pub const EMPTY_QUERY_MSG: &str = "Query cannot be empty";

/// The outcome of one exchange.
#[derive(Debug)]
pub struct AskAnswer {
    /// The normalized, customer-facing answer.
    pub response: String,
    /// Whether the turn made it into chat history. A persistence failure
    /// does not fail the request; the answer is still returned and the
    /// turn is lost from future context.
    pub saved: bool,
}

/// The assembled pipeline: history store, delegated query agent, and the
/// normalizer's LLM handle.
pub struct Assistant {
    history_pool: SqlitePool,
    agent: Arc<dyn QueryAgent>,
    llm: Arc<dyn LlmClient>,
    context_turns: i64,
}

impl Assistant {
    pub fn new(
        history_pool: SqlitePool,
        agent: Arc<dyn QueryAgent>,
        llm: Arc<dyn LlmClient>,
        context_turns: i64,
    ) -> Self {
        Self {
            history_pool,
            agent,
            llm,
            context_turns,
        }
    }

    /// Wire up the real pipeline from configuration: history pool with
    /// schema, read-only catalog pool for the agent, and the configured
    /// LLM client for both agent and normalizer.
    pub async fn build(config: &Config) -> Result<Self> {
        let history_pool = db::connect(config).await?;
        migrate::ensure_schema(&history_pool).await?;

        let llm = llm::create_client(&config.llm)?;

        let catalog_pool = db::connect_read_only(config).await?;
        let agent = SqlAgent::new(llm.clone(), catalog_pool, &config.agent)
            .await
            .context("failed to initialize query agent")?;

        Ok(Self::new(
            history_pool,
            Arc::new(agent),
            llm,
            config.history.context_turns,
        ))
    }

    /// Run one query through the full pipeline.
    ///
    /// Failures in steps 2–5 abort the request and persist nothing. A
    /// failure in the final persist step is logged and swallowed: the
    /// answer has already been computed and is still returned, with
    /// `saved` false so the loss is observable.
    pub async fn ask(&self, user_query: &str) -> Result<AskAnswer> {
        let user_query = user_query.trim();
        if user_query.is_empty() {
            bail!(EMPTY_QUERY_MSG);
        }

        let recent = history::fetch_recent(&self.history_pool, self.context_turns).await?;
        let directive = assemble_directive(&recent, user_query);

        let raw_output = self.agent.invoke(&directive).await?;
        let response = normalize(self.llm.as_ref(), user_query, &raw_output).await?;

        let saved = match history::append_turn(&self.history_pool, user_query, &response).await {
            Ok(()) => true,
            Err(e) => {
                eprintln!("warning: failed to persist chat turn: {}", e);
                false
            }
        };

        Ok(AskAnswer { response, saved })
    }
}

/// Rewrite the agent's raw output into clean customer-facing prose.
///
/// A single LLM call with a fixed instruction; the output is returned
/// verbatim with no local markup cleanup.
pub async fn normalize(llm: &dyn LlmClient, user_query: &str, raw_output: &str) -> Result<String> {
    llm.generate(&build_normalizer_prompt(user_query, raw_output))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAgent(&'static str);

    #[async_trait]
    impl QueryAgent for FixedAgent {
        async fn invoke(&self, _directive: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl QueryAgent for FailingAgent {
        async fn invoke(&self, _directive: &str) -> Result<String> {
            bail!("agent exploded")
        }
    }

    /// Counts invocations so tests can assert the agent was never reached.
    struct CountingAgent(AtomicUsize);

    #[async_trait]
    impl QueryAgent for CountingAgent {
        async fn invoke(&self, _directive: &str) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("counted".to_string())
        }
    }

    /// Drops the chat history table when invoked, so the later persist
    /// step fails while everything before it succeeded.
    struct TableDroppingAgent(SqlitePool);

    #[async_trait]
    impl QueryAgent for TableDroppingAgent {
        async fn invoke(&self, _directive: &str) -> Result<String> {
            sqlx::query("DROP TABLE chat_history")
                .execute(&self.0)
                .await?;
            Ok("raw answer".to_string())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            // Echo back the raw output embedded in the normalizer prompt.
            let rest = prompt.split("Response: ").nth(1).unwrap_or(prompt);
            Ok(rest.split("\n\n").next().unwrap_or(rest).to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            bail!("normalizer exploded")
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    async fn history_pool() -> SqlitePool {
        // Single connection so the in-memory database is shared across
        // every statement in the test.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::ensure_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_agent() {
        let pool = history_pool().await;
        let agent = Arc::new(CountingAgent(AtomicUsize::new(0)));
        let assistant = Assistant::new(pool.clone(), agent.clone(), Arc::new(EchoLlm), 5);

        for query in ["", "   ", "\t\n"] {
            let err = assistant.ask(query).await.unwrap_err();
            assert_eq!(err.to_string(), EMPTY_QUERY_MSG);
        }

        assert_eq!(agent.0.load(Ordering::SeqCst), 0);
        assert!(history::fetch_recent(&pool, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_persists_turn() {
        let pool = history_pool().await;
        let assistant = Assistant::new(
            pool.clone(),
            Arc::new(FixedAgent("SoapX costs 4.5.")),
            Arc::new(EchoLlm),
            5,
        );

        let answer = assistant.ask("  price of SoapX?  ").await.unwrap();
        assert_eq!(answer.response, "SoapX costs 4.5.");
        assert!(answer.saved);

        let turns = history::fetch_recent(&pool, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        // Trimmed query is what persists
        assert_eq!(turns[0].user_message, "price of SoapX?");
        assert_eq!(turns[0].ai_response, "SoapX costs 4.5.");
    }

    #[tokio::test]
    async fn test_agent_failure_persists_nothing() {
        let pool = history_pool().await;
        let assistant =
            Assistant::new(pool.clone(), Arc::new(FailingAgent), Arc::new(EchoLlm), 5);

        let err = assistant.ask("price?").await.unwrap_err();
        assert!(err.to_string().contains("agent exploded"));
        assert!(history::fetch_recent(&pool, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_normalizer_failure_persists_nothing() {
        let pool = history_pool().await;
        let assistant = Assistant::new(
            pool.clone(),
            Arc::new(FixedAgent("raw")),
            Arc::new(FailingLlm),
            5,
        );

        let err = assistant.ask("price?").await.unwrap_err();
        assert!(err.to_string().contains("normalizer exploded"));
        assert!(history::fetch_recent(&pool, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_still_returns_answer() {
        let pool = history_pool().await;
        let assistant = Assistant::new(
            pool.clone(),
            Arc::new(TableDroppingAgent(pool.clone())),
            Arc::new(EchoLlm),
            5,
        );

        // Steps 2-5 succeed, step 6 fails: the answer comes back, the
        // turn is lost.
        let answer = assistant.ask("price?").await.unwrap();
        assert_eq!(answer.response, "raw answer");
        assert!(!answer.saved);
    }

    #[tokio::test]
    async fn test_history_flows_into_directive() {
        let pool = history_pool().await;
        history::append_turn(&pool, "hi", "hello").await.unwrap();

        use std::sync::Mutex;

        /// Captures the directive it was handed.
        struct CapturingAgent(Mutex<String>);

        #[async_trait]
        impl QueryAgent for CapturingAgent {
            async fn invoke(&self, directive: &str) -> Result<String> {
                *self.0.lock().unwrap() = directive.to_string();
                Ok("ok".to_string())
            }
        }

        let agent = Arc::new(CapturingAgent(Mutex::new(String::new())));
        let assistant = Assistant::new(pool, agent.clone(), Arc::new(EchoLlm), 5);
        assistant.ask("price?").await.unwrap();

        let directive = agent.0.lock().unwrap().clone();
        assert!(directive.contains("User: hi\nAssistant: hello\n"));
        assert!(directive.contains("Current User Query: price?\n"));
    }
}
