//! # Product Info Assistant CLI (`pia`)
//!
//! ## Usage
//!
//! ```bash
//! pia --config ./config/assistant.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pia init` | Create the SQLite database and the chat history table |
//! | `pia ask "<query>"` | Run one query through the pipeline and print the answer |
//! | `pia serve` | Start the HTTP server |
//!
//! The `GEMINI_API_KEY` environment variable must be set for `ask` and
//! `serve` unless `llm.provider = "disabled"`. `DATABASE_URL` overrides
//! the configured database path.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use product_assistant::{config, migrate, pipeline::Assistant, server};

/// Product Info Assistant — a conversational front-end over a product
/// catalog, backed by a Text-to-SQL + knowledge agent.
#[derive(Parser)]
#[command(
    name = "pia",
    about = "Product Info Assistant — conversational product catalog Q&A",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/assistant.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chat_history table.
    /// This command is idempotent — running it multiple times is safe.
    /// The product_details catalog table is externally owned and is
    /// never created here.
    Init,

    /// Run one query through the full pipeline and print the answer.
    ///
    /// Persists the exchange to chat history exactly like the HTTP path.
    Ask {
        /// The user query.
        query: String,
    },

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ask { query } => {
            let assistant = Arc::new(Assistant::build(&cfg).await?);
            let answer = assistant.ask(&query).await?;
            println!("{}", answer.response);
            if !answer.saved {
                eprintln!("(turn was not saved to chat history)");
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
