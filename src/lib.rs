//! # Product Info Assistant
//!
//! A conversational HTTP front-end over a personal-care product catalog.
//! A natural-language query, together with the last few chat turns, is
//! folded into a directive string and handed to a delegated query agent.
//! The agent may plan and run read-only SQL against the `product_details`
//! table or answer from the model's general knowledge; a second LLM call
//! then normalizes the raw output into clean customer-facing prose, and
//! the exchange is persisted as chat history for future context.
//!
//! ## Architecture
//!
//! ```text
//! POST /ask ──▶ fetch history ──▶ assemble directive
//!                                       │
//!                                       ▼
//!                              delegated query agent
//!                              (plan → guard → execute
//!                               → compose, or general
//!                               knowledge fallback)
//!                                       │
//!                                       ▼
//!                                  normalizer ──▶ persist ──▶ respond
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connections (history read-write, catalog read-only) |
//! | [`migrate`] | Idempotent chat history schema |
//! | [`history`] | Chat history store |
//! | [`prompt`] | Prompt constants and directive assembly |
//! | [`llm`] | LLM client abstraction |
//! | [`agent`] | Delegated query agent |
//! | [`pipeline`] | Request orchestration |
//! | [`server`] | HTTP surface |

pub mod agent;
pub mod config;
pub mod db;
pub mod history;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod prompt;
pub mod server;
