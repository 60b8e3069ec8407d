//! # MCP Langbase Evals Server
//!
//! A Model Context Protocol (MCP) server for evaluating LLM outputs over
//! time. Metrics are designed with an LLM, locked once confirmed, and then
//! used to score candidate outputs into numbered, comparable versions.
//!
//! ## Features
//!
//! - **Catalog**: projects, test cases and desired/current examples
//! - **Metric Design**: LLM-proposed metrics, iterated until confirmed
//! - **Evaluation**: LLM-judge and deterministic scoring with an aggregate
//! - **Versioning**: every commit becomes the next run version
//! - **Reports**: per-metric deltas with a narrative, plus project roll-ups
//! - **Dashboards**: score series and latest-run summaries
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → LlmProvider (stub | Langbase Pipes)
//!                    ↓
//!              SQLite (State)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_langbase_evals::{Config, AppState, McpServer};
//! use mcp_langbase_evals::provider::build_provider;
//! use mcp_langbase_evals::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let provider = build_provider(&config)?;
//!     let state = Arc::new(AppState::new(config, storage, provider));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Offline inspection commands.
pub mod cli;
/// Configuration management for the MCP server.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// System prompts and pipe templates for Langbase.
pub mod prompts;
/// LLM capability trait and its implementations.
pub mod provider;
/// Metric specifications and LLM response shapes.
pub mod schema;
/// MCP server implementation and request handling.
pub mod server;
/// Evaluation services: catalog, design, scoring, reports, dashboards.
pub mod services;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
