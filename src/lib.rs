//! Fathom - Bounded Multi-Turn Research Agent
//!
//! A lead agent splits a question into research tasks and runs each as a
//! bounded, tool-using loop against web search and fetch, in parallel.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: LLM provider abstraction with Ollama implementation
//! - **Tools**: Search and fetch adapters, text extraction, result envelopes
//! - **Agent**: Research loop state machine and orchestrator
//!
//! # Usage
//!
//! ```rust,no_run
//! use fathom::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> fathom::Result<()> {
//!     let orchestrator = Orchestrator::from_config(Config::load())?;
//!     let result = orchestrator
//!         .run("Cheapest flight from Lisbon to Berlin next week")
//!         .await?;
//!     println!("{}", result.answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{AggregateResult, Orchestrator, ResearchLoop, ResearchReport};
pub use core::{Config, FathomError, Result};
