//! Agent module - research orchestration
//!
//! Contains the research loop state machine, the oracle it consults, and the
//! orchestrator that fans research tasks out to concurrent loops.

pub mod loop_state;
pub mod oracle;
pub mod orchestrator;
pub mod prompts;
pub mod research_loop;
pub mod task;

pub use loop_state::{LoopPhase, LoopState, StopReason, Turn};
pub use oracle::{Decision, LlmOracle, OracleContext, ReasoningOracle};
pub use orchestrator::{AggregateResult, Orchestrator, TaskReport};
pub use research_loop::{ResearchLoop, ResearchLoopBuilder, ResearchReport};
pub use task::{Budget, Credentials, ExecutionContext, ResearchTask};
