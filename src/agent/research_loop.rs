//! Research loop (subagent)
//!
//! Drives one bounded research task: ask the oracle, run the tools it asks
//! for, check the budget, repeat. Tool failures are evidence, not errors;
//! only an oracle that keeps failing ends a loop with `Err`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::agent::loop_state::{Admission, LoopPhase, LoopState, StopReason};
use crate::agent::oracle::{with_retries, Decision, OracleContext, ReasoningOracle};
use crate::agent::task::{ExecutionContext, ResearchTask};
use crate::core::{Config, FathomError, Result, ToolInvocation};
use crate::tools::{ResultEnvelope, ToolRegistry};

/// Final output of one research loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub text: String,
    pub stop_reason: StopReason,
    pub turns_used: usize,
    pub tool_calls_used: usize,
    pub sources_seen: usize,
}

/// Executes research tasks against an oracle and the web tools
#[derive(Clone)]
pub struct ResearchLoop {
    oracle: Arc<dyn ReasoningOracle>,
    tools: Arc<ToolRegistry>,
    /// Extra attempts for a failing oracle call
    oracle_retries: u32,
    retry_backoff: Duration,
}

/// Builder for creating a ResearchLoop
pub struct ResearchLoopBuilder {
    oracle: Option<Arc<dyn ReasoningOracle>>,
    tools: Option<Arc<ToolRegistry>>,
    oracle_retries: u32,
    retry_backoff: Duration,
}

impl ResearchLoopBuilder {
    pub fn new() -> Self {
        Self {
            oracle: None,
            tools: None,
            oracle_retries: 2,
            retry_backoff: Duration::from_secs(2),
        }
    }

    /// Set the oracle that drives the loop
    pub fn oracle(mut self, oracle: Arc<dyn ReasoningOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Set the tool registry
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set how many times a failed oracle call is retried
    pub fn oracle_retries(mut self, retries: u32) -> Self {
        self.oracle_retries = retries;
        self
    }

    /// Set the pause between oracle retries
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Take retry policy from configuration
    pub fn config(self, config: &Config) -> Self {
        self.oracle_retries(config.retry.oracle_retries)
            .retry_backoff(config.retry.transport_backoff())
    }

    /// Build the ResearchLoop
    pub fn build(self) -> Result<ResearchLoop> {
        let oracle = self
            .oracle
            .ok_or_else(|| FathomError::config("research loop needs an oracle"))?;
        let tools = self
            .tools
            .ok_or_else(|| FathomError::config("research loop needs a tool registry"))?;

        Ok(ResearchLoop {
            oracle,
            tools,
            oracle_retries: self.oracle_retries,
            retry_backoff: self.retry_backoff,
        })
    }
}

impl Default for ResearchLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResearchLoop {
    /// Create a builder
    pub fn builder() -> ResearchLoopBuilder {
        ResearchLoopBuilder::new()
    }

    /// Run one task to a stop condition and report.
    ///
    /// Fails only when the oracle exhausts its retries or fails fatally.
    pub async fn run(&self, task: ResearchTask) -> Result<ResearchReport> {
        let mut state = LoopState::new(task.budget);
        let oracle_context = OracleContext::researcher(&task, self.tools.web_tools());
        let oracle = self.oracle.as_ref();

        tracing::info!(
            max_turns = task.budget.max_turns,
            max_tool_calls = task.budget.max_tool_calls,
            "research loop started"
        );

        let mut answer = None;
        let stop_reason = loop {
            let history = state.turns();
            let decision = with_retries(self.oracle_retries, self.retry_backoff, || {
                oracle.decide(&oracle_context, history)
            })
            .await?;

            let invocations = match decision {
                Decision::Complete(text) => {
                    answer = Some(text);
                    break StopReason::Completed;
                }
                Decision::Invoke(invocations) => invocations,
            };

            if state.phase() == LoopPhase::Planning {
                state.transition(LoopPhase::Acting);
            }

            let outputs = self.act(&mut state, &invocations, &task.context).await;
            tracing::info!(
                turn = state.counters().turns_used() + 1,
                calls = invocations.len(),
                errors = outputs.iter().filter(|o| o.is_error()).count(),
                "turn complete"
            );
            state.record_turn(invocations, outputs);

            state.transition(LoopPhase::Evaluating);
            match state.stop_reason() {
                Some(reason) => break reason,
                None => state.transition(LoopPhase::Acting),
            }
        };

        state.transition(LoopPhase::Reporting);
        let text = match answer {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                let history = state.turns();
                with_retries(self.oracle_retries, self.retry_backoff, || {
                    oracle.synthesize(&oracle_context, history)
                })
                .await?
            }
        };
        state.transition(LoopPhase::Done);

        let counters = state.counters();
        let report = ResearchReport {
            text,
            stop_reason,
            turns_used: counters.turns_used(),
            tool_calls_used: counters.tool_calls_used(),
            sources_seen: counters.sources_seen(),
        };

        tracing::info!(
            stop_reason = %report.stop_reason,
            turns = report.turns_used,
            tool_calls = report.tool_calls_used,
            sources = report.sources_seen,
            "research loop finished"
        );

        Ok(report)
    }

    /// Execute one turn's invocations concurrently, keeping request order
    async fn act(
        &self,
        state: &mut LoopState,
        invocations: &[ToolInvocation],
        context: &ExecutionContext,
    ) -> Vec<ResultEnvelope> {
        let tools = self.tools.as_ref();
        let pending = state.admit(invocations).into_iter().map(|admission| async move {
            match admission {
                Admission::Run(invocation) => {
                    tracing::debug!(tool = invocation.tool_name(), "executing tool");
                    tools.execute(&invocation, context).await
                }
                Admission::Refused(envelope) => {
                    tracing::debug!(request = envelope.request(), "tool call refused");
                    envelope
                }
            }
        });

        join_all(pending).await
    }
}
