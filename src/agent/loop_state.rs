//! Research loop state management
//!
//! Tracks the phase of the research state machine, the append-only turn
//! history, and the budget counters that bound it.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::task::Budget;
use crate::core::ToolInvocation;
use crate::tools::{ResultEnvelope, ToolError};

/// Phase of the research state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    Planning,
    Acting,
    Evaluating,
    Reporting,
    Done,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopPhase::Planning => "planning",
            LoopPhase::Acting => "acting",
            LoopPhase::Evaluating => "evaluating",
            LoopPhase::Reporting => "reporting",
            LoopPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a research loop stopped gathering evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TurnLimit,
    ToolCallLimit,
    SourceLimit,
    /// The oracle said it was done
    Completed,
    /// Consecutive turns produced nothing new
    DiminishingReturns,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TurnLimit => "turn limit reached",
            StopReason::ToolCallLimit => "tool call limit reached",
            StopReason::SourceLimit => "source limit reached",
            StopReason::Completed => "oracle completed the task",
            StopReason::DiminishingReturns => "no new information",
        };
        f.write_str(text)
    }
}

/// One iteration of a research loop; immutable once recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    index: usize,
    invocations: Vec<ToolInvocation>,
    outputs: Vec<ResultEnvelope>,
}

impl Turn {
    pub fn new(
        index: usize,
        invocations: Vec<ToolInvocation>,
        outputs: Vec<ResultEnvelope>,
    ) -> Self {
        Self {
            index,
            invocations,
            outputs,
        }
    }

    /// Ordinal, starting at 1
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    pub fn outputs(&self) -> &[ResultEnvelope] {
        &self.outputs
    }

    /// Render the turn's evidence for the next prompt
    pub fn render(&self) -> String {
        let mut output = format!("\n### Turn {}\n", self.index);
        if self.outputs.is_empty() {
            output.push_str("(no tool calls)\n");
        }
        for envelope in &self.outputs {
            output.push_str(&envelope.render());
            output.push('\n');
        }
        output
    }
}

/// Format a whole history for inclusion in a prompt
pub fn format_history(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return String::new();
    }

    let mut output = String::from("\n\n## Evidence gathered so far:\n");
    for turn in turns {
        output.push_str(&turn.render());
    }
    output
}

/// Whether an invocation may run under the remaining budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Run(ToolInvocation),
    Refused(ResultEnvelope),
}

/// Monotonic budget counters for one loop
#[derive(Debug, Clone, Default)]
pub struct BudgetCounters {
    turns_used: usize,
    tool_calls_used: usize,
    sources: HashSet<String>,
}

impl BudgetCounters {
    pub fn turns_used(&self) -> usize {
        self.turns_used
    }

    pub fn tool_calls_used(&self) -> usize {
        self.tool_calls_used
    }

    pub fn sources_seen(&self) -> usize {
        self.sources.len()
    }
}

/// State of one research loop
#[derive(Debug, Clone)]
pub struct LoopState {
    phase: LoopPhase,
    budget: Budget,
    counters: BudgetCounters,
    turns: Vec<Turn>,
    seen_evidence: HashSet<u64>,
    stale_turns: usize,
}

impl LoopState {
    pub fn new(budget: Budget) -> Self {
        Self {
            phase: LoopPhase::Planning,
            budget,
            counters: BudgetCounters::default(),
            turns: Vec::new(),
            seen_evidence: HashSet::new(),
            stale_turns: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn transition(&mut self, next: LoopPhase) {
        tracing::debug!(from = %self.phase, to = %next, "research loop transition");
        self.phase = next;
    }

    pub fn counters(&self) -> &BudgetCounters {
        &self.counters
    }

    /// Turn history, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Decide which of the requested invocations fit the budget.
    ///
    /// Admitted invocations are charged immediately; the rest get an error
    /// envelope explaining the refusal. Order is preserved.
    pub fn admit(&mut self, invocations: &[ToolInvocation]) -> Vec<Admission> {
        invocations
            .iter()
            .map(|invocation| match self.refusal_reason(invocation) {
                Some(reason) => Admission::Refused(ResultEnvelope::failed(
                    invocation,
                    ToolError::terminal(reason),
                )),
                None => {
                    self.counters.tool_calls_used += 1;
                    self.counters.sources.insert(invocation.source_key());
                    Admission::Run(invocation.clone())
                }
            })
            .collect()
    }

    fn refusal_reason(&self, invocation: &ToolInvocation) -> Option<String> {
        if self.counters.tool_calls_used >= self.budget.max_tool_calls {
            return Some(format!(
                "Tool call refused: budget of {} tool calls exhausted",
                self.budget.max_tool_calls
            ));
        }
        let is_new_source = !self.counters.sources.contains(&invocation.source_key());
        if is_new_source && self.counters.sources.len() >= self.budget.max_sources {
            return Some(format!(
                "Tool call refused: budget of {} distinct sources exhausted",
                self.budget.max_sources
            ));
        }
        None
    }

    /// Append a finished turn and update the turn counter
    pub fn record_turn(&mut self, invocations: Vec<ToolInvocation>, outputs: Vec<ResultEnvelope>) {
        let mut learned_something = false;
        for envelope in &outputs {
            learned_something |= self.seen_evidence.insert(envelope.fingerprint());
        }
        self.stale_turns = if learned_something {
            0
        } else {
            self.stale_turns + 1
        };

        self.counters.turns_used += 1;
        let index = self.counters.turns_used;
        self.turns.push(Turn::new(index, invocations, outputs));
    }

    /// First stop condition that holds after the latest turn, if any
    pub fn stop_reason(&self) -> Option<StopReason> {
        let budget = &self.budget;
        if self.counters.turns_used >= budget.max_turns {
            Some(StopReason::TurnLimit)
        } else if self.counters.tool_calls_used >= budget.max_tool_calls {
            Some(StopReason::ToolCallLimit)
        } else if self.counters.sources.len() >= budget.max_sources {
            Some(StopReason::SourceLimit)
        } else if budget.stale_turn_limit > 0 && self.stale_turns >= budget.stale_turn_limit {
            Some(StopReason::DiminishingReturns)
        } else {
            None
        }
    }
}
