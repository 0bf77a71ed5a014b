//! Research orchestrator (lead)
//!
//! Turns a user request into research tasks, runs them as concurrent
//! research loops, and hands their reports back to the lead oracle for the
//! final answer. A failed loop degrades into an error report; the run only
//! fails when no loop succeeds.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::agent::loop_state::Turn;
use crate::agent::oracle::{with_retries, Decision, LlmOracle, OracleContext, ReasoningOracle};
use crate::agent::research_loop::{ResearchLoop, ResearchReport};
use crate::agent::task::{Budget, Credentials, ExecutionContext, ResearchTask};
use crate::core::{Config, FathomError, Result, ToolInvocation, RUN_RESEARCH_TASK};
use crate::llm::OllamaClient;
use crate::tools::{ResultEnvelope, ToolError, ToolRegistry};

/// Outcome of one dispatched research task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: String,
    pub outcome: std::result::Result<ResearchReport, String>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Report text, or the failure in its place
    pub fn text(&self) -> String {
        match &self.outcome {
            Ok(report) => report.text.clone(),
            Err(e) => format!("Research task failed: {}", e),
        }
    }

    fn envelope(&self) -> ResultEnvelope {
        match &self.outcome {
            Ok(report) => ResultEnvelope::research_ok(&self.task, &report.text),
            Err(_) => ResultEnvelope::research_err(&self.task, ToolError::terminal(self.text())),
        }
    }
}

/// Everything produced for one user request
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub answer: String,
    /// Every dispatched task, in dispatch order
    pub reports: Vec<TaskReport>,
}

impl AggregateResult {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }
}

/// Lead agent that delegates to research loops
pub struct Orchestrator {
    config: Config,
    lead: Arc<dyn ReasoningOracle>,
    research: Arc<ResearchLoop>,
    tools: Arc<ToolRegistry>,
    credentials: Arc<Credentials>,
}

impl Orchestrator {
    /// Create an orchestrator backed by Ollama models from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let client = Arc::new(OllamaClient::from_config(&config)?);
        let lead = Arc::new(LlmOracle::new(client.clone(), &config.models.lead));
        let researcher = Arc::new(LlmOracle::new(client, &config.models.researcher));
        Self::new(config, lead, researcher)
    }

    /// Create an orchestrator around custom oracles
    pub fn new(
        config: Config,
        lead: Arc<dyn ReasoningOracle>,
        researcher: Arc<dyn ReasoningOracle>,
    ) -> Result<Self> {
        let tools = Arc::new(ToolRegistry::from_config(&config)?);
        Self::with_tools(config, lead, researcher, tools)
    }

    /// Create an orchestrator sharing an existing tool registry
    pub fn with_tools(
        config: Config,
        lead: Arc<dyn ReasoningOracle>,
        researcher: Arc<dyn ReasoningOracle>,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let research = ResearchLoop::builder()
            .oracle(researcher)
            .tools(tools.clone())
            .config(&config)
            .build()?;
        let credentials = ExecutionContext::credentials_from(&config);

        Ok(Self {
            config,
            lead,
            research: Arc::new(research),
            tools,
            credentials,
        })
    }

    /// Get current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer a user request.
    ///
    /// Fails with [`FathomError::AllResearchFailed`] when every dispatched
    /// loop failed, and with [`FathomError::OracleRetriesExhausted`] when the
    /// lead oracle cannot be reached.
    pub async fn run(&self, request: &str) -> Result<AggregateResult> {
        let context = ExecutionContext::now(self.credentials.clone());
        let max_rounds = self.config.lead.max_rounds;
        let lead_context =
            OracleContext::lead(request, &context, max_rounds, self.tools.research_tools());
        let lead = self.lead.as_ref();
        let retries = self.config.retry.oracle_retries;
        let backoff = self.config.retry.transport_backoff();

        let mut history: Vec<Turn> = Vec::new();
        let mut reports: Vec<TaskReport> = Vec::new();

        tracing::info!(max_rounds, "orchestrator started");

        for round in 1..=max_rounds {
            let decision = {
                let history = history.as_slice();
                with_retries(retries, backoff, || lead.decide(&lead_context, history)).await?
            };

            let invocations = match decision {
                Decision::Complete(answer) if !reports.is_empty() => {
                    return self.finish(answer, &lead_context, &history, reports).await;
                }
                Decision::Complete(_) => Vec::new(),
                Decision::Invoke(invocations) => invocations,
            };

            let mut tasks: Vec<String> = Vec::new();
            let mut rejected: Vec<ResultEnvelope> = Vec::new();
            for invocation in &invocations {
                match invocation {
                    ToolInvocation::Research { task } => tasks.push(task.clone()),
                    other => rejected.push(ResultEnvelope::failed(
                        other,
                        ToolError::terminal(format!(
                            "{} is not available to the lead; use {}",
                            other.tool_name(),
                            RUN_RESEARCH_TASK
                        )),
                    )),
                }
            }

            let mut dispatched: Vec<ToolInvocation> = invocations
                .into_iter()
                .filter(|i| matches!(i, ToolInvocation::Research { .. }))
                .collect();
            if tasks.is_empty() && reports.is_empty() {
                tracing::info!("lead requested no research; dispatching the request itself");
                tasks.push(request.to_string());
                dispatched.push(ToolInvocation::research(request));
            }

            let round_reports = self.dispatch(round, &tasks, &context).await;
            let mut outputs: Vec<ResultEnvelope> =
                round_reports.iter().map(TaskReport::envelope).collect();
            outputs.extend(rejected);
            reports.extend(round_reports);

            if !reports.is_empty() && reports.iter().all(|r| !r.succeeded()) {
                let last = reports.last().map(TaskReport::text).unwrap_or_default();
                tracing::error!(failures = reports.len(), "all research tasks failed");
                return Err(FathomError::AllResearchFailed {
                    failures: reports.len(),
                    last,
                });
            }

            history.push(Turn::new(round, dispatched, outputs));
        }

        tracing::info!("delegation rounds exhausted; synthesizing");
        let answer = {
            let history = history.as_slice();
            with_retries(retries, backoff, || lead.synthesize(&lead_context, history)).await?
        };
        Ok(AggregateResult { answer, reports })
    }

    async fn finish(
        &self,
        answer: String,
        lead_context: &OracleContext,
        history: &[Turn],
        reports: Vec<TaskReport>,
    ) -> Result<AggregateResult> {
        tracing::info!(
            tasks = reports.len(),
            failed = reports.iter().filter(|r| !r.succeeded()).count(),
            "orchestrator complete"
        );
        let answer = if answer.trim().is_empty() {
            let lead = self.lead.as_ref();
            with_retries(
                self.config.retry.oracle_retries,
                self.config.retry.transport_backoff(),
                || lead.synthesize(lead_context, history),
            )
            .await?
        } else {
            answer
        };
        Ok(AggregateResult { answer, reports })
    }

    /// Run research loops concurrently and wait for all of them
    async fn dispatch(
        &self,
        round: usize,
        tasks: &[String],
        context: &ExecutionContext,
    ) -> Vec<TaskReport> {
        let budget = Budget::from(&self.config.budget);
        let mut set: JoinSet<(usize, std::result::Result<ResearchReport, String>)> =
            JoinSet::new();

        for (index, description) in tasks.iter().enumerate() {
            let research = self.research.clone();
            let task = ResearchTask::new(description.clone(), budget, context.clone());
            let span = tracing::info_span!("research", round, task = index + 1);

            set.spawn(
                async move {
                    let outcome = research.run(task).await.map_err(|e| e.to_string());
                    if let Err(ref e) = outcome {
                        tracing::warn!("research task failed: {}", e);
                    }
                    (index, outcome)
                }
                .instrument(span),
            );
        }

        let mut outcomes: Vec<Option<std::result::Result<ResearchReport, String>>> =
            vec![None; tasks.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::error!("research task panicked: {}", e),
            }
        }

        tasks
            .iter()
            .zip(outcomes)
            .map(|(task, outcome)| TaskReport {
                task: task.clone(),
                outcome: outcome.unwrap_or_else(|| Err("research task panicked".to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(text: &str) -> ResearchReport {
        ResearchReport {
            text: text.to_string(),
            stop_reason: crate::agent::loop_state::StopReason::Completed,
            turns_used: 1,
            tool_calls_used: 1,
            sources_seen: 1,
        }
    }

    #[test]
    fn test_degraded_report() {
        let failed = TaskReport {
            task: "prices".into(),
            outcome: Err("Oracle failed after 3 attempts: down".into()),
        };
        assert!(!failed.succeeded());
        assert!(failed.text().starts_with("Research task failed:"));

        let envelope = failed.envelope();
        assert_eq!(envelope.request(), "prices");
        assert!(envelope.is_error());
    }

    #[test]
    fn test_aggregate_counts() {
        let result = AggregateResult {
            answer: "done".into(),
            reports: vec![
                TaskReport {
                    task: "a".into(),
                    outcome: Ok(report("found a")),
                },
                TaskReport {
                    task: "b".into(),
                    outcome: Err("broken".into()),
                },
            ],
        };
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 1);
        assert!(!result.reports[0].envelope().is_error());
    }
}
