//! Reasoning oracle
//!
//! The loop engine never decides what to search for. It asks a
//! [`ReasoningOracle`] for the next step and executes whatever comes back.
//! [`LlmOracle`] answers through an [`LLMProvider`] with tool calling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::loop_state::{format_history, Turn};
use crate::agent::prompts;
use crate::agent::task::{ExecutionContext, ResearchTask};
use crate::core::{FathomError, Message, Result, ToolDefinition, ToolInvocation};
use crate::llm::{GenerateOptions, LLMProvider};

/// What the oracle wants to happen next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run these tools this turn
    Invoke(Vec<ToolInvocation>),
    /// The task is done; here is the answer
    Complete(String),
}

/// Fixed context for one oracle conversation
#[derive(Debug, Clone)]
pub struct OracleContext {
    /// System instructions
    pub instructions: String,
    /// The task or user request being worked on
    pub task: String,
    /// Tools the oracle may call
    pub tools: Vec<ToolDefinition>,
}

impl OracleContext {
    /// Context for a research loop
    pub fn researcher(task: &ResearchTask, tools: Vec<ToolDefinition>) -> Self {
        Self {
            instructions: prompts::researcher_instructions(
                &task.context.current_date,
                &task.budget,
            ),
            task: task.description.clone(),
            tools,
        }
    }

    /// Context for the lead
    pub fn lead(
        request: &str,
        context: &ExecutionContext,
        max_rounds: usize,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            instructions: prompts::lead_instructions(&context.current_date, max_rounds),
            task: request.to_string(),
            tools,
        }
    }
}

/// External collaborator that decides the next step of a research loop
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Choose tool calls for the next turn, or finish
    async fn decide(&self, context: &OracleContext, history: &[Turn]) -> Result<Decision>;

    /// Produce final text from the evidence in `history`
    async fn synthesize(&self, context: &OracleContext, history: &[Turn]) -> Result<String>;
}

/// Oracle backed by a chat model
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ReasoningOracle for LlmOracle {
    async fn decide(&self, context: &OracleContext, history: &[Turn]) -> Result<Decision> {
        let messages = vec![
            Message::system(&context.instructions),
            Message::user(format!("{}{}", context.task, format_history(history))),
        ];

        let response = self
            .provider
            .chat_with_tools(
                &self.model,
                &messages,
                &context.tools,
                Some(GenerateOptions {
                    temperature: Some(0.1), // Low temperature for tool selection
                    ..Default::default()
                }),
            )
            .await?;

        if response.tool_calls.is_empty() {
            let text = response.content.trim();
            if text.is_empty() {
                return Err(FathomError::oracle("Empty response with no tool calls"));
            }
            return Ok(Decision::Complete(text.to_string()));
        }

        let requested = response.tool_calls.len();
        let invocations: Vec<ToolInvocation> = response
            .tool_calls
            .iter()
            .filter_map(|call| match ToolInvocation::from_tool_call(call) {
                Ok(invocation) => Some(invocation),
                Err(e) => {
                    tracing::warn!(tool = %call.name, "discarding malformed tool call: {}", e);
                    None
                }
            })
            .collect();

        if invocations.is_empty() {
            return Err(FathomError::oracle(format!(
                "None of the {} requested tool calls could be decoded",
                requested
            )));
        }

        Ok(Decision::Invoke(invocations))
    }

    async fn synthesize(&self, context: &OracleContext, history: &[Turn]) -> Result<String> {
        let messages = vec![
            Message::system(&context.instructions),
            Message::user(prompts::synthesis_request(&context.task, history)),
        ];

        let response = self
            .provider
            .chat(
                &self.model,
                &messages,
                Some(GenerateOptions {
                    temperature: Some(0.7),
                    ..Default::default()
                }),
            )
            .await?;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(FathomError::oracle("Empty synthesis"));
        }
        Ok(text.to_string())
    }
}

/// Whether an oracle failure is worth another attempt
fn is_retryable(error: &FathomError) -> bool {
    error.is_transient() || matches!(error, FathomError::Oracle(_))
}

/// Run an oracle call, retrying transient failures up to `retries` times.
///
/// Non-retryable errors return immediately. Running out of retries yields
/// [`FathomError::OracleRetriesExhausted`].
pub async fn with_retries<T, F, Fut>(retries: u32, backoff: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = retries + 1;
    let mut last = String::new();

    for attempt in 1..=attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => {
                tracing::warn!(attempt, attempts, "oracle call failed: {}", e);
                last = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(FathomError::OracleRetriesExhausted { attempts, last })
}
