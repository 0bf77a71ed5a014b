//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat API with tool calling. Connection
//! failures, timeouts and overload responses map to
//! [`FathomError::OracleUnavailable`] so callers can retry them.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::{Config, FathomError, Message, Result, ToolCall, ToolDefinition};
use crate::llm::traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

/// Longest request/response body echoed into debug logs
const LOG_PREVIEW_CHARS: usize = 500;

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Ollama tool call format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

/// Ollama function in tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    arguments: serde_json::Value,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(
            config.ollama_url(),
            Duration::from_secs(config.ollama.timeout_secs),
        )
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), Duration::from_secs(300))
    }

    fn build(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FathomError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Convert internal Message to Ollama format
    fn to_ollama_message(msg: &Message) -> OllamaMessage {
        OllamaMessage {
            role: msg.role.clone(),
            content: msg.content.clone(),
            tool_calls: None,
        }
    }

    /// Convert Ollama response to LLMResponse
    fn to_llm_response(response: ChatResponse) -> LLMResponse {
        let tool_calls = response
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        };

        LLMResponse {
            content: response.message.content,
            tool_calls,
            usage,
            model: response.model,
        }
    }

    /// Map a transport error, keeping retryable failures distinguishable
    fn transport_error(&self, e: reqwest::Error) -> FathomError {
        if e.is_connect() {
            FathomError::unavailable(format!(
                "Cannot connect to Ollama at {}. Is it running?",
                self.base_url
            ))
        } else if e.is_timeout() {
            FathomError::unavailable(format!("Ollama request timed out: {}", e))
        } else {
            FathomError::from(e)
        }
    }

    async fn send_chat(&self, request: &ChatRequest<'_>) -> Result<LLMResponse> {
        let request_json = serde_json::to_string(request)?;
        tracing::trace!(
            model = request.model,
            "ollama request: {}",
            preview(&request_json)
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 404 && error_text.contains("not found") {
                return Err(FathomError::ModelNotFound(request.model.to_string()));
            }

            let message = format!("Ollama API error ({}): {}", status, error_text);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                FathomError::unavailable(message)
            } else {
                FathomError::ollama(message)
            });
        }

        let response_text = response.text().await.map_err(|e| self.transport_error(e))?;
        tracing::trace!("ollama response: {}", preview(&response_text));

        let chat_response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| FathomError::ollama(format!("Failed to parse response: {}", e)))?;

        let llm_response = Self::to_llm_response(chat_response);
        if let Some(ref usage) = llm_response.usage {
            tracing::debug!(
                model = %llm_response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "ollama chat complete"
            );
        }
        Ok(llm_response)
    }

    fn options(options: Option<GenerateOptions>) -> Option<OllamaOptions> {
        options.map(|opts| OllamaOptions {
            temperature: opts.temperature,
            num_predict: opts.max_tokens,
            stop: opts.stop,
        })
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            tools: None,
            options: Self::options(options),
            stream: false,
        };
        self.send_chat(&request).await
    }

    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            tools: Some(tools),
            options: Self::options(options),
            stream: false,
        };
        self.send_chat(&request).await
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| same_model(m, model)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(FathomError::ollama("Failed to list models"));
        }

        let models_response: ModelsResponse = response.json().await?;
        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Compare model names by full tag; an untagged name means `:latest`
fn same_model(available: &str, wanted: &str) -> bool {
    fn with_tag(name: &str) -> (&str, &str) {
        name.split_once(':').unwrap_or((name, "latest"))
    }
    with_tag(available) == with_tag(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::from_config(&Config::default()).unwrap();
        assert!(client.base_url.starts_with("http://"));
    }

    #[test]
    fn test_message_conversion() {
        let msg = Message::user("Hello");
        let ollama_msg = OllamaClient::to_ollama_message(&msg);
        assert_eq!(ollama_msg.role, "user");
        assert_eq!(ollama_msg.content, "Hello");
    }

    #[test]
    fn test_tool_calls_decoded() {
        let raw = r#"{
            "model": "qwen3:4b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "web_search", "arguments": {"query": "rust"}}}]
            },
            "prompt_eval_count": 10,
            "eval_count": 5
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let response = OllamaClient::to_llm_response(parsed);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "web_search");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_same_model_compares_tags() {
        assert!(same_model("qwen3:8b", "qwen3:8b"));
        assert!(same_model("llama3:latest", "llama3"));
        assert!(same_model("llama3", "llama3:latest"));
        assert!(!same_model("qwen3:4b", "qwen3:8b"));
        assert!(!same_model("qwen3:4b", "qwen3"));
    }

    #[tokio::test]
    async fn test_is_model_available_needs_the_exact_tag() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "qwen3:4b"}, {"name": "llama3:latest"}]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(server.uri()).unwrap();
        assert!(client.is_model_available("qwen3:4b").await.unwrap());
        assert!(client.is_model_available("llama3").await.unwrap());
        assert!(!client.is_model_available("qwen3:8b").await.unwrap());
    }

    #[test]
    fn test_preview_is_char_safe() {
        let text = "é".repeat(LOG_PREVIEW_CHARS + 10);
        assert_eq!(preview(&text).chars().count(), LOG_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
