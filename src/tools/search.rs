//! Web search adapter
//!
//! Wraps a Brave-compatible web search endpoint with the retry policy from
//! [`RetryConfig`]. Rate limiting, server errors and transport failures are
//! retried after a fixed backoff; anything else ends the call with an error
//! envelope straight away.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::core::config::{RetryConfig, SearchConfig};
use crate::core::{FathomError, Result, SearchRequest};
use crate::tools::envelope::{ResultEnvelope, SearchHit, ToolError};

const MIN_COUNT: u32 = 1;
const MAX_COUNT: u32 = 20;

/// A failed attempt that is worth repeating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientFailure {
    RateLimited,
    ServerError(u16),
    Transport(String),
}

impl TransientFailure {
    /// How long to wait before the next attempt
    pub fn backoff(&self, policy: &RetryConfig) -> Duration {
        match self {
            Self::RateLimited => policy.rate_limit_backoff(),
            Self::ServerError(_) => policy.server_error_backoff(),
            Self::Transport(_) => policy.transport_backoff(),
        }
    }
}

impl fmt::Display for TransientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited (429)"),
            Self::ServerError(status) => write!(f, "server error ({})", status),
            Self::Transport(msg) => write!(f, "network error: {}", msg),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Search provider client with retry handling
///
/// Credentials are supplied per call from the task's execution context.
#[derive(Clone)]
pub struct SearchAdapter {
    client: Client,
    config: SearchConfig,
    retry: RetryConfig,
}

impl SearchAdapter {
    pub fn new(config: SearchConfig, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| FathomError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Run a search, retrying transient failures up to `max_attempts` times.
    ///
    /// Always returns an envelope. When every attempt failed transiently the
    /// error is flagged retryable so the oracle can rephrase or move on.
    pub async fn search(&self, request: &SearchRequest, api_key: &str) -> ResultEnvelope {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            match self.attempt(request, api_key).await {
                Ok(envelope) => return envelope,
                Err(failure) => {
                    tracing::warn!(
                        query = %request.query,
                        attempt,
                        max_attempts,
                        "search attempt failed: {}",
                        failure
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(failure.backoff(&self.retry)).await;
                    }
                    last_failure = Some(failure);
                }
            }
        }

        let reason = last_failure
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        ResultEnvelope::search_err(
            &request.query,
            ToolError::transient(format!(
                "Transient retry exhausted after {} attempts: {}",
                max_attempts, reason
            )),
        )
    }

    /// One call to the provider.
    ///
    /// `Err` means the attempt may succeed if repeated; every other outcome,
    /// including non-retryable failures, is already an envelope.
    pub async fn attempt(
        &self,
        request: &SearchRequest,
        api_key: &str,
    ) -> std::result::Result<ResultEnvelope, TransientFailure> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(ResultEnvelope::search_err(
                &request.query,
                ToolError::terminal("Search query must not be empty"),
            ));
        }

        tracing::info!(query, "running web search");

        let count = request
            .count
            .unwrap_or(self.config.count)
            .clamp(MIN_COUNT, MAX_COUNT);
        let country = request.country.as_deref().unwrap_or(&self.config.country);
        let language = request.language.as_deref().unwrap_or(&self.config.language);
        let count = count.to_string();

        let response = self
            .client
            .get(&self.config.base_url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("country", country),
                ("search_lang", language),
                ("result_filter", "web"),
            ])
            .send()
            .await
            .map_err(|e| TransientFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransientFailure::RateLimited);
        }
        if status.is_server_error() {
            return Err(TransientFailure::ServerError(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransientFailure::Transport(e.to_string()))?;

        if status.is_client_error() {
            return Ok(ResultEnvelope::search_err(
                &request.query,
                ToolError::terminal(format!("Search provider returned {}: {}", status, body)),
            ));
        }

        Ok(match serde_json::from_str::<SearchResponse>(&body) {
            Ok(parsed) => {
                let hits = parsed
                    .web
                    .map(|web| web.results)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|r| SearchHit {
                        title: r.title,
                        url: r.url,
                        description: r.description,
                    })
                    .collect();
                ResultEnvelope::search_ok(&request.query, hits)
            }
            Err(e) => ResultEnvelope::search_err(
                &request.query,
                ToolError::terminal(format!("Failed to parse search response: {}", e)),
            ),
        })
    }
}
