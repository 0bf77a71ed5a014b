//! Page fetch adapter
//!
//! A single GET under a hard timeout. There is no retry here: whatever goes
//! wrong becomes an error envelope for the oracle to reason about.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::core::config::FetchConfig;
use crate::core::{FathomError, FetchRequest, Result};
use crate::tools::envelope::{FetchedPage, ResultEnvelope, ToolError};
use crate::tools::extract::extract_text;

/// Fetches pages and reduces them to readable text
#[derive(Clone)]
pub struct FetchAdapter {
    client: Client,
    config: FetchConfig,
}

impl FetchAdapter {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FathomError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Fetch a url and return its extracted text
    pub async fn fetch(&self, request: &FetchRequest) -> ResultEnvelope {
        tracing::info!(url = %request.url, "fetching url");

        match self.try_fetch(request).await {
            Ok(page) => ResultEnvelope::fetch_ok(&request.url, page),
            Err(message) => {
                tracing::debug!(url = %request.url, "fetch failed: {}", message);
                ResultEnvelope::fetch_err(&request.url, ToolError::terminal(message))
            }
        }
    }

    async fn try_fetch(&self, request: &FetchRequest) -> std::result::Result<FetchedPage, String> {
        let url = Url::parse(request.url.trim()).map_err(|e| format!("Invalid url: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported url scheme: {}", url.scheme()));
        }

        let timeout_secs = request.timeout_secs.unwrap_or(self.config.timeout_secs);
        let mut builder = self
            .client
            .get(url)
            .timeout(Duration::from_secs(timeout_secs));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                format!("Request timed out after {}s", timeout_secs)
            } else {
                format!("Request failed: {}", e)
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_textual(content_type) {
                return Err(format!("Unsupported content type: {}", content_type));
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                format!("Request timed out after {}s", timeout_secs)
            } else {
                format!("Failed to read response body: {}", e)
            }
        })?;

        Ok(FetchedPage {
            final_url,
            status,
            content: extract_text(&body),
        })
    }
}

/// Whether a content type carries text worth extracting
fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime.is_empty()
        || mime.starts_with("text/")
        || mime.ends_with("+xml")
        || mime.ends_with("/xml")
        || mime.ends_with("/json")
        || mime.ends_with("+json")
        || mime == "application/xhtml+xml"
        || mime == "application/javascript"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textual_content_types() {
        assert!(is_textual("text/html; charset=utf-8"));
        assert!(is_textual("application/xhtml+xml"));
        assert!(is_textual("application/json"));
        assert!(!is_textual("image/png"));
        assert!(!is_textual("application/pdf"));
        assert!(!is_textual("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_invalid_url_yields_error_envelope() {
        let adapter = FetchAdapter::new(FetchConfig::default()).unwrap();
        let envelope = adapter.fetch(&FetchRequest::new("not a url")).await;
        assert_eq!(envelope.request(), "not a url");
        assert!(envelope.error().unwrap().message.contains("Invalid url"));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let adapter = FetchAdapter::new(FetchConfig::default()).unwrap();
        let envelope = adapter.fetch(&FetchRequest::new("file:///etc/passwd")).await;
        assert!(envelope
            .error()
            .unwrap()
            .message
            .contains("Unsupported url scheme"));
    }
}
