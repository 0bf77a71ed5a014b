//! Configuration management for Fathom
//!
//! Supports environment variables, config files, and runtime overrides.
//! Retry backoffs, ceilings and budgets are policy, so they all live here
//! rather than as literals in the engine.
//!
//! Config file location: ~/.config/fathom/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{FathomError, Result};

/// Main configuration for Fathom
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration (oracle backend)
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// Search provider configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Fetch adapter configuration
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Retry policy for search calls and the oracle channel
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-loop research budget
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Orchestrator behaviour
    #[serde(default)]
    pub lead: LeadConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Models used by the lead and by research loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model that plans, dispatches and aggregates
    pub lead: String,
    /// Model that drives each research loop
    pub researcher: String,
}

/// Search provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Subscription token sent as `X-Subscription-Token`
    #[serde(default)]
    pub api_key: String,
    /// Web search endpoint
    pub base_url: String,
    /// Default number of results (provider accepts 1-20)
    pub count: u32,
    /// Default country code
    pub country: String,
    /// Default search language
    pub language: String,
}

/// Fetch adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Default hard timeout for a single fetch
    pub timeout_secs: u64,
    /// User-Agent sent unless the caller overrides it
    pub user_agent: String,
}

/// Retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Wait after a 429 from the search provider
    pub rate_limit_backoff_ms: u64,
    /// Wait after a 5xx from the search provider
    pub server_error_backoff_ms: u64,
    /// Wait after a transport error talking to the search provider
    pub transport_backoff_ms: u64,
    /// Attempts per search invocation before the failure is surfaced
    pub max_attempts: u32,
    /// Extra attempts for a failed oracle call before the loop gives up
    pub oracle_retries: u32,
}

/// Research loop budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_turns: usize,
    pub max_tool_calls: usize,
    pub max_sources: usize,
    /// Consecutive turns without new information before stopping (0 = off)
    pub stale_turn_limit: usize,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadConfig {
    /// Decision rounds the lead may spend dispatching research
    pub max_rounds: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 300,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lead: env::var("FATHOM_LEAD_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            researcher: env::var("FATHOM_RESEARCHER_MODEL")
                .unwrap_or_else(|_| "qwen3:4b".to_string()),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("BRAVE_API_KEY").unwrap_or_default(),
            base_url: env::var("FATHOM_SEARCH_URL")
                .unwrap_or_else(|_| "https://api.search.brave.com/res/v1/web/search".to_string()),
            count: 10,
            country: "us".to_string(),
            language: "en".to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("fathom/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff_ms: 2000,
            server_error_backoff_ms: 3000,
            transport_backoff_ms: 2000,
            max_attempts: 3,
            oracle_retries: 2,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_turns: 5,
            max_tool_calls: 15,
            max_sources: 100,
            stale_turn_limit: 2,
        }
    }
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self { max_rounds: 3 }
    }
}

impl RetryConfig {
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn server_error_backoff(&self) -> Duration {
        Duration::from_millis(self.server_error_backoff_ms)
    }

    pub fn transport_backoff(&self) -> Duration {
        Duration::from_millis(self.transport_backoff_ms)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fathom")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_or_default(&Self::config_file());

        // The key is a secret and usually lives only in the environment
        if config.search.api_key.is_empty() {
            if let Ok(key) = env::var("BRAVE_API_KEY") {
                config.search.api_key = key;
            }
        }

        config
    }

    /// Load `path`, falling back to defaults when it is missing or unusable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring config file: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a file only
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FathomError::config("Config file not found"));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| FathomError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| FathomError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject budgets and retry policies the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.budget.max_turns == 0 {
            return Err(FathomError::config("budget.max_turns must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(FathomError::config("retry.max_attempts must be at least 1"));
        }
        if self.lead.max_rounds == 0 {
            return Err(FathomError::config("lead.max_rounds must be at least 1"));
        }
        Ok(())
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Render as TOML for display, with the API key left out
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.search.api_key.clear();
        toml::to_string_pretty(&shown)
            .map_err(|e| FathomError::config(format!("Failed to serialize config: {}", e)))
    }
}
