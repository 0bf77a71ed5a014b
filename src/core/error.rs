//! Custom error types for Fathom
//!
//! Tool adapters never surface these: they always answer with a
//! [`ResultEnvelope`](crate::tools::ResultEnvelope). Errors here belong to the
//! oracle channel, configuration, and the orchestrator.

use thiserror::Error;

/// Main error type for Fathom operations
#[derive(Error, Debug)]
pub enum FathomError {
    /// Ollama connection or API errors
    #[error("Ollama error: {0}")]
    Ollama(String),

    /// The oracle backend is temporarily unreachable or overloaded
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The oracle answered with something that cannot be used
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// A research loop gave up after its oracle retries ran out
    #[error("Oracle failed after {attempts} attempts: {last}")]
    OracleRetriesExhausted { attempts: u32, last: String },

    /// Every research loop dispatched for a request failed
    #[error("All {failures} research task(s) failed; last error: {last}")]
    AllResearchFailed { failures: usize, last: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),
}

/// Convenience Result type for Fathom operations
pub type Result<T> = std::result::Result<T, FathomError>;

impl FathomError {
    /// Create an Ollama error
    pub fn ollama(msg: impl Into<String>) -> Self {
        Self::Ollama(msg.into())
    }

    /// Create an oracle error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }

    /// Create an oracle-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::OracleUnavailable(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the same oracle call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OracleUnavailable(_) => true,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}
