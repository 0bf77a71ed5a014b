//! Research task inputs
//!
//! A [`ResearchTask`] is everything one research loop needs: what to look
//! into, how much it may spend, and the context it runs in. Nothing here is
//! read from process-wide state once constructed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::BudgetConfig;
use crate::core::Config;

/// Ceilings bounding one research loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_turns: usize,
    pub max_tool_calls: usize,
    pub max_sources: usize,
    /// Consecutive turns without new information before stopping (0 = off)
    pub stale_turn_limit: usize,
}

impl Budget {
    pub fn new(max_turns: usize, max_tool_calls: usize) -> Self {
        Self {
            max_turns,
            max_tool_calls,
            ..Self::default()
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::from(&BudgetConfig::default())
    }
}

impl From<&BudgetConfig> for Budget {
    fn from(config: &BudgetConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            max_tool_calls: config.max_tool_calls,
            max_sources: config.max_sources,
            stale_turn_limit: config.stale_turn_limit,
        }
    }
}

/// Provider credentials, read-only after startup
#[derive(Clone, Default)]
pub struct Credentials {
    pub search_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "search_api_key",
                &if self.search_api_key.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}

/// Date and credentials a task executes under
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub current_date: String,
    pub credentials: Arc<Credentials>,
}

impl ExecutionContext {
    pub fn new(current_date: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        Self {
            current_date: current_date.into(),
            credentials,
        }
    }

    /// Context stamped with the local time right now
    pub fn now(credentials: Arc<Credentials>) -> Self {
        Self::new(
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            credentials,
        )
    }

    /// Credentials taken from configuration
    pub fn credentials_from(config: &Config) -> Arc<Credentials> {
        Arc::new(Credentials {
            search_api_key: config.search.api_key.clone(),
        })
    }
}

/// Immutable input to one research loop
#[derive(Debug, Clone)]
pub struct ResearchTask {
    pub description: String,
    pub budget: Budget,
    pub context: ExecutionContext,
}

impl ResearchTask {
    pub fn new(description: impl Into<String>, budget: Budget, context: ExecutionContext) -> Self {
        Self {
            description: description.into(),
            budget,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_defaults() {
        let budget = Budget::default();
        assert_eq!(budget.max_turns, 5);
        assert_eq!(budget.max_tool_calls, 15);
        assert_eq!(budget.max_sources, 100);

        let small = Budget::new(2, 5);
        assert_eq!(small.max_turns, 2);
        assert_eq!(small.max_sources, 100);
    }

    #[test]
    fn test_credentials_never_printed() {
        let creds = Credentials {
            search_api_key: "sk-very-secret".into(),
        };
        let printed = format!("{:?}", ExecutionContext::new("2025-01-01", Arc::new(creds)));
        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
