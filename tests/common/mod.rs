//! Shared helpers for integration tests
//!
//! Provides a configuration pointed at a wiremock server, canned search
//! provider bodies, and a scripted reasoning oracle.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fathom::agent::task::{Budget, Credentials, ExecutionContext, ResearchTask};
use fathom::agent::{Decision, OracleContext, ReasoningOracle, Turn};
use fathom::tools::ToolRegistry;
use fathom::{Config, Result};
use serde_json::json;

pub const API_KEY: &str = "test-key";

/// Config with the search provider on `server_uri` and millisecond backoffs
pub fn test_config(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.search.base_url = format!("{}/search", server_uri);
    config.search.api_key = API_KEY.to_string();
    config.retry.rate_limit_backoff_ms = 10;
    config.retry.server_error_backoff_ms = 10;
    config.retry.transport_backoff_ms = 10;
    config
}

pub fn registry(config: &Config) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::from_config(config).expect("registry"))
}

pub fn task(description: &str, budget: Budget) -> ResearchTask {
    let credentials = Arc::new(Credentials {
        search_api_key: API_KEY.to_string(),
    });
    ResearchTask::new(
        description,
        budget,
        ExecutionContext::new("2025-05-01 10:00:00", credentials),
    )
}

/// Search provider response body with the given (title, url, description) hits
pub fn search_body(hits: &[(&str, &str, &str)]) -> serde_json::Value {
    let results: Vec<serde_json::Value> = hits
        .iter()
        .map(|(title, url, description)| {
            json!({
                "title": title,
                "url": url,
                "description": description
            })
        })
        .collect();

    json!({
        "type": "search",
        "web": {
            "type": "search",
            "results": results
        }
    })
}

type DecideFn = dyn Fn(&OracleContext, &[Turn]) -> Result<Decision> + Send + Sync;
type SynthesizeFn = dyn Fn(&OracleContext, &[Turn]) -> Result<String> + Send + Sync;

/// Oracle whose policy is a closure
pub struct ScriptedOracle {
    decide: Box<DecideFn>,
    synthesize: Box<SynthesizeFn>,
    decide_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new(
        decide: impl Fn(&OracleContext, &[Turn]) -> Result<Decision> + Send + Sync + 'static,
    ) -> Self {
        Self {
            decide: Box::new(decide),
            synthesize: Box::new(|_: &OracleContext, history: &[Turn]| {
                Ok(format!("Summary of {} turns", history.len()))
            }),
            decide_calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Replay decisions in order, then complete
    pub fn sequence(decisions: Vec<Result<Decision>>) -> Self {
        let queue = Mutex::new(VecDeque::from(decisions));
        Self::new(move |_, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Decision::Complete("done".to_string())))
        })
    }

    pub fn with_synthesis(
        mut self,
        synthesize: impl Fn(&OracleContext, &[Turn]) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.synthesize = Box::new(synthesize);
        self
    }

    /// Sleep before every decision, like a slow model
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn decide(&self, context: &OracleContext, history: &[Turn]) -> Result<Decision> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.decide)(context, history)
    }

    async fn synthesize(&self, context: &OracleContext, history: &[Turn]) -> Result<String> {
        (self.synthesize)(context, history)
    }
}
