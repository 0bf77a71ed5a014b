//! Shared types used across Fathom modules
//!
//! Contains message structures, tool definitions, and tool invocations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{FathomError, Result};

/// Tool names advertised to the oracle
pub const WEB_SEARCH: &str = "web_search";
pub const WEB_FETCH: &str = "web_fetch";
pub const RUN_RESEARCH_TASK: &str = "run_research_task";

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// A tool call made by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Get an unsigned integer argument by key
    ///
    /// Models sometimes send numbers as strings, so both forms are accepted.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let value = self.arguments.get(key)?;
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    }

    /// Get a flat string map argument by key
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Definition of a tool that can be called by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Category of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Web search through the search provider
    Search,
    /// Direct page retrieval
    Fetch,
    /// Delegation to a research loop (lead only)
    Research,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::Search => write!(f, "search"),
            ToolCategory::Fetch => write!(f, "fetch"),
            ToolCategory::Research => write!(f, "research"),
        }
    }
}

/// Parameters of a web search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Results requested; provider default when absent
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            count: None,
            country: None,
            language: None,
        }
    }
}

/// Parameters of a page fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Per-call timeout override
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: None,
            headers: BTreeMap::new(),
        }
    }
}

/// A requested call to one of the tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInvocation {
    Search(SearchRequest),
    Fetch(FetchRequest),
    Research { task: String },
}

impl ToolInvocation {
    pub fn search(query: impl Into<String>) -> Self {
        Self::Search(SearchRequest::new(query))
    }

    pub fn fetch(url: impl Into<String>) -> Self {
        Self::Fetch(FetchRequest::new(url))
    }

    pub fn research(task: impl Into<String>) -> Self {
        Self::Research { task: task.into() }
    }

    /// Name of the tool this invocation targets
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Search(_) => WEB_SEARCH,
            Self::Fetch(_) => WEB_FETCH,
            Self::Research { .. } => RUN_RESEARCH_TASK,
        }
    }

    /// Key used to count distinct sources: the query for searches, the url for fetches
    pub fn source_key(&self) -> String {
        match self {
            Self::Search(req) => format!("query:{}", req.query.trim().to_lowercase()),
            Self::Fetch(req) => format!("url:{}", req.url.trim()),
            Self::Research { task } => format!("task:{}", task.trim()),
        }
    }

    /// Decode an LLM tool call into an invocation
    pub fn from_tool_call(call: &ToolCall) -> Result<Self> {
        let required = |key: &str| {
            call.get_string(key)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    FathomError::oracle(format!("{} requires a non-empty '{}'", call.name, key))
                })
        };

        match call.name.as_str() {
            WEB_SEARCH => Ok(Self::Search(SearchRequest {
                query: required("query")?,
                count: call.get_u64("count").map(|c| c.min(u32::MAX as u64) as u32),
                country: call.get_string("country"),
                language: call.get_string("search_lang"),
            })),
            WEB_FETCH => Ok(Self::Fetch(FetchRequest {
                url: required("url")?,
                timeout_secs: call.get_u64("timeout"),
                headers: call.get_string_map("headers"),
            })),
            RUN_RESEARCH_TASK => Ok(Self::Research {
                task: required("prompt")?,
            }),
            other => Err(FathomError::oracle(format!("Unknown tool: {}", other))),
        }
    }
}
