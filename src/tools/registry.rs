//! Tool registry - manages and dispatches tool calls
//!
//! Holds the definitions advertised to the oracle and routes research-loop
//! invocations to the search and fetch adapters.

use std::collections::HashMap;

use serde_json::json;

use crate::agent::task::ExecutionContext;
use crate::core::{
    Config, Result, ToolCategory, ToolDefinition, ToolInvocation, RUN_RESEARCH_TASK, WEB_FETCH,
    WEB_SEARCH,
};
use crate::tools::envelope::{ResultEnvelope, ToolError};
use crate::tools::fetch::FetchAdapter;
use crate::tools::search::SearchAdapter;

/// Registry of available tools
pub struct ToolRegistry {
    /// Tool definitions indexed by name
    definitions: HashMap<String, ToolDefinition>,
    /// Tool categories
    categories: HashMap<String, ToolCategory>,
    search: SearchAdapter,
    fetch: FetchAdapter,
}

impl ToolRegistry {
    /// Create a registry with adapters built from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let search = SearchAdapter::new(config.search.clone(), config.retry.clone())?;
        let fetch = FetchAdapter::new(config.fetch.clone())?;
        Ok(Self::with_adapters(search, fetch))
    }

    /// Create a registry around existing adapters
    pub fn with_adapters(search: SearchAdapter, fetch: FetchAdapter) -> Self {
        let mut registry = Self {
            definitions: HashMap::new(),
            categories: HashMap::new(),
            search,
            fetch,
        };

        registry.register_web_tools();
        registry.register_research_tool();

        registry
    }

    /// Register the search and fetch tools
    fn register_web_tools(&mut self) {
        self.register(
            ToolDefinition::function(
                WEB_SEARCH,
                "Search the web. Returns titles, urls and snippets of matching pages.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to execute"
                        },
                        "count": {
                            "type": "integer",
                            "description": "Number of search results to return (1-20)"
                        },
                        "country": {
                            "type": "string",
                            "description": "Country code for localized results"
                        },
                        "search_lang": {
                            "type": "string",
                            "description": "Language for search results"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            ToolCategory::Search,
        );

        self.register(
            ToolDefinition::function(
                WEB_FETCH,
                "Fetch the full readable text of a web page.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The URL to fetch content from"
                        },
                        "timeout": {
                            "type": "integer",
                            "description": "Request timeout in seconds"
                        },
                        "headers": {
                            "type": "object",
                            "description": "Optional headers to include in the request"
                        }
                    },
                    "required": ["url"]
                }),
            ),
            ToolCategory::Fetch,
        );
    }

    /// Register the lead's delegation tool
    fn register_research_tool(&mut self) {
        self.register(
            ToolDefinition::function(
                RUN_RESEARCH_TASK,
                "Deploy a research subagent with web search and fetch capabilities. \
                 Give clear, specific instructions; deploy several in parallel for \
                 independent research streams.",
                json!({
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "Detailed instructions for the subagent's research task"
                        }
                    },
                    "required": ["prompt"]
                }),
            ),
            ToolCategory::Research,
        );
    }

    /// Register a tool definition
    pub fn register(&mut self, definition: ToolDefinition, category: ToolCategory) {
        let name = definition.function.name.clone();
        self.definitions.insert(name.clone(), definition);
        self.categories.insert(name, category);
    }

    /// Get tool definitions by category
    pub fn definitions_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> = self
            .definitions
            .iter()
            .filter(|(name, _)| self.categories.get(*name) == Some(&category))
            .map(|(_, def)| def)
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Tools available inside a research loop
    pub fn web_tools(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .definitions_by_category(ToolCategory::Search)
            .into_iter()
            .cloned()
            .collect();
        defs.extend(
            self.definitions_by_category(ToolCategory::Fetch)
                .into_iter()
                .cloned(),
        );
        defs
    }

    /// Tools available to the lead
    pub fn research_tools(&self) -> Vec<ToolDefinition> {
        self.definitions_by_category(ToolCategory::Research)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Execute a research-loop invocation; never fails
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        context: &ExecutionContext,
    ) -> ResultEnvelope {
        match invocation {
            ToolInvocation::Search(request) => {
                self.search
                    .search(request, &context.credentials.search_api_key)
                    .await
            }
            ToolInvocation::Fetch(request) => self.fetch.fetch(request).await,
            ToolInvocation::Research { task } => ResultEnvelope::research_err(
                task,
                ToolError::terminal(format!(
                    "{} is only available to the lead agent",
                    RUN_RESEARCH_TASK
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::task::Credentials;
    use std::sync::Arc;

    #[test]
    fn test_tool_sets() {
        let registry = ToolRegistry::from_config(&Config::default()).unwrap();

        let web: Vec<String> = registry
            .web_tools()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(web, vec![WEB_SEARCH.to_string(), WEB_FETCH.to_string()]);

        let lead = registry.research_tools();
        assert_eq!(lead.len(), 1);
        assert_eq!(lead[0].function.name, RUN_RESEARCH_TASK);
    }

    #[tokio::test]
    async fn test_research_not_executable_in_loop() {
        let registry = ToolRegistry::from_config(&Config::default()).unwrap();
        let context = ExecutionContext::new("2025-01-01", Arc::new(Credentials::default()));
        let envelope = registry
            .execute(&ToolInvocation::research("nested research"), &context)
            .await;
        assert_eq!(envelope.request(), "nested research");
        assert!(envelope.is_error());
    }
}
