//! Tool result envelopes
//!
//! Every tool call ends in a [`ResultEnvelope`], success or failure. The
//! envelope is rendered into a tagged block for the oracle; every field is
//! escaped so fetched content can never be read back as block structure.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::ToolInvocation;

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Successful search payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_count: usize,
    pub results: Vec<SearchHit>,
}

/// Successful fetch payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Url after redirects
    pub final_url: String,
    pub status: u16,
    /// Extracted plain text
    pub content: String,
}

/// Why a tool call produced no payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolError {
    pub message: String,
    /// Transient failure whose retries ran out; the oracle may try again later
    pub retryable: bool,
}

impl ToolError {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

/// Structured outcome of one tool call
///
/// The success and error branches are exclusive by construction and every
/// variant keeps the original request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultEnvelope {
    Search {
        query: String,
        outcome: Result<SearchResults, ToolError>,
    },
    Fetch {
        url: String,
        outcome: Result<FetchedPage, ToolError>,
    },
    Research {
        task: String,
        outcome: Result<String, ToolError>,
    },
}

impl ResultEnvelope {
    pub fn search_ok(query: impl Into<String>, results: Vec<SearchHit>) -> Self {
        Self::Search {
            query: query.into(),
            outcome: Ok(SearchResults {
                total_count: results.len(),
                results,
            }),
        }
    }

    pub fn search_err(query: impl Into<String>, error: ToolError) -> Self {
        Self::Search {
            query: query.into(),
            outcome: Err(error),
        }
    }

    pub fn fetch_ok(url: impl Into<String>, page: FetchedPage) -> Self {
        Self::Fetch {
            url: url.into(),
            outcome: Ok(page),
        }
    }

    pub fn fetch_err(url: impl Into<String>, error: ToolError) -> Self {
        Self::Fetch {
            url: url.into(),
            outcome: Err(error),
        }
    }

    pub fn research_ok(task: impl Into<String>, report: impl Into<String>) -> Self {
        Self::Research {
            task: task.into(),
            outcome: Ok(report.into()),
        }
    }

    pub fn research_err(task: impl Into<String>, error: ToolError) -> Self {
        Self::Research {
            task: task.into(),
            outcome: Err(error),
        }
    }

    /// Error envelope answering an invocation that was never carried out
    pub fn failed(invocation: &ToolInvocation, error: ToolError) -> Self {
        match invocation {
            ToolInvocation::Search(req) => Self::search_err(&req.query, error),
            ToolInvocation::Fetch(req) => Self::fetch_err(&req.url, error),
            ToolInvocation::Research { task } => Self::research_err(task, error),
        }
    }

    /// The query, url or task this envelope answers
    pub fn request(&self) -> &str {
        match self {
            Self::Search { query, .. } => query,
            Self::Fetch { url, .. } => url,
            Self::Research { task, .. } => task,
        }
    }

    pub fn error(&self) -> Option<&ToolError> {
        match self {
            Self::Search { outcome, .. } => outcome.as_ref().err(),
            Self::Fetch { outcome, .. } => outcome.as_ref().err(),
            Self::Research { outcome, .. } => outcome.as_ref().err(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Stable hash of what the call returned, used to spot repeated evidence.
    ///
    /// The request is left out, so a reworded query that yields the same hits
    /// has the same fingerprint.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self {
            Self::Search { outcome, .. } => {
                "search".hash(&mut hasher);
                match outcome {
                    Ok(found) => found.results.hash(&mut hasher),
                    Err(error) => error.message.hash(&mut hasher),
                }
            }
            Self::Fetch { outcome, .. } => {
                "fetch".hash(&mut hasher);
                match outcome {
                    Ok(page) => {
                        page.final_url.hash(&mut hasher);
                        page.content.hash(&mut hasher);
                    }
                    Err(error) => error.message.hash(&mut hasher),
                }
            }
            Self::Research { outcome, .. } => {
                "research".hash(&mut hasher);
                match outcome {
                    Ok(report) => report.hash(&mut hasher),
                    Err(error) => error.message.hash(&mut hasher),
                }
            }
        }
        hasher.finish()
    }

    /// Render as a tagged block for the oracle
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Search { query, outcome } => {
                out.push_str("<search_result>\n");
                push_field(&mut out, "query", query);
                match outcome {
                    Ok(found) => {
                        push_field(&mut out, "total_count", &found.total_count.to_string());
                        out.push_str("<results>\n");
                        for hit in &found.results {
                            out.push_str("<result>\n");
                            push_field(&mut out, "title", &hit.title);
                            push_field(&mut out, "url", &hit.url);
                            push_field(&mut out, "description", &hit.description);
                            out.push_str("</result>\n");
                        }
                        out.push_str("</results>\n");
                    }
                    Err(error) => push_error(&mut out, error),
                }
                out.push_str("</search_result>");
            }
            Self::Fetch { url, outcome } => {
                out.push_str("<fetch_result>\n");
                push_field(&mut out, "url", url);
                match outcome {
                    Ok(page) => {
                        push_field(&mut out, "final_url", &page.final_url);
                        push_field(&mut out, "status_code", &page.status.to_string());
                        push_field(&mut out, "content", &page.content);
                    }
                    Err(error) => {
                        push_field(&mut out, "status_code", "error");
                        push_error(&mut out, error);
                    }
                }
                out.push_str("</fetch_result>");
            }
            Self::Research { task, outcome } => {
                out.push_str("<research_result>\n");
                push_field(&mut out, "task", task);
                match outcome {
                    Ok(report) => push_field(&mut out, "report", report),
                    Err(error) => push_error(&mut out, error),
                }
                out.push_str("</research_result>");
            }
        }
        out
    }

    /// Parse a block produced by [`render`](Self::render)
    pub fn parse(block: &str) -> Option<Self> {
        let block = block.trim();
        if let Some(body) = section(block, "search_result") {
            let query = field(body, "query")?;
            if let Some(error) = parse_error(body) {
                return Some(Self::search_err(query, error));
            }
            let total_count = section(body, "total_count")?.parse().ok()?;
            let list = section(body, "results")?;
            let mut results = Vec::new();
            let mut rest = list;
            while let Some((item, tail)) = split_section(rest, "result") {
                results.push(SearchHit {
                    title: field(item, "title")?,
                    url: field(item, "url")?,
                    description: field(item, "description")?,
                });
                rest = tail;
            }
            return Some(Self::Search {
                query,
                outcome: Ok(SearchResults {
                    total_count,
                    results,
                }),
            });
        }

        if let Some(body) = section(block, "fetch_result") {
            let url = field(body, "url")?;
            if let Some(error) = parse_error(body) {
                return Some(Self::fetch_err(url, error));
            }
            let page = FetchedPage {
                final_url: field(body, "final_url")?,
                status: section(body, "status_code")?.parse().ok()?,
                content: field(body, "content")?,
            };
            return Some(Self::fetch_ok(url, page));
        }

        if let Some(body) = section(block, "research_result") {
            let task = field(body, "task")?;
            if let Some(error) = parse_error(body) {
                return Some(Self::research_err(task, error));
            }
            return Some(Self::research_ok(task, field(body, "report")?));
        }

        None
    }
}

/// Escape the block-format metacharacters
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape`]; unknown entities are left as they are
pub fn unescape(text: &str) -> String {
    const ENTITIES: [(&str, char); 6] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&#x27;", '\''),
        ("&#39;", '\''),
    ];

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape(value));
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn push_error(out: &mut String, error: &ToolError) {
    push_field(out, "error", &error.message);
    if error.retryable {
        push_field(out, "retryable", "true");
    }
}

fn parse_error(body: &str) -> Option<ToolError> {
    let message = field(body, "error")?;
    Some(ToolError {
        message,
        retryable: section(body, "retryable") == Some("true"),
    })
}

/// Raw text between the first `<tag>` and its closing tag
fn section<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    split_section(text, tag).map(|(inner, _)| inner)
}

/// Like [`section`], also returning what follows the closing tag
fn split_section<'a>(text: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    Some((&text[start..end], &text[end + close.len()..]))
}

fn field(text: &str, tag: &str) -> Option<String> {
    section(text, tag).map(unescape)
}
