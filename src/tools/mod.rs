//! Tools module - web adapters and the tool registry
//!
//! Contains the search and fetch adapters, the text extractor they share,
//! the result envelope protocol, and the registry that dispatches calls.

pub mod envelope;
pub mod extract;
pub mod fetch;
pub mod registry;
pub mod search;

pub use envelope::{FetchedPage, ResultEnvelope, SearchHit, SearchResults, ToolError};
pub use extract::extract_text;
pub use fetch::FetchAdapter;
pub use registry::ToolRegistry;
pub use search::{SearchAdapter, TransientFailure};
