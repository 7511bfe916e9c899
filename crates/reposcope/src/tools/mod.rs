//! Tool handlers exposed to the MCP host.
//!
//! Handlers are plain functions with typed inputs and a [`ToolOutcome`]
//! output; the transport layer converts outcomes into protocol results.
//! Expected failures ("not ready", "not found", binary files) are
//! error-flagged outcomes, never transport errors.

mod read;
mod search;

pub use read::{handle_read, ReadArgs};
pub use search::{handle_search, SearchArgs};

/// A human-readable tool result. `is_error` marks user-visible failures
/// while still carrying an explanatory content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

const NOT_READY_SEARCH: &str =
    "Search is not available. The git repositories are still being indexed. Please try again later.";
const NOT_READY_READ: &str =
    "Read is not available. The git repositories are still being indexed. Please try again later.";
