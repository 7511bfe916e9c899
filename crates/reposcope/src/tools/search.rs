// Copyright 2025 Reposcope Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `search_code` tool: full-text query across all indexed
//! repositories with optional repository and extension filters.

use std::fmt::Write as _;

use serde::Deserialize;

use super::{ToolOutcome, NOT_READY_SEARCH};
use crate::search::{SearchQuery, SearchResults};
use crate::service::RepoService;

/// Arguments for `search_code`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchArgs {
    /// Search query (supports words and phrases).
    #[serde(default)]
    pub query: String,
    /// Filter by repository name, e.g. `github.com/org/repo`.
    #[serde(default)]
    pub repository: Option<String>,
    /// Filter by file extension, e.g. `go`, `py`, `js`.
    #[serde(default)]
    pub extension: Option<String>,
}

/// Executes the search and formats the result listing.
pub fn handle_search(service: &RepoService, args: SearchArgs) -> ToolOutcome {
    if !service.is_ready() {
        return ToolOutcome::error(NOT_READY_SEARCH);
    }

    let query = args.query.trim();
    if query.is_empty() {
        return ToolOutcome::error("Query cannot be empty");
    }

    let alias = match service.index_alias() {
        Ok(alias) => alias,
        Err(e) => return ToolOutcome::error(format!("Failed to access indexes: {e}")),
    };

    let repository = args
        .repository
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    // Accept both ".py" and "py"; the index stores lowercased extensions.
    let extension = args
        .extension
        .as_deref()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty());

    let request = SearchQuery {
        query: query.to_string(),
        repository,
        extension,
        limit: service.settings().max_results,
    };

    match alias.search(&request) {
        Ok(results) => ToolOutcome::ok(format_results(&results, query)),
        Err(e) => ToolOutcome::error(format!("Search failed: {e}")),
    }
}

fn format_results(results: &SearchResults, query: &str) -> String {
    if results.total == 0 {
        return format!("No results found for query: {query}");
    }

    let mut out = String::new();
    let _ = writeln!(out, "Found {} results for '{}':", results.total, query);
    out.push('\n');

    for (i, hit) in results.hits.iter().enumerate() {
        let _ = writeln!(out, "### {}. {}:{}", i + 1, hit.repository, hit.file_path);
        let _ = writeln!(out, "**Score**: {:.4}", hit.score);
        out.push('\n');

        if !hit.fragments.is_empty() {
            out.push_str("```\n");
            for fragment in &hit.fragments {
                out.push_str(fragment);
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out.push('\n');
    }

    if results.total > results.hits.len() as u64 {
        let _ = writeln!(
            out,
            "... and {} more results",
            results.total - results.hits.len() as u64
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchHit;

    fn hit(repo: &str, path: &str, score: f32, fragments: Vec<String>) -> SearchHit {
        SearchHit {
            score,
            repository: repo.to_string(),
            file_path: path.to_string(),
            extension: "go".to_string(),
            fragments,
        }
    }

    #[test]
    fn formats_zero_results_as_plain_message() {
        let results = SearchResults::default();
        assert_eq!(
            format_results(&results, "nothing"),
            "No results found for query: nothing"
        );
    }

    #[test]
    fn formats_hits_with_scores_and_fragments() {
        let results = SearchResults {
            total: 2,
            hits: vec![
                hit(
                    "github.com/test/repo",
                    "main.go",
                    1.5,
                    vec!["func <b>main</b>()".to_string()],
                ),
                hit("github.com/test/repo", "util.go", 0.7, Vec::new()),
            ],
        };

        let text = format_results(&results, "main");
        assert!(text.starts_with("Found 2 results for 'main':"));
        assert!(text.contains("### 1. github.com/test/repo:main.go"));
        assert!(text.contains("**Score**: 1.5000"));
        assert!(text.contains("func <b>main</b>()"));
        assert!(text.contains("### 2. github.com/test/repo:util.go"));
        assert!(!text.contains("more results"));
    }

    #[test]
    fn notes_truncated_results() {
        let results = SearchResults {
            total: 25,
            hits: vec![hit("github.com/test/repo", "main.go", 1.0, Vec::new())],
        };
        let text = format_results(&results, "q");
        assert!(text.contains("... and 24 more results"));
    }
}
