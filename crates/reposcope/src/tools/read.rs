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

//! The `read_code` tool: retrieve one file from an indexed repository,
//! with traversal, size, and binary gates.

use std::fmt::Write as _;

use serde::Deserialize;

use super::{ToolOutcome, NOT_READY_READ};
use crate::filter::{get_extension, is_binary};
use crate::repourl::display_to_repo_id;
use crate::service::RepoService;

/// Arguments for `read_code`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadArgs {
    /// Repository name, e.g. `github.com/org/repo`.
    #[serde(default)]
    pub repository: String,
    /// File path relative to the repository root.
    #[serde(default)]
    pub path: String,
}

/// Reads a file and formats it as a language-tagged fenced block.
pub fn handle_read(service: &RepoService, args: ReadArgs) -> ToolOutcome {
    if !service.is_ready() {
        return ToolOutcome::error(NOT_READY_READ);
    }

    let repository = args.repository.trim();
    if repository.is_empty() {
        return ToolOutcome::error("Repository cannot be empty");
    }
    let path = args.path.trim();
    if path.is_empty() {
        return ToolOutcome::error("Path cannot be empty");
    }

    let cleaned = match validate_path(path) {
        Ok(cleaned) => cleaned,
        Err(reason) => return ToolOutcome::error(format!("Invalid path: {reason}")),
    };

    let repo_id = display_to_repo_id(repository);
    let repo_dir = service.repo_dir(&repo_id);
    if !repo_dir.exists() {
        return ToolOutcome::error(format!("Repository not found: {repository}"));
    }

    // Redundant with validate_path above, kept as a second line of
    // defense: the resolved path must stay inside the repository.
    let full_path = repo_dir.join(&cleaned);
    if !full_path.starts_with(&repo_dir) {
        return ToolOutcome::error("Path traversal detected");
    }

    let meta = match std::fs::metadata(&full_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ToolOutcome::error(format!("File not found: {path}"));
        }
        Err(e) => return ToolOutcome::error(format!("Error accessing file: {e}")),
    };

    if meta.is_dir() {
        return ToolOutcome::error("Cannot read directory, please specify a file path");
    }

    let max_file_size = service.settings().max_file_size;
    if meta.len() > max_file_size {
        return ToolOutcome::error(format!(
            "File too large ({:.2} KB). Maximum allowed size is {:.2} KB",
            meta.len() as f64 / 1024.0,
            max_file_size as f64 / 1024.0
        ));
    }

    let content = match std::fs::read(&full_path) {
        Ok(content) => content,
        Err(e) => return ToolOutcome::error(format!("Error reading file: {e}")),
    };

    if is_binary(&content) {
        return ToolOutcome::error("Cannot display binary file content");
    }

    let language = extension_to_language(&get_extension(path));
    let mut out = String::new();
    let _ = writeln!(out, "**File**: `{path}`");
    let _ = writeln!(out, "**Repository**: {repository}");
    let _ = writeln!(out, "**Size**: {} bytes", content.len());
    out.push('\n');
    let _ = write!(
        out,
        "```{}\n{}\n```",
        language,
        String::from_utf8_lossy(&content)
    );

    ToolOutcome::ok(out)
}

/// Lexically cleans and validates the user-supplied path. Rejects
/// absolute paths and any form of upward traversal, including
/// Windows-style `..\` sequences. Returns the cleaned path on success.
fn validate_path(path: &str) -> Result<String, &'static str> {
    let cleaned = clean_path(path);

    if cleaned.starts_with('/') {
        return Err("absolute paths are not allowed");
    }
    if cleaned == ".."
        || cleaned.starts_with("..")
        || cleaned.contains("/..")
        || cleaned.contains("\\..")
    {
        return Err("path traversal is not allowed");
    }

    Ok(cleaned)
}

/// Lexical path normalization over `/`-separated components: drops `.`
/// and empty components and resolves `..` against preceding components.
/// Backslashes are not separators here, matching the strictest reading of
/// the traversal checks above.
fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if matches!(components.last(), Some(&"..")) || components.is_empty() {
                    components.push("..");
                } else {
                    components.pop();
                }
            }
            other => components.push(other),
        }
    }

    let joined = components.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Maps a file extension to the fenced-code language tag. Unknown
/// extensions pass through unchanged.
fn extension_to_language(ext: &str) -> String {
    let lang = match ext.to_lowercase().as_str() {
        "go" => "go",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "java" => "java",
        "kt" => "kotlin",
        "rs" => "rust",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" => "bash",
        "zsh" => "zsh",
        "fish" => "fish",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "md" => "markdown",
        "txt" => "text",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        "tf" => "terraform",
        "dockerfile" => "dockerfile",
        other => return other.to_string(),
    };
    lang.to_string()
}
