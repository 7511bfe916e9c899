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

//! File-level gates applied before indexing and reading: pattern-based
//! exclusion, a max-size cap, and a NUL-byte binary heuristic.

/// Patterns excluded from indexing by default: dependency directories,
/// build outputs, lockfiles, and binary/media formats.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    // Dependencies
    "node_modules/**",
    "vendor/**",
    "venv/**",
    ".venv/**",
    "target/**",
    "build/**",
    "dist/**",
    "out/**",
    ".git/**",
    "__pycache__/**",
    ".pytest_cache/**",
    ".gradle/**",
    ".m2/**",
    ".npm/**",
    ".yarn/**",
    // Generated files
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.pb.go",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    "poetry.lock",
    "Cargo.lock",
    // Binary/media: images
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.svg",
    "*.bmp",
    "*.tiff",
    "*.webp",
    "*.psd",
    // Binary/media: fonts
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.eot",
    "*.otf",
    // Binary/media: archives
    "*.zip",
    "*.tar",
    "*.gz",
    "*.rar",
    "*.7z",
    "*.bz2",
    "*.xz",
    "*.jar",
    "*.war",
    "*.ear",
    // Binary/media: executables and libraries
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    "*.a",
    "*.lib",
    "*.class",
    "*.pyc",
    "*.pyo",
    "*.o",
    "*.obj",
    // Binary/media: documents
    "*.pdf",
    "*.doc",
    "*.docx",
    "*.xls",
    "*.xlsx",
    "*.ppt",
    "*.pptx",
    // Binary/media: other
    "*.db",
    "*.sqlite",
    "*.sqlite3",
    "*.mp3",
    "*.mp4",
    "*.wav",
    "*.avi",
    "*.mov",
    "*.mkv",
];

/// Decides which files are included in indexing.
#[derive(Debug, Clone)]
pub struct FileFilter {
    patterns: Vec<String>,
    max_file_size: u64,
}

impl FileFilter {
    /// Creates a filter with the default exclusion pattern set.
    pub fn new(max_file_size: u64) -> Self {
        Self::with_patterns(
            DEFAULT_EXCLUDE_PATTERNS.iter().map(|s| s.to_string()),
            max_file_size,
        )
    }

    pub fn with_patterns(patterns: impl IntoIterator<Item = String>, max_file_size: u64) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
            max_file_size,
        }
    }

    /// Returns true if `rel_path` (relative to the repository root) matches
    /// any exclusion pattern. Separators are normalized to `/` first.
    pub fn should_exclude(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.replace('\\', "/");
        self.patterns
            .iter()
            .any(|pattern| match_pattern(pattern, &rel_path))
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

/// Matches a path against one pattern. Supported forms:
///
/// - `dir/**`: `dir` as a directory component at any depth with at least
///   one component after it (so `vendor/**` also excludes
///   `services/api/vendor/foo.go`)
/// - `**/suffix`: suffix match at any depth
/// - `*.ext`: case-insensitive filename suffix
/// - `name`: exact filename anywhere in the path, or the exact path
fn match_pattern(pattern: &str, path: &str) -> bool {
    if let Some(rest) = pattern.strip_prefix("**/") {
        if match_simple_pattern(rest, path) {
            return true;
        }
        let parts: Vec<&str> = path.split('/').collect();
        for i in 1..parts.len() {
            if match_simple_pattern(rest, &parts[i..].join("/")) {
                return true;
            }
        }
        return false;
    }

    if let Some(dir) = pattern.strip_suffix("/**") {
        if path == dir || path.starts_with(&format!("{dir}/")) {
            return true;
        }
        if path.contains(&format!("/{dir}/")) {
            return true;
        }
        // The directory name as a component anywhere, with something after it.
        let parts: Vec<&str> = path.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            if *part == dir && i < parts.len() - 1 {
                return true;
            }
        }
        return false;
    }

    match_simple_pattern(pattern, path)
}

/// Matches a simple glob (a `*` prefix but no `**`).
fn match_simple_pattern(pattern: &str, name: &str) -> bool {
    if pattern.starts_with("*.") {
        let ext = &pattern[1..]; // ".ext"
        return name.to_lowercase().ends_with(&ext.to_lowercase());
    }

    if pattern == name {
        return true;
    }

    if let Some(suffix) = pattern.strip_prefix('*') {
        let base = base_name(name);
        return base.to_lowercase().ends_with(&suffix.to_lowercase());
    }

    base_name(name) == pattern
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns true iff any of the first 512 bytes is NUL. This is the same
/// heuristic git uses. Empty content is not binary.
pub fn is_binary(content: &[u8]) -> bool {
    let check_len = content.len().min(512);
    content[..check_len].contains(&0)
}

/// Returns the final path component's extension without the leading dot,
/// lowercased. `""` when there is none (`Makefile`). The extension runs
/// from the last dot to the end of the name, so `.gitignore` yields
/// `gitignore`.
pub fn get_extension(path: &str) -> String {
    let base = base_name(&path.replace('\\', "/")).to_string();
    match base.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> FileFilter {
        FileFilter::new(1024 * 1024)
    }

    #[test]
    fn excludes_dependency_dirs_at_any_depth() {
        let f = default_filter();
        assert!(f.should_exclude("vendor/foo.go"));
        assert!(f.should_exclude("foo/vendor/x"));
        assert!(f.should_exclude("services/api/vendor/foo.go"));
        assert!(f.should_exclude("node_modules/pkg/index.js"));
        assert!(f.should_exclude("a/b/node_modules/pkg/index.js"));
    }

    #[test]
    fn does_not_exclude_similar_directory_names() {
        let f = default_filter();
        assert!(!f.should_exclude("foo/vendoring/x"));
        assert!(!f.should_exclude("vendored.go"));
        assert!(!f.should_exclude("src/main.go"));
    }

    #[test]
    fn excludes_by_extension_case_insensitive() {
        let f = default_filter();
        assert!(f.should_exclude("logo.png"));
        assert!(f.should_exclude("assets/Logo.PNG"));
        assert!(f.should_exclude("bundle.min.js"));
        assert!(!f.should_exclude("bundle.js"));
    }

    #[test]
    fn excludes_exact_names_anywhere() {
        let f = default_filter();
        assert!(f.should_exclude("package-lock.json"));
        assert!(f.should_exclude("web/package-lock.json"));
        assert!(f.should_exclude("Cargo.lock"));
        assert!(!f.should_exclude("Cargo.toml"));
    }

    #[test]
    fn normalizes_windows_separators() {
        let f = default_filter();
        assert!(f.should_exclude("foo\\vendor\\x"));
    }

    #[test]
    fn double_star_prefix_matches_at_depth() {
        let f = FileFilter::with_patterns(vec!["**/generated.go".to_string()], 1024);
        assert!(f.should_exclude("generated.go"));
        assert!(f.should_exclude("a/b/generated.go"));
        assert!(!f.should_exclude("a/b/other.go"));
    }

    #[test]
    fn binary_detection_is_nul_based() {
        assert!(is_binary(b"BIN\x00ARY"));
        assert!(is_binary(&[0u8]));
        assert!(!is_binary(b"plain text"));
        assert!(!is_binary(b""));
        // Only the first 512 bytes are inspected.
        let mut late_nul = vec![b'a'; 513];
        late_nul[512] = 0;
        assert!(!is_binary(&late_nul));
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(get_extension("main.go"), "go");
        assert_eq!(get_extension("src/App.TSX"), "tsx");
        assert_eq!(get_extension("archive.tar.gz"), "gz");
        assert_eq!(get_extension("Makefile"), "");
        assert_eq!(get_extension(".gitignore"), "gitignore");
    }
}
