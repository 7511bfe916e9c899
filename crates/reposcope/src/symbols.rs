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

//! Regex-based extraction of top-level symbol names from source text.
//!
//! This is a ranking heuristic, not a parser: false positives are
//! acceptable because symbols only boost scoring, they never gate
//! document selection.

use std::collections::HashMap;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Identifiers longer than this are rejected as noise.
const MAX_SYMBOL_LEN: usize = 100;

static LANGUAGE_PATTERNS: Lazy<HashMap<&'static str, Vec<Regex>>> = Lazy::new(|| {
    let build = |patterns: &[&str]| -> Vec<Regex> {
        patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
    };

    let mut map = HashMap::new();
    map.insert(
        "go",
        build(&[
            r"func\s+(\w+)",
            r"type\s+(\w+)\s+(?:struct|interface)",
            r"const\s+(\w+)",
            r"var\s+(\w+)",
        ]),
    );
    map.insert(
        "py",
        build(&[r"(?m)^\s*def\s+(\w+)", r"(?m)^\s*class\s+(\w+)"]),
    );
    map.insert(
        "java",
        build(&[
            r"class\s+(\w+)",
            r"interface\s+(\w+)",
            r"enum\s+(\w+)",
            // Method signatures.
            r"(?:public|protected|private|static|\s) +[\w<>\[\]]+\s+(\w+) *\(",
        ]),
    );
    map.insert(
        "js",
        build(&[
            r"function\s+(\w+)",
            r"class\s+(\w+)",
            r"const\s+(\w+)\s*=",
            r"let\s+(\w+)\s*=",
            r"var\s+(\w+)\s*=",
        ]),
    );
    map.insert(
        "ts",
        build(&[
            r"function\s+(\w+)",
            r"class\s+(\w+)",
            r"interface\s+(\w+)",
            r"type\s+(\w+)\s*=",
            r"const\s+(\w+)\s*=",
            r"let\s+(\w+)\s*=",
        ]),
    );
    map.insert(
        "rs",
        build(&[
            r"fn\s+(\w+)",
            r"struct\s+(\w+)",
            r"enum\s+(\w+)",
            r"trait\s+(\w+)",
            r"mod\s+(\w+)",
            r"type\s+(\w+)",
        ]),
    );
    map.insert(
        "c",
        build(&[
            // Function definitions.
            r"(?m)^\s*\w+\s+(\w+)\s*\(.*\)\s*\{",
            r"struct\s+(\w+)",
            r"enum\s+(\w+)",
            r"#define\s+(\w+)",
        ]),
    );
    map.insert(
        "cpp",
        build(&[
            r"class\s+(\w+)",
            r"struct\s+(\w+)",
            r"enum\s+(\w+)",
            r"(?m)^\s*\w+\s+(\w+)\s*\(.*\)\s*\{",
        ]),
    );
    map
});

/// Maps an extension to its canonical pattern-table key, resolving common
/// aliases. Returns `None` for unrecognized extensions.
fn canonical_language(ext: &str) -> Option<&'static str> {
    let normalized = ext.trim_start_matches('.').to_lowercase();
    let key = match normalized.as_str() {
        "go" | "golang" => "go",
        "py" | "python" => "py",
        "java" => "java",
        "js" | "javascript" | "jsx" => "js",
        "ts" | "typescript" | "tsx" => "ts",
        "rs" | "rust" => "rs",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" | "cxx" => "cpp",
        _ => return None,
    };
    Some(key)
}

/// Extracts symbol names from `content` using the pattern table for the
/// given extension. Each pattern's first capture group is a symbol name.
/// Results are trimmed, capped at 100 characters, and deduplicated; order
/// is unspecified. Unknown extensions yield an empty set.
pub fn extract_symbols(ext: &str, content: &str) -> Vec<String> {
    let Some(lang) = canonical_language(ext) else {
        return Vec::new();
    };
    let Some(patterns) = LANGUAGE_PATTERNS.get(lang) else {
        return Vec::new();
    };

    let mut unique: HashSet<String> = HashSet::new();
    for regex in patterns {
        for caps in regex.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                let symbol = m.as_str().trim();
                if !symbol.is_empty() && symbol.len() < MAX_SYMBOL_LEN {
                    unique.insert(symbol.to_string());
                }
            }
        }
    }

    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(ext: &str, content: &str) -> HashSet<String> {
        extract_symbols(ext, content).into_iter().collect()
    }

    #[test]
    fn extracts_go_symbols() {
        let src = "package main\n\nfunc main() {}\n\ntype Server struct {}\n\nconst MaxRetries = 3\n";
        let syms = symbols("go", src);
        assert!(syms.contains("main"));
        assert!(syms.contains("Server"));
        assert!(syms.contains("MaxRetries"));
    }

    #[test]
    fn extracts_python_symbols_at_line_start() {
        let src = "def handler(req):\n    pass\n\nclass Worker:\n    def run(self):\n        pass\n";
        let syms = symbols("py", src);
        assert!(syms.contains("handler"));
        assert!(syms.contains("Worker"));
        assert!(syms.contains("run"));
    }

    #[test]
    fn extracts_rust_symbols() {
        let src = "pub fn serve() {}\nstruct Config;\nenum Mode { A, B }\ntrait Runner {}\n";
        let syms = symbols("rs", src);
        assert!(syms.contains("serve"));
        assert!(syms.contains("Config"));
        assert!(syms.contains("Mode"));
        assert!(syms.contains("Runner"));
    }

    #[test]
    fn alias_extensions_map_to_canonical_tables() {
        let src = "function render() {}\n";
        assert!(symbols("jsx", src).contains("render"));
        assert!(symbols("javascript", src).contains("render"));

        let ts = "interface Props {}\n";
        assert!(symbols("tsx", ts).contains("Props"));

        let c = "struct point { int x; };\n";
        assert!(symbols("h", c).contains("point"));
        let cpp = "class Widget {};\n";
        assert!(symbols("hpp", cpp).contains("Widget"));
        assert!(symbols("cc", cpp).contains("Widget"));
    }

    #[test]
    fn leading_dot_and_case_are_normalized() {
        let src = "func main() {}\n";
        assert!(symbols(".go", src).contains("main"));
        assert!(symbols("GO", src).contains("main"));
        assert!(symbols("golang", src).contains("main"));
    }

    #[test]
    fn unknown_extension_yields_empty() {
        assert!(extract_symbols("zig", "fn main() {}").is_empty());
        assert!(extract_symbols("", "func main() {}").is_empty());
    }

    #[test]
    fn long_identifiers_are_rejected() {
        let long = "x".repeat(150);
        let src = format!("fn {long}() {{}}");
        assert!(extract_symbols("rs", &src).is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let src = "fn run() {}\nfn run() {}\n";
        assert_eq!(extract_symbols("rs", src).len(), 1);
    }
}
