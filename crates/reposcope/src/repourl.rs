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

//! Mapping between remote SSH URLs, filesystem-safe repo IDs, and display
//! names. The repo ID is the canonical key across working trees, index
//! directories, and the manifest.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Matches SCP-style URLs: `git@github.com:org/repo.git`,
/// `git@gitlab.com:group/sub/repo.git`.
static SSH_SCP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^git@([^:]+):(.+?)(?:\.git)?$").unwrap());

/// Matches SSH URL style: `ssh://git@github.com/org/repo.git`.
static SSH_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ssh://git@([^/]+)/(.+?)(?:\.git)?$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoUrlError {
    #[error("invalid SSH URL format")]
    InvalidSshUrl,
}

/// Parsed components of an SSH git URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub host: String,
    pub path: String,
    /// Final path segment, e.g. `repo` for `org/repo`.
    pub repo: String,
}

/// Parses an SSH git URL, accepting both SCP-style (`git@host:path`) and
/// URL style (`ssh://git@host/path`). The trailing `.git` suffix is
/// stripped from the path.
pub fn parse_ssh_url(url: &str) -> Result<ParsedUrl, RepoUrlError> {
    let url = url.trim();

    // SCP-style is the common form, try it first.
    for pattern in [&*SSH_SCP_PATTERN, &*SSH_URL_PATTERN] {
        if let Some(caps) = pattern.captures(url) {
            let host = caps[1].to_string();
            let path = caps[2].to_string();
            if path.is_empty() {
                return Err(RepoUrlError::InvalidSshUrl);
            }
            let repo = extract_repo_name(&path);
            return Ok(ParsedUrl { host, path, repo });
        }
    }

    Err(RepoUrlError::InvalidSshUrl)
}

/// Returns true when `url` parses as an SSH git URL.
pub fn is_valid_ssh_url(url: &str) -> bool {
    parse_ssh_url(url).is_ok()
}

fn extract_repo_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Converts an SSH URL to a filesystem-safe repository ID used for
/// directory names and index references.
///
/// `git@github.com:org/repo.git` -> `github.com_org_repo`. Parsing never
/// fails here: an unparseable URL is sanitized literally so the result is
/// still a unique, filesystem-safe token.
pub fn url_to_repo_id(url: &str) -> String {
    match parse_ssh_url(url) {
        Ok(parsed) => sanitize_for_filesystem(&format!("{}/{}", parsed.host, parsed.path)),
        Err(_) => sanitize_for_filesystem(url),
    }
}

/// Converts a repository ID back to the display form, approximately the
/// inverse of [`url_to_repo_id`]: the first underscore separates host from
/// path, remaining underscores become slashes.
///
/// `github.com_org_repo` -> `github.com/org/repo`.
pub fn repo_id_to_display(repo_id: &str) -> String {
    match repo_id.split_once('_') {
        Some((host, rest)) => format!("{}/{}", host, rest.replace('_', "/")),
        None => repo_id.to_string(),
    }
}

/// Converts a display form (`github.com/org/repo`) to a repository ID.
pub fn display_to_repo_id(display: &str) -> String {
    sanitize_for_filesystem(display)
}

/// Strips user/scheme prefixes and the `.git` suffix, then replaces `/`,
/// `:`, and `@` with underscores.
fn sanitize_for_filesystem(s: &str) -> String {
    let s = s.strip_prefix("ssh://git@").unwrap_or(s);
    let s = s.strip_prefix("git@").unwrap_or(s);
    let s = s.strip_suffix(".git").unwrap_or(s);
    s.replace(['/', ':', '@'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scp_style() {
        let p = parse_ssh_url("git@github.com:org/repo.git").unwrap();
        assert_eq!(p.host, "github.com");
        assert_eq!(p.path, "org/repo");
        assert_eq!(p.repo, "repo");
    }

    #[test]
    fn parse_scp_style_nested_group() {
        let p = parse_ssh_url("git@gitlab.com:group/sub/repo.git").unwrap();
        assert_eq!(p.host, "gitlab.com");
        assert_eq!(p.path, "group/sub/repo");
        assert_eq!(p.repo, "repo");
    }

    #[test]
    fn parse_ssh_url_style() {
        let p = parse_ssh_url("ssh://git@github.com/org/repo.git").unwrap();
        assert_eq!(p.host, "github.com");
        assert_eq!(p.path, "org/repo");
        assert_eq!(p.repo, "repo");
    }

    #[test]
    fn parse_without_git_suffix() {
        let p = parse_ssh_url("git@github.com:org/repo").unwrap();
        assert_eq!(p.path, "org/repo");
    }

    #[test]
    fn parse_rejects_invalid() {
        assert_eq!(
            parse_ssh_url("https://github.com/org/repo.git").unwrap_err(),
            RepoUrlError::InvalidSshUrl
        );
        assert!(parse_ssh_url("not a url").is_err());
        assert!(parse_ssh_url("").is_err());
    }

    #[test]
    fn is_valid_matches_parse() {
        assert!(is_valid_ssh_url("git@github.com:org/repo.git"));
        assert!(!is_valid_ssh_url("ftp://example.com/repo"));
    }

    #[test]
    fn url_to_repo_id_basic() {
        assert_eq!(
            url_to_repo_id("git@github.com:org/repo.git"),
            "github.com_org_repo"
        );
        assert_eq!(
            url_to_repo_id("ssh://git@github.com/org/repo.git"),
            "github.com_org_repo"
        );
        assert_eq!(
            url_to_repo_id("git@gitlab.com:group/sub/repo.git"),
            "gitlab.com_group_sub_repo"
        );
    }

    #[test]
    fn url_to_repo_id_falls_back_to_sanitizing() {
        let id = url_to_repo_id("https://github.com/org/repo.git");
        assert!(!id.contains('/'));
        assert!(!id.contains(':'));
        assert!(!id.contains('@'));
        assert!(!id.is_empty());
    }

    #[test]
    fn repo_id_display_round_trip() {
        for url in [
            "git@github.com:org/repo.git",
            "git@gitlab.com:group/sub/repo.git",
            "ssh://git@bitbucket.org/team/project.git",
        ] {
            let parsed = parse_ssh_url(url).unwrap();
            let display = repo_id_to_display(&url_to_repo_id(url));
            assert_eq!(display, format!("{}/{}", parsed.host, parsed.path));
        }
    }

    #[test]
    fn display_to_repo_id_round_trip() {
        assert_eq!(
            display_to_repo_id("github.com/org/repo"),
            "github.com_org_repo"
        );
        assert_eq!(
            repo_id_to_display("github.com_org_repo"),
            "github.com/org/repo"
        );
    }

    #[test]
    fn repo_id_without_underscore_passes_through_display() {
        assert_eq!(repo_id_to_display("plain"), "plain");
    }
}
