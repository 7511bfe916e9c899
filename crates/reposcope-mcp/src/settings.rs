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

//! Server settings, merged from: defaults <- config file <- env vars <- CLI.
//! Invalid environment values are ignored rather than fatal; the merged
//! result is validated once at the end.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reposcope::RepoSettings;

use crate::auth::AuthSettings;

const ENV_PREFIX: &str = "REPOSCOPE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

impl Transport {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "stdio" => Some(Self::Stdio),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub auth: AuthSettings,
    pub repos: RepoSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth: AuthSettings::default(),
            repos: RepoSettings {
                base_dir: default_base_dir(),
                ..RepoSettings::default()
            },
        }
    }
}

/// CLI-level overrides the binary passes to [`load_settings`]. All fields
/// are optional; unset fields leave the lower-priority layers in place.
#[derive(Debug, Clone, Default)]
pub struct MergeOpts {
    pub config_path: Option<PathBuf>,
    pub cli_transport: Option<String>,
    pub cli_host: Option<String>,
    pub cli_port: Option<u16>,
    pub cli_auth_type: Option<String>,
    pub cli_auth_username: Option<String>,
    pub cli_auth_password: Option<String>,
    pub cli_auth_api_keys: Option<Vec<String>>,
    pub cli_repos_enabled: Option<bool>,
    pub cli_repos_urls: Option<Vec<String>>,
    pub cli_repos_base_dir: Option<PathBuf>,
    pub cli_sync_interval_secs: Option<u64>,
    pub cli_sync_timeout_secs: Option<u64>,
    pub cli_max_file_size: Option<u64>,
    pub cli_max_results: Option<usize>,
}

/// Loads and merges settings, then validates the result.
pub fn load_settings(opts: MergeOpts) -> Result<ServerSettings> {
    let mut settings = ServerSettings::default();
    let mut transport = "stdio".to_string();

    if let Some(path) = opts.config_path.as_ref() {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let value: toml::Value = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            apply_config_file(&mut settings, &mut transport, &value);
        }
    }

    apply_env(&mut settings, &mut transport);

    // CLI overrides everything.
    if let Some(t) = opts.cli_transport {
        transport = t;
    }
    if let Some(host) = opts.cli_host {
        settings.host = host;
    }
    if let Some(port) = opts.cli_port {
        settings.port = port;
    }
    if let Some(auth_type) = opts.cli_auth_type {
        settings.auth.auth_type = auth_type;
    }
    if let Some(username) = opts.cli_auth_username {
        settings.auth.username = username;
    }
    if let Some(password) = opts.cli_auth_password {
        settings.auth.password = password;
    }
    if let Some(keys) = opts.cli_auth_api_keys {
        settings.auth.api_keys = clean_list(keys);
    }
    if let Some(enabled) = opts.cli_repos_enabled {
        settings.repos.enabled = enabled;
    }
    if let Some(urls) = opts.cli_repos_urls {
        settings.repos.urls = clean_list(urls);
    }
    if let Some(base_dir) = opts.cli_repos_base_dir {
        settings.repos.base_dir = base_dir;
    }
    if let Some(secs) = opts.cli_sync_interval_secs {
        settings.repos.sync_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = opts.cli_sync_timeout_secs {
        settings.repos.sync_timeout = Duration::from_secs(secs);
    }
    if let Some(size) = opts.cli_max_file_size {
        settings.repos.max_file_size = size;
    }
    if let Some(max) = opts.cli_max_results {
        settings.repos.max_results = max;
    }

    settings.transport = Transport::parse(&transport)
        .with_context(|| format!("transport must be 'stdio' or 'http', got: {transport}"))?;
    settings.repos.base_dir = expand_home(&settings.repos.base_dir);
    settings.auth.validate().context("invalid auth configuration")?;
    settings
        .repos
        .validate()
        .context("invalid repository configuration")?;

    Ok(settings)
}

fn apply_config_file(settings: &mut ServerSettings, transport: &mut String, value: &toml::Value) {
    if let Some(t) = value.get("transport").and_then(|v| v.as_str()) {
        *transport = t.to_string();
    }
    if let Some(host) = value.get("host").and_then(|v| v.as_str()) {
        settings.host = host.to_string();
    }
    if let Some(port) = value.get("port").and_then(|v| v.as_integer()) {
        settings.port = port as u16;
    }

    if let Some(auth) = value.get("auth") {
        if let Some(t) = auth.get("type").and_then(|v| v.as_str()) {
            settings.auth.auth_type = t.to_string();
        }
        if let Some(user) = auth.get("username").and_then(|v| v.as_str()) {
            settings.auth.username = user.to_string();
        }
        if let Some(pass) = auth.get("password").and_then(|v| v.as_str()) {
            settings.auth.password = pass.to_string();
        }
        if let Some(keys) = auth.get("api_keys").and_then(|v| v.as_array()) {
            settings.auth.api_keys = clean_list(
                keys.iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect(),
            );
        }
    }

    let Some(repos) = value.get("repos") else {
        return;
    };
    if let Some(enabled) = repos.get("enabled").and_then(|v| v.as_bool()) {
        settings.repos.enabled = enabled;
    }
    if let Some(urls) = repos.get("urls").and_then(|v| v.as_array()) {
        settings.repos.urls = clean_list(
            urls.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
        );
    }
    if let Some(dir) = repos.get("base_dir").and_then(|v| v.as_str()) {
        settings.repos.base_dir = PathBuf::from(dir);
    }
    if let Some(secs) = repos.get("sync_interval_secs").and_then(|v| v.as_integer()) {
        settings.repos.sync_interval = Duration::from_secs(secs as u64);
    }
    if let Some(secs) = repos.get("sync_timeout_secs").and_then(|v| v.as_integer()) {
        settings.repos.sync_timeout = Duration::from_secs(secs as u64);
    }
    if let Some(size) = repos.get("max_file_size").and_then(|v| v.as_integer()) {
        settings.repos.max_file_size = size as u64;
    }
    if let Some(max) = repos.get("max_results").and_then(|v| v.as_integer()) {
        settings.repos.max_results = max as usize;
    }
}

/// Environment overrides. Unparseable values are ignored so a stray
/// variable cannot take the server down.
fn apply_env(settings: &mut ServerSettings, transport: &mut String) {
    let var = |suffix: &str| std::env::var(format!("{ENV_PREFIX}_{suffix}")).ok();

    if let Some(t) = var("TRANSPORT") {
        *transport = t;
    }
    if let Some(host) = var("HOST") {
        settings.host = host;
    }
    if let Some(port) = var("PORT").and_then(|v| v.parse().ok()) {
        settings.port = port;
    }
    if let Some(t) = var("AUTH_TYPE") {
        settings.auth.auth_type = t;
    }
    if let Some(user) = var("AUTH_USERNAME") {
        settings.auth.username = user;
    }
    if let Some(pass) = var("AUTH_PASSWORD") {
        settings.auth.password = pass;
    }
    if let Some(keys) = var("AUTH_API_KEYS") {
        settings.auth.api_keys = clean_list(keys.split(',').map(str::to_string).collect());
    }
    if let Some(enabled) = var("REPOS_ENABLED").and_then(|v| v.parse().ok()) {
        settings.repos.enabled = enabled;
    }
    if let Some(urls) = var("REPOS_URLS") {
        settings.repos.urls = clean_list(urls.split(',').map(str::to_string).collect());
    }
    if let Some(dir) = var("REPOS_BASE_DIR") {
        settings.repos.base_dir = PathBuf::from(dir);
    }
    if let Some(secs) = var("REPOS_SYNC_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        settings.repos.sync_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = var("REPOS_SYNC_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.repos.sync_timeout = Duration::from_secs(secs);
    }
    if let Some(size) = var("REPOS_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
        settings.repos.max_file_size = size;
    }
    if let Some(max) = var("REPOS_MAX_RESULTS").and_then(|v| v.parse().ok()) {
        settings.repos.max_results = max;
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn default_base_dir() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".reposcope"),
        None => PathBuf::from(".reposcope"),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        return home_dir().unwrap_or_else(|| path.to_path_buf());
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for suffix in [
            "TRANSPORT",
            "HOST",
            "PORT",
            "AUTH_TYPE",
            "AUTH_USERNAME",
            "AUTH_PASSWORD",
            "AUTH_API_KEYS",
            "REPOS_ENABLED",
            "REPOS_URLS",
            "REPOS_BASE_DIR",
            "REPOS_SYNC_INTERVAL_SECS",
            "REPOS_SYNC_TIMEOUT_SECS",
            "REPOS_MAX_FILE_SIZE",
            "REPOS_MAX_RESULTS",
        ] {
            std::env::remove_var(format!("{ENV_PREFIX}_{suffix}"));
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_any_source() {
        clear_env();
        let settings = load_settings(MergeOpts::default()).unwrap();
        assert_eq!(settings.transport, Transport::Stdio);
        assert_eq!(settings.port, 8080);
        assert!(!settings.repos.enabled);
        assert_eq!(settings.repos.max_results, 20);
    }

    #[test]
    #[serial]
    fn file_env_cli_precedence() {
        clear_env();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"
transport = "http"
port = 9000

[repos]
enabled = true
urls = ["git@github.com:file/repo.git"]
base_dir = "/tmp/from-file"
max_results = 5
"#,
        )
        .unwrap();

        std::env::set_var("REPOSCOPE_PORT", "9001");
        std::env::set_var("REPOSCOPE_REPOS_MAX_RESULTS", "7");

        let opts = MergeOpts {
            config_path: Some(file.path().to_path_buf()),
            cli_port: Some(9002),
            ..MergeOpts::default()
        };
        let settings = load_settings(opts).unwrap();

        // CLI beats env beats file.
        assert_eq!(settings.port, 9002);
        assert_eq!(settings.repos.max_results, 7);
        assert_eq!(settings.transport, Transport::Http);
        assert_eq!(settings.repos.base_dir, PathBuf::from("/tmp/from-file"));

        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_env_values_are_ignored() {
        clear_env();
        std::env::set_var("REPOSCOPE_PORT", "not-a-number");
        std::env::set_var("REPOSCOPE_REPOS_MAX_RESULTS", "also-bad");

        let settings = load_settings(MergeOpts::default()).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.repos.max_results, 20);

        clear_env();
    }

    #[test]
    #[serial]
    fn env_urls_are_comma_separated_and_trimmed() {
        clear_env();
        std::env::set_var(
            "REPOSCOPE_REPOS_URLS",
            "git@github.com:a/one.git, git@github.com:b/two.git ,,",
        );

        let settings = load_settings(MergeOpts::default()).unwrap();
        assert_eq!(
            settings.repos.urls,
            vec![
                "git@github.com:a/one.git".to_string(),
                "git@github.com:b/two.git".to_string()
            ]
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn auth_settings_merge_and_validate() {
        clear_env();
        std::env::set_var("REPOSCOPE_AUTH_TYPE", "apikey");
        std::env::set_var("REPOSCOPE_AUTH_API_KEYS", "k1, k2,");

        let settings = load_settings(MergeOpts::default()).unwrap();
        assert_eq!(settings.auth.auth_type, "apikey");
        assert_eq!(
            settings.auth.api_keys,
            vec!["k1".to_string(), "k2".to_string()]
        );

        // Conflicting config is fatal: apikey type plus basic creds.
        let opts = MergeOpts {
            cli_auth_username: Some("admin".to_string()),
            ..MergeOpts::default()
        };
        assert!(load_settings(opts).is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn enabled_without_urls_is_rejected() {
        clear_env();
        let opts = MergeOpts {
            cli_repos_enabled: Some(true),
            cli_repos_base_dir: Some(PathBuf::from("/tmp/base")),
            ..MergeOpts::default()
        };
        assert!(load_settings(opts).is_err());
    }

    #[test]
    #[serial]
    fn unknown_transport_is_rejected() {
        clear_env();
        let opts = MergeOpts {
            cli_transport: Some("sse".to_string()),
            ..MergeOpts::default()
        };
        assert!(load_settings(opts).is_err());
    }

    #[test]
    #[serial]
    fn tilde_base_dir_expands_to_home() {
        clear_env();
        let home = tempfile::tempdir().unwrap();
        let old_home = std::env::var_os("HOME");
        std::env::set_var("HOME", home.path());

        let opts = MergeOpts {
            cli_repos_base_dir: Some(PathBuf::from("~/.reposcope-test")),
            ..MergeOpts::default()
        };
        let settings = load_settings(opts).unwrap();
        assert_eq!(settings.repos.base_dir, home.path().join(".reposcope-test"));

        match old_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }
    }
}
