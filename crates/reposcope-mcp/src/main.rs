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

mod auth;
mod http;
mod server;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reposcope::RepoService;
use settings::{load_settings, MergeOpts};

/// MCP server exposing code search and reads over indexed git repos.
#[derive(Parser, Debug)]
#[command(name = "reposcope-mcp", version)]
struct Opts {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Transport: "stdio" or "http".
    #[arg(long)]
    transport: Option<String>,
    /// Listen host for the http transport.
    #[arg(long)]
    host: Option<String>,
    /// Listen port for the http transport.
    #[arg(long)]
    port: Option<u16>,
    /// Authentication for the http transport: "none", "basic", "apikey".
    #[arg(long)]
    auth_type: Option<String>,
    /// Username for basic auth.
    #[arg(long)]
    auth_username: Option<String>,
    /// Password for basic auth.
    #[arg(long)]
    auth_password: Option<String>,
    /// Comma-separated API keys for apikey auth.
    #[arg(long)]
    auth_api_keys: Option<String>,
    /// Enable repository indexing.
    #[arg(long)]
    repos_enabled: Option<bool>,
    /// Comma-separated SSH repository URLs.
    #[arg(long)]
    repos_urls: Option<String>,
    /// Base directory for working trees, indexes, and the manifest.
    #[arg(long)]
    repos_base_dir: Option<PathBuf>,
    /// Sync interval in seconds.
    #[arg(long)]
    repos_sync_interval_secs: Option<u64>,
    /// Follower lock-wait bound in seconds.
    #[arg(long)]
    repos_sync_timeout_secs: Option<u64>,
    /// Max file size in bytes for indexing and reading.
    #[arg(long)]
    repos_max_file_size: Option<u64>,
    /// Cap on search results returned.
    #[arg(long)]
    repos_max_results: Option<usize>,
}

impl Opts {
    fn into_merge_opts(self) -> MergeOpts {
        MergeOpts {
            config_path: self.config,
            cli_transport: self.transport,
            cli_host: self.host,
            cli_port: self.port,
            cli_auth_type: self.auth_type,
            cli_auth_username: self.auth_username,
            cli_auth_password: self.auth_password,
            cli_auth_api_keys: self
                .auth_api_keys
                .map(|keys| keys.split(',').map(str::to_string).collect()),
            cli_repos_enabled: self.repos_enabled,
            cli_repos_urls: self
                .repos_urls
                .map(|urls| urls.split(',').map(str::to_string).collect()),
            cli_repos_base_dir: self.repos_base_dir,
            cli_sync_interval_secs: self.repos_sync_interval_secs,
            cli_sync_timeout_secs: self.repos_sync_timeout_secs,
            cli_max_file_size: self.repos_max_file_size,
            cli_max_results: self.repos_max_results,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr: stdout belongs to the stdio transport.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let settings = load_settings(opts.into_merge_opts())?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting reposcope-mcp");

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let service = if settings.repos.enabled {
        // Construction failures (bad configuration, unusable base dir)
        // are fatal. A failed initial sync is not: the server comes up
        // without the tools rather than not at all.
        let service = Arc::new(RepoService::new(settings.repos.clone())?);
        match service.initialize(&cancel).await {
            Ok(()) => Some(service),
            Err(e) => {
                error!(error = format!("{e:#}"), "repository initialization failed");
                service.close();
                None
            }
        }
    } else {
        info!("repository indexing disabled");
        None
    };

    let result = match settings.transport {
        settings::Transport::Stdio => server::serve_stdio(service.clone()).await,
        settings::Transport::Http => http::serve_http(&settings, service.clone()).await,
    };

    if let Some(service) = service {
        service.close();
    }

    result
}
