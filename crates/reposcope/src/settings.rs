//! Configuration consumed by the sync orchestrator. How the values arrive
//! (file, environment, CLI) is the embedding binary's concern.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("repository indexing requires at least one repository URL")]
    NoUrls,
    #[error("sync interval must be positive")]
    NonPositiveSyncInterval,
    #[error("sync timeout must be positive")]
    NonPositiveSyncTimeout,
    #[error("max file size must be positive")]
    NonPositiveMaxFileSize,
    #[error("max results must be positive")]
    NonPositiveMaxResults,
    #[error("base directory cannot be empty")]
    EmptyBaseDir,
}

/// Settings for repository indexing and search.
#[derive(Debug, Clone)]
pub struct RepoSettings {
    /// When false, no core machinery runs.
    pub enabled: bool,
    /// Ordered set of SSH repository URLs.
    pub urls: Vec<String>,
    /// Root of the on-disk layout (working trees, indexes, manifest, lock).
    pub base_dir: PathBuf,
    /// Consulted by the manifest's sync check; there is no automatic
    /// trigger inside the core.
    pub sync_interval: Duration,
    /// How long a follower waits for the leader before opening whatever
    /// indexes exist.
    pub sync_timeout: Duration,
    /// Gates both indexing and reading, in bytes.
    pub max_file_size: u64,
    /// Cap on search hits returned.
    pub max_results: usize,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            urls: Vec::new(),
            base_dir: PathBuf::new(),
            sync_interval: Duration::from_secs(15 * 60),
            sync_timeout: Duration::from_secs(60),
            max_file_size: 256 * 1024,
            max_results: 20,
        }
    }
}

impl RepoSettings {
    /// Checks for configurations that are fatal at construction. Disabled
    /// settings need no validation.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.enabled {
            return Ok(());
        }
        if self.urls.is_empty() {
            return Err(SettingsError::NoUrls);
        }
        if self.sync_interval.is_zero() {
            return Err(SettingsError::NonPositiveSyncInterval);
        }
        if self.sync_timeout.is_zero() {
            return Err(SettingsError::NonPositiveSyncTimeout);
        }
        if self.max_file_size == 0 {
            return Err(SettingsError::NonPositiveMaxFileSize);
        }
        if self.max_results == 0 {
            return Err(SettingsError::NonPositiveMaxResults);
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(SettingsError::EmptyBaseDir);
        }
        Ok(())
    }
}
