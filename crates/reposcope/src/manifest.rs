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

//! Durable sync state: one JSON record per repository, rewritten
//! atomically. The manifest drives incremental indexing (via the recorded
//! commit identifiers) and stale-repository garbage collection.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repourl::url_to_repo_id;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// Default manifest filename inside the base directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse manifest: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Sync state for a single repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoState {
    #[serde(default)]
    pub url: String,
    /// `None` means the repository has never been materialized locally.
    #[serde(default)]
    pub cloned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_pull: Option<DateTime<Utc>>,
    /// Head commit observed at the last sync.
    #[serde(default)]
    pub last_commit: String,
    /// Commit the on-disk index was last built against.
    #[serde(default)]
    pub last_indexed: String,
    /// Documents in the index at the last full build.
    #[serde(default)]
    pub file_count: usize,
    /// Most recent failure; empty when the last sync succeeded.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestData {
    version: u32,
    #[serde(default)]
    last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    repos: HashMap<String, RepoState>,
}

impl Default for ManifestData {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            last_sync: None,
            repos: HashMap::new(),
        }
    }
}

/// In-memory manifest with a reader-writer discipline so queries and
/// updates from concurrent sync workers interleave safely.
#[derive(Debug, Default)]
pub struct Manifest {
    inner: RwLock<ManifestData>,
}

impl Manifest {
    /// Creates a new empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a manifest from disk. A missing file yields an empty
    /// manifest; an unparseable file is an error.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let data = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(ManifestError::Io(e)),
        };
        let parsed: ManifestData = serde_json::from_slice(&data)?;
        Ok(Self {
            inner: RwLock::new(parsed),
        })
    }

    /// Writes the manifest to disk atomically: serialize to `<path>.tmp`,
    /// then rename over `path`. The temp file is removed when the rename
    /// fails.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let data = {
            let inner = self.inner.read();
            serde_json::to_vec_pretty(&*inner)?
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ManifestError::Io(e));
        }
        Ok(())
    }

    /// Returns a snapshot of the repository's state, or the default state
    /// when it is not recorded yet.
    pub fn get_repo_state(&self, repo_id: &str) -> RepoState {
        self.inner
            .read()
            .repos
            .get(repo_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_repo_state(&self, repo_id: &str, state: RepoState) {
        self.inner.write().repos.insert(repo_id.to_string(), state);
    }

    pub fn has_repo(&self, repo_id: &str) -> bool {
        self.inner.read().repos.contains_key(repo_id)
    }

    pub fn remove_repo(&self, repo_id: &str) {
        self.inner.write().repos.remove(repo_id);
    }

    pub fn get_repo_ids(&self) -> Vec<String> {
        self.inner.read().repos.keys().cloned().collect()
    }

    /// Removes every record whose key is not the repo ID of any configured
    /// URL. Returns the removed keys.
    pub fn remove_stale_repos(&self, urls: &[String]) -> Vec<String> {
        let expected: std::collections::HashSet<String> =
            urls.iter().map(|u| url_to_repo_id(u)).collect();

        let mut inner = self.inner.write();
        let removed: Vec<String> = inner
            .repos
            .keys()
            .filter(|id| !expected.contains(*id))
            .cloned()
            .collect();
        for id in &removed {
            inner.repos.remove(id);
        }
        removed
    }

    pub fn update_last_sync(&self) {
        self.inner.write().last_sync = Some(Utc::now());
    }

    /// True iff `last_sync` is unset or at least `interval` in the past.
    pub fn needs_sync_check(&self, interval: Duration) -> bool {
        match self.inner.read().last_sync {
            None => true,
            Some(last) => match Utc::now().signed_duration_since(last).to_std() {
                Ok(elapsed) => elapsed >= interval,
                // A last_sync in the future means the clock moved; wait
                // for it to catch up.
                Err(_) => false,
            },
        }
    }

    /// Repositories whose last sync recorded an error.
    pub fn get_repos_with_errors(&self) -> HashMap<String, String> {
        self.inner
            .read()
            .repos
            .iter()
            .filter(|(_, state)| !state.error.is_empty())
            .map(|(id, state)| (id.clone(), state.error.clone()))
            .collect()
    }

    pub fn clear_repo_error(&self, repo_id: &str) {
        if let Some(state) = self.inner.write().repos.get_mut(repo_id) {
            state.error.clear();
        }
    }

    /// Records a failure on the repository, creating the record when it
    /// does not exist yet.
    pub fn set_repo_error(&self, repo_id: &str, error: &str) {
        let mut inner = self.inner.write();
        inner
            .repos
            .entry(repo_id.to_string())
            .or_default()
            .error = error.to_string();
    }
}
