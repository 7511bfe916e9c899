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

//! Sync orchestration: leader/follower election over the process lock,
//! parallel per-repository syncs, stale-repo garbage collection, and the
//! readiness gate for the shared read alias.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::filelock::{FileLock, LockError};
use crate::filter::FileFilter;
use crate::git::{CommandExecutor, GitClient};
use crate::indexer::Indexer;
use crate::manifest::{Manifest, RepoState, MANIFEST_FILENAME};
use crate::repourl::url_to_repo_id;
use crate::search::IndexAlias;
use crate::settings::RepoSettings;

/// Name of the coordination lock file inside the base directory.
pub const LOCK_FILENAME: &str = "sync.lock";

/// Cap on concurrent repository syncs. This is the sole backpressure
/// mechanism for outbound bandwidth and disk-write pressure.
pub const MAX_PARALLEL_SYNCS: usize = 4;

#[derive(Default)]
struct ServiceState {
    alias: Option<Arc<IndexAlias>>,
    ready: bool,
}

/// Coordinates git operations, indexing, and the search surface.
///
/// Exactly one process (the leader, elected by non-blocking lock
/// acquisition) writes working trees and indexes; every other process
/// waits bounded by the sync timeout and then opens the on-disk indexes
/// read-only.
pub struct RepoService {
    settings: RepoSettings,
    git: GitClient,
    indexer: Arc<Indexer>,
    manifest: Arc<Manifest>,
    lock: tokio::sync::Mutex<FileLock>,
    state: RwLock<ServiceState>,
}

impl RepoService {
    /// Builds a service over the configured base directory, creating the
    /// `repos/` and `indexes/` subdirectories and loading the manifest.
    /// Invalid settings are fatal here.
    pub fn new(settings: RepoSettings) -> Result<Self> {
        Self::with_git_client(settings, GitClient::new())
    }

    /// Like [`RepoService::new`] but with an injected command executor,
    /// the seam integration tests use to script git behavior.
    pub fn with_executor(
        settings: RepoSettings,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        Self::with_git_client(settings, GitClient::with_executor(executor))
    }

    fn with_git_client(settings: RepoSettings, git: GitClient) -> Result<Self> {
        settings.validate().context("invalid configuration")?;

        std::fs::create_dir_all(&settings.base_dir)
            .context("failed to create base directory")?;
        std::fs::create_dir_all(settings.base_dir.join("repos"))
            .context("failed to create repos directory")?;
        std::fs::create_dir_all(settings.base_dir.join("indexes"))
            .context("failed to create indexes directory")?;

        let manifest_path = settings.base_dir.join(MANIFEST_FILENAME);
        let manifest =
            Arc::new(Manifest::load(&manifest_path).context("failed to load manifest")?);

        let filter = FileFilter::new(settings.max_file_size);
        let indexer = Arc::new(Indexer::new(&settings.base_dir, filter));
        let lock = FileLock::new(settings.base_dir.join(LOCK_FILENAME));

        Ok(Self {
            settings,
            git,
            indexer,
            manifest,
            lock: tokio::sync::Mutex::new(lock),
            state: RwLock::new(ServiceState::default()),
        })
    }

    /// Leader/follower initialization.
    ///
    /// The leader (non-blocking lock winner) syncs all repositories,
    /// persists the manifest, and releases the lock. A follower waits up
    /// to the sync timeout for the leader to finish; on timeout it
    /// proceeds anyway with whatever indexes exist. Both paths end by
    /// opening the on-disk indexes read-only.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        {
            let mut lock = self.lock.lock().await;
            let acquired = lock.try_lock().context("failed to acquire sync lock")?;

            if acquired {
                info!("acquired sync leader lock, starting sync");
                if let Err(e) = self.sync_all(cancel).await {
                    error!(error = %e, "sync failed");
                }
                if let Err(e) = self.save_manifest() {
                    error!(error = %e, "failed to save manifest");
                }
                if let Err(e) = lock.unlock() {
                    error!(error = %e, "failed to release sync lock");
                }
            } else {
                info!("another instance is syncing, waiting for completion");
                match lock
                    .lock_with_cancel(cancel, self.settings.sync_timeout)
                    .await
                {
                    Ok(()) => {
                        // The leader finished; we never had write work.
                        if let Err(e) = lock.unlock() {
                            error!(error = %e, "failed to release sync lock");
                        }
                    }
                    Err(LockError::Timeout) => {
                        warn!("timeout waiting for sync, using existing indexes");
                    }
                    Err(e) => return Err(e).context("failed waiting for sync leader"),
                }
            }
        }

        self.open_indexes()
    }

    /// Synchronizes every configured repository, at most
    /// [`MAX_PARALLEL_SYNCS`] at a time. Individual failures are recorded
    /// on the repository's manifest record and never abort other repos;
    /// a summary error is returned when any repo failed.
    pub async fn sync_all(&self, cancel: &CancellationToken) -> Result<()> {
        let urls = &self.settings.urls;
        if urls.is_empty() {
            return Ok(());
        }

        for repo_id in self.manifest.remove_stale_repos(urls) {
            info!(repo_id = %repo_id, "removing stale repository");
            if let Err(e) = self.indexer.delete_index(&repo_id) {
                error!(repo_id = %repo_id, error = %e, "failed to delete stale index");
            }
            let repo_dir = self.repo_dir(&repo_id);
            if repo_dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&repo_dir) {
                    error!(repo_id = %repo_id, error = %e, "failed to remove stale repo directory");
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_SYNCS));
        let mut tasks: JoinSet<Option<String>> = JoinSet::new();

        for url in urls.clone() {
            let repo_id = url_to_repo_id(&url);
            let git = self.git.clone();
            let indexer = Arc::clone(&self.indexer);
            let manifest = Arc::clone(&self.manifest);
            let base_dir = self.settings.base_dir.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match sync_repo(&git, &indexer, &manifest, &base_dir, &repo_id, &url, &cancel)
                    .await
                {
                    Ok(()) => {
                        manifest.clear_repo_error(&repo_id);
                        None
                    }
                    Err(e) => {
                        error!(repo_id = %repo_id, error = format!("{e:#}"), "failed to sync repository");
                        manifest.set_repo_error(&repo_id, &format!("{e:#}"));
                        Some(repo_id)
                    }
                }
            });
        }

        let mut failures = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(_failed_repo)) => failures += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "sync task panicked");
                    failures += 1;
                }
            }
        }

        self.manifest.update_last_sync();

        if failures > 0 {
            anyhow::bail!("{failures} repository sync(s) failed");
        }
        Ok(())
    }

    /// Opens the read alias over every configured repository whose index
    /// exists on disk and flips the readiness flag.
    fn open_indexes(&self) -> Result<()> {
        let indexed: Vec<String> = self
            .settings
            .urls
            .iter()
            .map(|url| url_to_repo_id(url))
            .filter(|repo_id| self.indexer.index_exists(repo_id))
            .collect();

        let mut state = self.state.write();
        if indexed.is_empty() {
            warn!("no indexes available");
            state.alias = None;
            state.ready = false;
            return Ok(());
        }

        let alias = self
            .indexer
            .create_alias(&indexed)
            .context("failed to create index alias")?;
        state.alias = Some(Arc::new(alias));
        state.ready = true;
        info!(count = indexed.len(), "indexes ready");
        Ok(())
    }

    /// True once the read alias is open.
    pub fn is_ready(&self) -> bool {
        self.state.read().ready
    }

    /// The combined read-only index surface.
    pub fn index_alias(&self) -> Result<Arc<IndexAlias>> {
        let state = self.state.read();
        match (&state.alias, state.ready) {
            (Some(alias), true) => Ok(Arc::clone(alias)),
            _ => anyhow::bail!("indexes not ready"),
        }
    }

    /// Working-tree directory for a repository.
    pub fn repo_dir(&self, repo_id: &str) -> PathBuf {
        self.settings.base_dir.join("repos").join(repo_id)
    }

    pub fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn save_manifest(&self) -> Result<()> {
        let path = self.settings.base_dir.join(MANIFEST_FILENAME);
        self.manifest.save(&path)?;
        Ok(())
    }

    /// Releases the read alias and clears readiness. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.write();
        state.alias = None;
        state.ready = false;
    }
}

/// Syncs one repository: clone or fetch, compare commits, then
/// incrementally or fully reindex as needed.
async fn sync_repo(
    git: &GitClient,
    indexer: &Arc<Indexer>,
    manifest: &Manifest,
    base_dir: &Path,
    repo_id: &str,
    url: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let repo_dir = base_dir.join("repos").join(repo_id);

    let mut state = manifest.get_repo_state(repo_id);
    let is_new = !manifest.has_repo(repo_id) || state.cloned_at.is_none();

    if is_new {
        info!(repo_id = %repo_id, url = %url, "cloning repository");
        with_cancel(cancel, git.clone_repo(url, &repo_dir))
            .await
            .context("clone failed")?;
        state.url = url.to_string();
        state.cloned_at = Some(Utc::now());
    } else {
        info!(repo_id = %repo_id, "fetching repository updates");
        with_cancel(cancel, git.fetch(&repo_dir))
            .await
            .context("fetch failed")?;
    }

    let current_commit = with_cancel(cancel, git.head_commit(&repo_dir))
        .await
        .context("failed to get HEAD commit")?;

    let needs_reindex =
        is_new || state.last_indexed.is_empty() || current_commit != state.last_commit;
    if !needs_reindex {
        info!(repo_id = %repo_id, "repository already up to date");
        return Ok(());
    }

    if !is_new {
        // Materialize the new head before diffing against it. This also
        // covers a working tree left stale by an interrupted build.
        with_cancel(cancel, git.reset(&repo_dir))
            .await
            .context("reset failed")?;

        if !state.last_commit.is_empty() {
            match with_cancel(
                cancel,
                git.changed_files(&repo_dir, &state.last_commit, &current_commit),
            )
            .await
            {
                Ok(changed) if !changed.is_empty() => {
                    info!(
                        repo_id = %repo_id,
                        changed_files = changed.len(),
                        "incremental indexing"
                    );
                    match run_incremental(indexer, repo_id, &repo_dir, changed).await {
                        Ok(indexed) => {
                            state.last_commit = current_commit.clone();
                            state.last_indexed = current_commit;
                            state.last_pull = Some(Utc::now());
                            manifest.set_repo_state(repo_id, state);
                            info!(repo_id = %repo_id, indexed, "incremental index complete");
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(
                                repo_id = %repo_id,
                                error = %e,
                                "incremental index failed, falling back to full index"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(repo_id = %repo_id, error = %e, "changed-file diff unavailable");
                }
            }
        }
    }

    info!(repo_id = %repo_id, "full indexing");
    let file_count = run_full(indexer, repo_id, &repo_dir)
        .await
        .context("full index failed")?;

    state.last_commit = current_commit.clone();
    state.last_indexed = current_commit;
    state.file_count = file_count;
    state.last_pull = Some(Utc::now());
    manifest.set_repo_state(repo_id, state);
    info!(repo_id = %repo_id, file_count, "full index complete");
    Ok(())
}

/// Index builds are filesystem- and CPU-bound; keep them off the async
/// workers.
async fn run_full(indexer: &Arc<Indexer>, repo_id: &str, repo_dir: &Path) -> Result<usize> {
    let indexer = Arc::clone(indexer);
    let repo_id = repo_id.to_string();
    let repo_dir = repo_dir.to_path_buf();
    tokio::task::spawn_blocking(move || indexer.full_index(&repo_id, &repo_dir))
        .await
        .context("index task failed")?
}

async fn run_incremental(
    indexer: &Arc<Indexer>,
    repo_id: &str,
    repo_dir: &Path,
    changed: Vec<String>,
) -> Result<usize> {
    let indexer = Arc::clone(indexer);
    let repo_id = repo_id.to_string();
    let repo_dir = repo_dir.to_path_buf();
    tokio::task::spawn_blocking(move || indexer.incremental_index(&repo_id, &repo_dir, &changed))
        .await
        .context("index task failed")?
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    operation: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => anyhow::bail!("operation cancelled"),
        result = operation => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_state_default_is_new() {
        let state = RepoState::default();
        assert!(state.cloned_at.is_none());
        assert!(state.last_indexed.is_empty());
    }
}
