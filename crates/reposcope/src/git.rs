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

//! Thin wrapper over the external `git` executable.
//!
//! All invocations go through the [`CommandExecutor`] seam so tests can
//! inject a scripted executor instead of spawning processes.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Executes external commands. The sole seam used by tests to mock git.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `program` with `args` in `dir` (when given) and returns its
    /// stdout. A failed command becomes an error carrying trimmed stderr.
    async fn run(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Result<Vec<u8>>;
}

/// Production executor backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so cancelling the calling
/// future (timeout, shutdown) also aborts the subprocess.
#[derive(Debug, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Result<Vec<u8>> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn {program}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                anyhow::bail!("{program} exited with {}", output.status);
            }
            anyhow::bail!("{program} exited with {}: {stderr}", output.status);
        }

        Ok(output.stdout)
    }
}

/// Client for the git operations the sync orchestrator needs.
#[derive(Clone)]
pub struct GitClient {
    executor: Arc<dyn CommandExecutor>,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    pub fn new() -> Self {
        Self {
            executor: Arc::new(SystemExecutor),
        }
    }

    /// Builds a client around a custom executor (tests).
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Shallow, single-branch clone.
    pub async fn clone_repo(&self, url: &str, dest_dir: &Path) -> Result<()> {
        let dest = dest_dir.to_string_lossy();
        self.executor
            .run(
                None,
                "git",
                &["clone", "--depth", "1", "--single-branch", url, &dest],
            )
            .await
            .context("git clone failed")?;
        Ok(())
    }

    /// Shallow fetch from origin.
    pub async fn fetch(&self, repo_dir: &Path) -> Result<()> {
        self.executor
            .run(Some(repo_dir), "git", &["fetch", "--depth", "1"])
            .await
            .context("git fetch failed")?;
        Ok(())
    }

    /// Hard reset of the working tree to `origin/HEAD`.
    pub async fn reset(&self, repo_dir: &Path) -> Result<()> {
        self.executor
            .run(Some(repo_dir), "git", &["reset", "--hard", "origin/HEAD"])
            .await
            .context("git reset failed")?;
        Ok(())
    }

    /// Current HEAD commit identifier, trimmed.
    pub async fn head_commit(&self, repo_dir: &Path) -> Result<String> {
        let out = self
            .executor
            .run(Some(repo_dir), "git", &["rev-parse", "HEAD"])
            .await
            .context("git rev-parse failed")?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// Paths changed between two commits, relative to the repository
    /// root. Blank lines are filtered out.
    pub async fn changed_files(
        &self,
        repo_dir: &Path,
        from_commit: &str,
        to_commit: &str,
    ) -> Result<Vec<String>> {
        let range = format!("{from_commit}..{to_commit}");
        let out = self
            .executor
            .run(Some(repo_dir), "git", &["diff", "--name-only", &range])
            .await
            .context("git diff failed")?;

        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Default branch name. Tries the remote symbolic ref, then falls
    /// back to probing `origin/main` and `origin/master`.
    pub async fn default_branch(&self, repo_dir: &Path) -> Result<String> {
        if let Ok(out) = self
            .executor
            .run(
                Some(repo_dir),
                "git",
                &["symbolic-ref", "refs/remotes/origin/HEAD"],
            )
            .await
        {
            // Output looks like "refs/remotes/origin/main".
            let text = String::from_utf8_lossy(&out);
            if let Some(name) = text.trim().rsplit('/').next() {
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }

        for candidate in ["main", "master"] {
            let verify = format!("origin/{candidate}");
            if self
                .executor
                .run(Some(repo_dir), "git", &["rev-parse", "--verify", &verify])
                .await
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }

        anyhow::bail!("could not determine default branch")
    }

    /// Non-fatal probe: is `dir` inside a git repository?
    pub async fn is_repository(&self, dir: &Path) -> bool {
        self.executor
            .run(Some(dir), "git", &["rev-parse", "--git-dir"])
            .await
            .is_ok()
    }

    /// Removes untracked files and directories.
    pub async fn clean(&self, repo_dir: &Path) -> Result<()> {
        self.executor
            .run(Some(repo_dir), "git", &["clean", "-fdx"])
            .await
            .context("git clean failed")?;
        Ok(())
    }
}
