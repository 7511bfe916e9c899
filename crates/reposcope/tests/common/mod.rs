//! Shared test scaffolding: a scripted git executor that materializes
//! working trees on clone, plus settings helpers.

// Each integration-test binary uses a different slice of this module.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use reposcope::git::CommandExecutor;
use reposcope::RepoSettings;

/// Scripted stand-in for the git CLI. `clone` writes the configured files
/// into the destination directory; `rev-parse HEAD` and `diff` replay the
/// configured head and change list.
#[derive(Default)]
pub struct MockGit {
    files: Mutex<Vec<(String, Vec<u8>)>>,
    head: Mutex<String>,
    changed: Mutex<Vec<String>>,
    pub clone_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
    pub fail_clone: AtomicBool,
}

impl MockGit {
    pub fn new(head: &str, files: &[(&str, &[u8])]) -> Arc<Self> {
        let mock = Self::default();
        *mock.head.lock() = head.to_string();
        *mock.files.lock() = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_vec()))
            .collect();
        Arc::new(mock)
    }

    pub fn set_head(&self, head: &str) {
        *self.head.lock() = head.to_string();
    }

    pub fn set_changed(&self, changed: &[&str]) {
        *self.changed.lock() = changed.iter().map(|s| s.to_string()).collect();
    }

    fn write_tree(&self, dest: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dest)?;
        for (rel, content) in self.files.lock().iter() {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for MockGit {
    async fn run(&self, _dir: Option<&Path>, _program: &str, args: &[&str]) -> Result<Vec<u8>> {
        match args.first().copied() {
            Some("clone") => {
                self.clone_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_clone.load(Ordering::SeqCst) {
                    anyhow::bail!("git clone failed: fatal: could not read from remote repository");
                }
                let dest = PathBuf::from(args[args.len() - 1]);
                self.write_tree(&dest)?;
                Ok(Vec::new())
            }
            Some("fetch") => {
                self.fetch_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
            Some("reset") => {
                self.reset_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
            Some("rev-parse") => Ok(format!("{}\n", self.head.lock()).into_bytes()),
            Some("diff") => {
                let mut out = self.changed.lock().join("\n");
                out.push('\n');
                Ok(out.into_bytes())
            }
            _ => Ok(Vec::new()),
        }
    }
}

pub const TEST_URL: &str = "git@github.com:test/repo.git";
pub const TEST_REPO_ID: &str = "github.com_test_repo";
pub const TEST_DISPLAY: &str = "github.com/test/repo";

pub fn test_settings(base_dir: &Path) -> RepoSettings {
    RepoSettings {
        enabled: true,
        urls: vec![TEST_URL.to_string()],
        base_dir: base_dir.to_path_buf(),
        sync_interval: Duration::from_secs(900),
        sync_timeout: Duration::from_secs(5),
        max_file_size: 256 * 1024,
        max_results: 20,
    }
}
