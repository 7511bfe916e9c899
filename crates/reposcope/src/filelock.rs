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

//! Advisory exclusive file lock used for multi-process sync coordination.
//!
//! The kernel releases the lock when the process exits, so no stale-lock
//! recovery is needed. Timed acquisition polls a non-blocking `flock`
//! with exponential backoff instead of issuing a blocking syscall: the
//! poll loop is what lets acquisition honor cancellation.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock acquisition timed out")]
    Timeout,
    #[error("lock acquisition cancelled")]
    Cancelled,
    #[error("lock file error: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive whole-file lock backed by `flock(2)`.
///
/// Safe for coordination between processes sharing a base directory. The
/// lock is held for as long as the file handle stays open; any failure
/// path closes the handle.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    /// Creates a lock at `path`. The file and its parent directories are
    /// created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `Ok(true)` when acquired, `Ok(false)` when held by another
    /// process. Errors are reserved for unexpected failures, never for
    /// contention.
    pub fn try_lock(&mut self) -> Result<bool, LockError> {
        self.ensure_open()?;
        let file = self.file.as_ref().expect("lock file opened above");
        match file.try_lock_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if is_contended(&e) => {
                self.file = None;
                Ok(false)
            }
            Err(e) => {
                self.file = None;
                Err(LockError::Io(e))
            }
        }
    }

    /// Acquires the lock, waiting up to `timeout`.
    pub async fn lock(&mut self, timeout: Duration) -> Result<(), LockError> {
        self.lock_with_cancel(&CancellationToken::new(), timeout)
            .await
    }

    /// Acquires the lock, waiting up to `timeout` or until `cancel` fires.
    pub async fn lock_with_cancel(
        &mut self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), LockError> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        let mut poll_interval = INITIAL_POLL_INTERVAL;

        loop {
            if cancel.is_cancelled() {
                self.file = None;
                return Err(LockError::Cancelled);
            }
            if Instant::now() >= deadline {
                self.file = None;
                return Err(LockError::Timeout);
            }

            let file = self.file.as_ref().expect("lock file opened above");
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if is_contended(&e) => {}
                Err(e) => {
                    self.file = None;
                    return Err(LockError::Io(e));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.file = None;
                    return Err(LockError::Cancelled);
                }
                _ = tokio::time::sleep(poll_interval) => {
                    poll_interval = (poll_interval * 2).min(MAX_POLL_INTERVAL);
                }
            }
        }
    }

    /// Releases the lock. A no-op when not held.
    pub fn unlock(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)?;
        }
        Ok(())
    }

    /// Returns true while this instance holds the lock.
    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&mut self) -> Result<(), LockError> {
        if self.file.is_some() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
