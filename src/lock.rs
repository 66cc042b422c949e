//! Advisory locking around download cache population
//!
//! Two gemset runs racing on the same artifact would otherwise both download
//! it. The first one to take `<entry>.lock` downloads; the other waits and
//! then finds the entry already populated.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long to wait for another process to finish a download
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to create lock file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Timed out after {timeout_secs}s waiting for lock on {path}")]
    Timeout { path: PathBuf, timeout_secs: u64 },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Exclusive hold on a download cache entry, released on drop.
pub struct EntryLock {
    _file: File,
    path: PathBuf,
}

impl EntryLock {
    /// Block until the lock is free or `timeout` elapses.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(lock_path)? {
                return Ok(lock);
            }
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: lock_path.to_path_buf(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL.min(timeout));
        }
    }

    /// `Ok(None)` when another holder has the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, LockError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Create {
                path: lock_path.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|source| LockError::Create {
                path: lock_path.to_path_buf(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(EntryLock {
                _file: file,
                path: lock_path.to_path_buf(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            // EAGAIN / EACCES on some unix flavours
            Err(e) if matches!(e.raw_os_error(), Some(11) | Some(13)) => Ok(None),
            Err(source) => Err(LockError::Lock {
                path: lock_path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `<entry>.lock` next to the cache entry.
pub fn lock_path_for(entry: &Path) -> PathBuf {
    let mut lock_path = entry.as_os_str().to_owned();
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}
