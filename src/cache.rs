//! Download cache for gem artifacts
//!
//! Artifacts fetched over the network are stored flat under
//! `~/.cache/gemset/`, one file per source URL:
//! `https://rubygems.org/gems/rack-3.0.8.gem` is kept as
//! `https_rubygems_org_gems_rack-3_0_8_gem`.
//!
//! A non-empty file counts as populated, so repeat runs never touch the
//! network for an artifact they already have.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cannot determine cache directory. HOME environment variable not set.")]
    NoCacheDir,

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Returns the base cache directory: `~/.cache/gemset`
pub fn base_dir() -> Result<PathBuf, CacheError> {
    // Use XDG_CACHE_HOME if set, otherwise fall back to ~/.cache
    let cache_base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_default()
        });

    if cache_base.as_os_str().is_empty() {
        return Err(CacheError::NoCacheDir);
    }

    Ok(cache_base.join("gemset"))
}

/// Filesystem-safe name for a URL: every run of characters outside
/// `[A-Za-z0-9_-]` collapses to a single `_`.
pub fn cache_key(url: &str) -> String {
    let mut key = String::with_capacity(url.len());
    let mut in_run = false;
    for c in url.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            key.push(c);
            in_run = false;
        } else if !in_run {
            key.push('_');
            in_run = true;
        }
    }
    key
}

/// A directory of downloaded artifacts keyed by source URL.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The configured directory, or `~/.cache/gemset`.
    pub fn from_override(dir: Option<&Path>) -> Result<Self, CacheError> {
        match dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Ok(Self::new(base_dir()?)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(cache_key(url))
    }

    /// Scratch file a download is written to before it is moved into place.
    pub fn partial_path(&self, url: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.part", cache_key(url), std::process::id()))
    }
}

/// Whether a cache entry exists and is non-empty.
pub fn is_populated(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
