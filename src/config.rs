//! Configuration file support for gemset
//!
//! Reads configuration from `~/.config/gemset/config.json`:
//!
//! ```json
//! {
//!   "gem_caches": ["/srv/gems/cache"],
//!   "download_cache": "/var/cache/gemset",
//!   "tools": {
//!     "nix_prefetch_url": "/run/current-system/sw/bin/nix-prefetch-url"
//!   }
//! }
//! ```

use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine config directory. HOME environment variable not set.")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Executables used for hashing and for reading a previous gemset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub nix_prefetch_url: String,
    pub nix_prefetch_git: String,
    pub nix_hash: String,
    pub nix_instantiate: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            nix_prefetch_url: "nix-prefetch-url".to_string(),
            nix_prefetch_git: "nix-prefetch-git".to_string(),
            nix_hash: "nix-hash".to_string(),
            nix_instantiate: "nix-instantiate".to_string(),
        }
    }
}

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Extra directories searched for `.gem` files before downloading
    #[serde(default)]
    pub gem_caches: Vec<PathBuf>,

    /// Where downloaded artifacts are kept (default: `~/.cache/gemset`)
    #[serde(default)]
    pub download_cache: Option<PathBuf>,

    #[serde(default)]
    pub tools: Tools,
}

impl Config {
    /// Load configuration from the default path or return defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;
        Self::load_from(path)
    }

    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::ParseError { path, source })
    }

    /// Directories searched for `.gem` files before downloading: the
    /// project's `vendor/cache`, `$GEM_HOME/cache`, each `$GEM_PATH` entry's
    /// `cache`, then `gem_caches`. Missing directories are left out.
    pub fn local_gem_caches(&self, project_root: &Path) -> Vec<PathBuf> {
        let gem_home = std::env::var_os("GEM_HOME");
        let gem_path = std::env::var_os("GEM_PATH");
        gem_cache_dirs(
            project_root,
            gem_home.as_deref(),
            gem_path.as_deref(),
            &self.gem_caches,
        )
    }
}

fn gem_cache_dirs(
    project_root: &Path,
    gem_home: Option<&OsStr>,
    gem_path: Option<&OsStr>,
    extra: &[PathBuf],
) -> Vec<PathBuf> {
    let mut candidates = vec![project_root.join("vendor").join("cache")];
    if let Some(home) = gem_home {
        candidates.push(PathBuf::from(home).join("cache"));
    }
    if let Some(paths) = gem_path {
        candidates.extend(std::env::split_paths(paths).map(|p| p.join("cache")));
    }
    candidates.extend(extra.iter().cloned());

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in candidates {
        if dir.is_dir() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Returns the config file path: `~/.config/gemset/config.json`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    // Use XDG_CONFIG_HOME if set, otherwise fall back to ~/.config
    let config_base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".config"))
                .unwrap_or_default()
        });

    if config_base.as_os_str().is_empty() {
        return Err(ConfigError::NoConfigDir);
    }

    Ok(config_base.join("gemset").join("config.json"))
}
