//! Content hashes for gem artifacts and git revisions
//!
//! Artifacts are looked up in local gem caches first, then downloaded from
//! each remote in turn into the download cache. Hashing itself is done by the
//! Nix prefetch tools; every hash they report is re-encoded with `nix-hash`
//! into the 52-character base32 form used in the gemset.

use crate::cache::{self, CacheError, DownloadCache};
use crate::config::Tools;
use crate::download::{self, DownloadError, Downloader};
use crate::lock::{self, EntryLock, LockError};
use crate::model::LockedPackage;
use crate::platform::{self, Platform};
use crate::process::{CommandRunner, ProcessError, ToolCommand};
use crate::ruby::{RubyGemsError, SpecIndex};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Length of a sha256 digest in Nix's base32 alphabet.
pub const BASE32_HASH_LEN: usize = 52;

/// HOME seen by `nix-prefetch-git`, so it cannot read or write user state.
pub const ISOLATED_HOME: &str = "/homeless-shelter";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Command(#[from] ProcessError),

    #[error("No sha256 hash in the output of `{command}`")]
    NoHash { command: String },

    #[error("Could not find {name} in any of [{remotes}]: {cause}")]
    NoSource {
        name: String,
        remotes: String,
        cause: String,
    },

    #[error(transparent)]
    Download(DownloadError),

    #[error("No published platform of {name} matches {platform}")]
    PlatformResolution { name: String, platform: String },

    #[error(
        "Authentication is required for {host}.\nPlease supply credentials for this source. You can do this by running:\n bundle config {host} username:password"
    )]
    CredentialDenied { host: String },

    #[error(transparent)]
    Index(RubyGemsError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Cannot express {path} as a file URL")]
    FileUrl { path: PathBuf },

    #[error("Failed to store {path}: {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<DownloadError> for FetchError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::AccessDenied { host, .. } => FetchError::CredentialDenied { host },
            other => FetchError::Download(other),
        }
    }
}

impl From<RubyGemsError> for FetchError {
    fn from(err: RubyGemsError) -> Self {
        match err {
            RubyGemsError::Request {
                source: DownloadError::AccessDenied { host, .. },
                ..
            } => FetchError::CredentialDenied { host },
            other => FetchError::Index(other),
        }
    }
}

impl FetchError {
    /// Errors that explain a failure better than "not found anywhere".
    fn is_decisive(&self) -> bool {
        matches!(
            self,
            FetchError::PlatformResolution { .. } | FetchError::CredentialDenied { .. }
        )
    }
}

/// A hashed registry artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHash {
    /// The remote it came from; `None` for a local cache hit
    pub remote: Option<String>,
    pub sha256: String,
    /// Exact published platform; `None` for pure gems
    pub platform: Option<String>,
}

pub trait HashFetcher {
    fn artifact_hash(
        &self,
        package: &LockedPackage,
        remotes: &[String],
    ) -> Result<ArtifactHash, FetchError>;

    fn revision_hash(
        &self,
        url: &str,
        revision: &str,
        submodules: bool,
    ) -> Result<String, FetchError>;
}

/// First line of `output` that is exactly a base32 sha256 digest.
pub fn find_base32_hash(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| is_base32_hash(line))
}

fn is_base32_hash(text: &str) -> bool {
    text.len() == BASE32_HASH_LEN
        && text
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Tail of `nix-prefetch-git` output
#[derive(Deserialize)]
struct PrefetchGitOutput {
    sha256: String,
}

/// The JSON object `nix-prefetch-git` prints after its progress output.
fn prefetch_git_hash(output: &str) -> Option<String> {
    let start = output.rfind('{')?;
    serde_json::from_str::<PrefetchGitOutput>(output[start..].trim())
        .ok()
        .map(|parsed| parsed.sha256)
}

/// Percent-encoded `file://` URL for `path`, made absolute first.
fn file_url(path: &Path) -> Result<String, FetchError> {
    std::path::absolute(path)
        .ok()
        .and_then(|absolute| Url::from_file_path(absolute).ok())
        .map(String::from)
        .ok_or_else(|| FetchError::FileUrl {
            path: path.to_path_buf(),
        })
}

/// [`HashFetcher`] backed by the Nix prefetch tools.
pub struct NixFetcher {
    runner: Box<dyn CommandRunner>,
    downloader: Box<dyn Downloader>,
    index: Box<dyn SpecIndex>,
    cache: DownloadCache,
    local_caches: Vec<PathBuf>,
    tools: Tools,
}

impl NixFetcher {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        downloader: Box<dyn Downloader>,
        index: Box<dyn SpecIndex>,
        cache: DownloadCache,
    ) -> Self {
        Self {
            runner,
            downloader,
            index,
            cache,
            local_caches: Vec::new(),
            tools: Tools::default(),
        }
    }

    /// Directories searched for `.gem` files before any remote, in order.
    pub fn with_local_caches(mut self, dirs: Vec<PathBuf>) -> Self {
        self.local_caches = dirs;
        self
    }

    pub fn with_tools(mut self, tools: Tools) -> Self {
        self.tools = tools;
        self
    }

    fn run_for_hash(&self, command: &ToolCommand) -> Result<String, FetchError> {
        let output = self.runner.run(command)?;
        find_base32_hash(&output)
            .map(str::to_string)
            .ok_or_else(|| FetchError::NoHash {
                command: command.to_string(),
            })
    }

    /// Re-encode any sha256 representation as base32.
    fn canonicalize(&self, raw: &str) -> Result<String, FetchError> {
        let command = ToolCommand::new(&self.tools.nix_hash).args([
            "--type",
            "sha256",
            "--to-base32",
            raw,
        ]);
        self.run_for_hash(&command)
    }

    /// Hash a file on disk under a store name of `name`.
    fn prefetch_file(&self, path: &Path, name: &str) -> Result<String, FetchError> {
        let uri = file_url(path)?;
        let command = ToolCommand::new(&self.tools.nix_prefetch_url).args([
            "--type",
            "sha256",
            "--name",
            name,
            uri.as_str(),
        ]);
        let raw = self.run_for_hash(&command)?;
        self.canonicalize(&raw)
    }

    /// A `.gem` in the local caches that can stand in for `package`, with
    /// the platform token its file name carries.
    fn find_local(&self, package: &LockedPackage) -> Option<(PathBuf, Option<String>)> {
        let stem = package.name_version();

        for dir in &self.local_caches {
            if !package.is_platform_specific() {
                let path = dir.join(format!("{}.gem", stem));
                if path.is_file() {
                    return Some((path, None));
                }
                continue;
            }

            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let prefix = format!("{}-", stem);
            let mut candidates: Vec<(PathBuf, String)> = entries
                .filter_map(Result::ok)
                .filter_map(|entry| {
                    let file_name = entry.file_name().into_string().ok()?;
                    let token = file_name.strip_prefix(&prefix)?.strip_suffix(".gem")?;
                    platform::accepts(package.platform_token(), token)
                        .then(|| (entry.path(), token.to_string()))
                })
                .collect();
            candidates.sort();
            if let Some((path, token)) = candidates.into_iter().next() {
                return Some((path, Some(token)));
            }
        }
        None
    }

    /// The published platform token equal to the locked one.
    fn resolve_platform(
        &self,
        package: &LockedPackage,
        remote: &str,
    ) -> Result<String, FetchError> {
        let locked = package.platform_token();
        let published = self
            .index
            .platforms(remote, &package.name, &package.version)?;

        published
            .into_iter()
            .find(|candidate| Platform::parse_eq(candidate, locked))
            .ok_or_else(|| FetchError::PlatformResolution {
                name: package.name_version(),
                platform: locked.to_string(),
            })
    }

    fn fetch_remote(
        &self,
        package: &LockedPackage,
        remote: &str,
    ) -> Result<ArtifactHash, FetchError> {
        let platform = if package.is_platform_specific() {
            Some(self.resolve_platform(package, remote)?)
        } else {
            None
        };

        let file_name = match &platform {
            Some(platform) => format!("{}-{}.gem", package.name_version(), platform),
            None => format!("{}.gem", package.name_version()),
        };
        let url = format!("{}/gems/{}", remote.trim_end_matches('/'), file_name);

        let path = self.download_cached(&url)?;
        let sha256 = self.prefetch_file(&path, &file_name)?;

        Ok(ArtifactHash {
            remote: Some(remote.to_string()),
            sha256,
            platform,
        })
    }

    /// Download `url` into the cache unless a previous run already did.
    fn download_cached(&self, url: &str) -> Result<PathBuf, FetchError> {
        let key = download::redact(url);
        let entry = self.cache.entry_path(&key);
        if cache::is_populated(&entry) {
            debug!("using cached {}", entry.display());
            return Ok(entry);
        }

        self.cache.ensure_dir()?;
        let _lock = EntryLock::acquire(&lock::lock_path_for(&entry), lock::DEFAULT_TIMEOUT)?;

        // populated by another process while we waited
        if cache::is_populated(&entry) {
            return Ok(entry);
        }

        let partial = self.cache.partial_path(&key);
        if let Err(err) = self.downloader.download(url, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(err.into());
        }
        fs::rename(&partial, &entry).map_err(|source| FetchError::Store {
            path: entry.clone(),
            source,
        })?;

        Ok(entry)
    }
}

impl HashFetcher for NixFetcher {
    fn artifact_hash(
        &self,
        package: &LockedPackage,
        remotes: &[String],
    ) -> Result<ArtifactHash, FetchError> {
        if let Some((path, platform)) = self.find_local(package) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.gem", package.full_name()));
            match self.prefetch_file(&path, &name) {
                Ok(sha256) => {
                    debug!("{} hashed from {}", package, path.display());
                    return Ok(ArtifactHash {
                        remote: None,
                        sha256,
                        platform,
                    });
                }
                Err(err) => warn!("ignoring local artifact {}: {}", path.display(), err),
            }
        }

        let mut decisive: Option<FetchError> = None;
        let mut cause = String::from("no remotes configured");
        for remote in remotes {
            match self.fetch_remote(package, remote) {
                Ok(hash) => return Ok(hash),
                Err(err) => {
                    debug!(
                        "ignoring error during fetching {} from {}: {}",
                        package,
                        download::redact(remote),
                        err
                    );
                    cause = err.to_string();
                    if decisive.is_none() && err.is_decisive() {
                        decisive = Some(err);
                    }
                }
            }
        }

        Err(decisive.unwrap_or_else(|| FetchError::NoSource {
            name: package.full_name(),
            remotes: remotes
                .iter()
                .map(|r| download::redact(r))
                .collect::<Vec<_>>()
                .join(", "),
            cause,
        }))
    }

    fn revision_hash(
        &self,
        url: &str,
        revision: &str,
        submodules: bool,
    ) -> Result<String, FetchError> {
        let mut command = ToolCommand::new(&self.tools.nix_prefetch_git).args([
            "--url", url, "--rev", revision, "--hash", "sha256",
        ]);
        if submodules {
            command = command.arg("--fetch-submodules");
        }
        let command = command.env("HOME", ISOLATED_HOME);

        let output = self.runner.run(&command)?;
        let raw = prefetch_git_hash(&output).ok_or_else(|| FetchError::NoHash {
            command: command.to_string(),
        })?;
        self.canonicalize(&raw)
    }
}
