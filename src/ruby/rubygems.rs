//! RubyGems registry integration
//!
//! Looks up which platforms a released version was published for, so a
//! platform-specific lockfile entry can be mapped onto the exact artifact
//! name the registry serves.
//!
//! Endpoints:
//! - {remote}/api/v1/versions/{name}.json (rubygems.org and mirrors)
//! - {remote}/info/{name} (compact index, served by most private registries)

use crate::credentials::Credentials;
use crate::download::{self, DownloadError};
use crate::model::PURE_PLATFORM;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RubyGemsError {
    #[error("Failed to fetch gem versions from {remote}: {source}")]
    Request {
        remote: String,
        #[source]
        source: DownloadError,
    },

    #[error("Failed to parse RubyGems response: {0}")]
    Parse(String),
}

/// Source of published platform lists.
pub trait SpecIndex {
    /// Platform tokens published for `name` at exactly `version`.
    fn platforms(&self, remote: &str, name: &str, version: &str)
    -> Result<Vec<String>, RubyGemsError>;
}

/// Queries the RubyGems versions API of a remote.
#[derive(Debug, Clone, Default)]
pub struct RubyGemsIndex {
    credentials: Credentials,
}

impl RubyGemsIndex {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl SpecIndex for RubyGemsIndex {
    fn platforms(
        &self,
        remote: &str,
        name: &str,
        version: &str,
    ) -> Result<Vec<String>, RubyGemsError> {
        let versions = self
            .fetch(remote, &versions_url(remote, name))
            .and_then(|body| platforms_for_version(&body, version));

        match versions {
            Err(err) if !err.is_access_denied() => {
                debug!("versions API unavailable on {}: {}", remote, err);
                let body = self.fetch(remote, &info_url(remote, name))?;
                Ok(platforms_in_compact_index(&body, version))
            }
            result => result,
        }
    }
}

impl RubyGemsIndex {
    fn fetch(&self, remote: &str, url: &str) -> Result<String, RubyGemsError> {
        debug!("querying {}", download::redact(url));

        let request_error = |source| RubyGemsError::Request {
            remote: download::redact(remote),
            source,
        };
        let target = download::authorize(url, &self.credentials).map_err(request_error)?;
        let response = download::get(&target).map_err(request_error)?;

        response
            .into_body()
            .read_to_string()
            .map_err(|e| RubyGemsError::Parse(e.to_string()))
    }
}

impl RubyGemsError {
    fn is_access_denied(&self) -> bool {
        matches!(
            self,
            RubyGemsError::Request {
                source: DownloadError::AccessDenied { .. },
                ..
            }
        )
    }
}

fn versions_url(remote: &str, name: &str) -> String {
    format!("{}/api/v1/versions/{}.json", remote.trim_end_matches('/'), name)
}

fn info_url(remote: &str, name: &str) -> String {
    format!("{}/info/{}", remote.trim_end_matches('/'), name)
}

/// Platforms of `version` in a compact index `info` file, whose lines read
/// `<version>[-<platform>] <deps>|<requirements>` after a `---` header.
fn platforms_in_compact_index(body: &str, version: &str) -> Vec<String> {
    body.lines()
        .filter(|line| !line.is_empty() && *line != "---")
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|token| match token.split_once('-') {
            Some((number, platform)) => (number == version).then(|| platform.to_string()),
            None => (token == version).then(pure_platform),
        })
        .collect()
}

/// One release in the versions API response
#[derive(Deserialize)]
struct VersionEntry {
    number: String,
    #[serde(default = "pure_platform")]
    platform: String,
}

fn pure_platform() -> String {
    PURE_PLATFORM.to_string()
}

fn platforms_for_version(body: &str, version: &str) -> Result<Vec<String>, RubyGemsError> {
    let entries: Vec<VersionEntry> =
        serde_json::from_str(body).map_err(|e| RubyGemsError::Parse(e.to_string()))?;

    Ok(entries
        .into_iter()
        .filter(|entry| entry.number == version)
        .map(|entry| entry.platform)
        .collect())
}
