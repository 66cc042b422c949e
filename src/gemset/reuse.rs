//! Reusing records from a previous gemset
//!
//! Hashing is the slow part of a run, so a record from the previous gemset is
//! carried over whenever the lock still pins exactly what it describes:
//! - git gems: same revision
//! - registry gems: same version and the same set of platform variants
//! - path gems: never, they cost nothing to describe

use super::{GemsetEntry, SourceDescriptor};
use crate::model::{LockedPackage, Origin, PURE_PLATFORM};
use std::collections::BTreeMap;
use tracing::debug;

/// Previous records, kept as raw JSON until a lookup needs them.
#[derive(Debug, Clone, Default)]
pub struct GemsetCache {
    entries: BTreeMap<String, serde_json::Value>,
}

impl GemsetCache {
    pub fn new(entries: BTreeMap<String, serde_json::Value>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The previous record for these variants of one gem, if still valid.
    /// Unreadable records are treated as absent.
    pub fn lookup(&self, packages: &[&LockedPackage]) -> Option<GemsetEntry> {
        let first = packages.first()?;
        let raw = self.entries.get(&first.name)?;

        let entry: GemsetEntry = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                debug!("ignoring unreadable gemset entry {}: {}", first.name, err);
                return None;
            }
        };
        if entry.descriptors().any(SourceDescriptor::is_empty) {
            return None;
        }

        let reusable = match &first.origin {
            Origin::Git { revision, .. } => matches!(
                &entry.source,
                Some(SourceDescriptor::Git { rev, .. }) if rev == revision
            ),
            Origin::Registry { .. } => same_artifacts(&entry, packages),
            Origin::Path { .. } | Origin::Unknown { .. } => false,
        };

        if reusable {
            let kind = entry.descriptors().next().map_or("gem", SourceDescriptor::kind);
            debug!("reusing {} {} from previous gemset", kind, first.name);
        }
        reusable.then_some(entry)
    }
}

fn same_artifacts(entry: &GemsetEntry, packages: &[&LockedPackage]) -> bool {
    let mut descriptors = entry.targets.iter().chain(entry.source.iter()).peekable();
    if descriptors.peek().is_none() {
        return false;
    }

    let mut previous = Vec::new();
    for descriptor in descriptors {
        match descriptor {
            SourceDescriptor::Gem { target, .. } => {
                previous.push(target.as_deref().unwrap_or(PURE_PLATFORM))
            }
            _ => return false,
        }
    }
    let mut current: Vec<&str> = packages.iter().map(|p| p.platform_token()).collect();

    previous.sort_unstable();
    current.sort_unstable();

    previous == current && packages.iter().all(|p| p.version == entry.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(name: &str, value: serde_json::Value) -> GemsetCache {
        GemsetCache::new(BTreeMap::from([(name.to_string(), value)]))
    }

    fn registry(name: &str, version: &str, platform: Option<&str>) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            version: version.to_string(),
            platform: platform.map(str::to_string),
            origin: Origin::Registry {
                remotes: vec!["https://rubygems.org".to_string()],
            },
            dependencies: Vec::new(),
        }
    }

    fn git(revision: &str) -> LockedPackage {
        LockedPackage {
            name: "beta".to_string(),
            version: "0.1.0".to_string(),
            platform: None,
            origin: Origin::Git {
                url: "https://git.example/beta.git".to_string(),
                revision: revision.to_string(),
                submodules: false,
            },
            dependencies: Vec::new(),
        }
    }

    fn git_entry() -> serde_json::Value {
        json!({
            "version": "0.1.0",
            "groups": ["default"],
            "platforms": [],
            "source": {
                "type": "git",
                "url": "https://git.example/beta.git",
                "rev": "abcd1234",
                "sha256": "h",
                "fetchSubmodules": false
            },
            "targets": []
        })
    }

    fn nokogiri_entry() -> serde_json::Value {
        json!({
            "version": "1.16.0",
            "source": {"type": "gem", "remotes": ["https://rubygems.org"], "sha256": "hp"},
            "targets": [
                {"type": "gem", "remotes": ["https://rubygems.org"], "sha256": "hx",
                 "target": "x86_64-linux", "targetCPU": "x86_64", "targetOS": "linux"},
                {"type": "gem", "remotes": ["https://rubygems.org"], "sha256": "ha",
                 "target": "arm64-darwin", "targetCPU": "arm64", "targetOS": "darwin"}
            ]
        })
    }

    #[test]
    fn test_git_same_revision_is_reused() {
        let cache = cache("beta", git_entry());
        let pkg = git("abcd1234");
        let entry = cache.lookup(&[&pkg]).unwrap();
        assert_eq!(entry.version, "0.1.0");
    }

    #[test]
    fn test_git_new_revision_is_refetched() {
        let cache = cache("beta", git_entry());
        let pkg = git("ffff0000");
        assert!(cache.lookup(&[&pkg]).is_none());
    }

    #[test]
    fn test_registry_same_platforms_in_any_order() {
        let cache = cache("nokogiri", nokogiri_entry());
        let arm = registry("nokogiri", "1.16.0", Some("arm64-darwin"));
        let pure = registry("nokogiri", "1.16.0", None);
        let linux = registry("nokogiri", "1.16.0", Some("x86_64-linux"));
        assert!(cache.lookup(&[&arm, &pure, &linux]).is_some());
    }

    #[test]
    fn test_registry_removed_platform_forces_refetch() {
        let cache = cache("nokogiri", nokogiri_entry());
        let pure = registry("nokogiri", "1.16.0", None);
        let linux = registry("nokogiri", "1.16.0", Some("x86_64-linux"));
        assert!(cache.lookup(&[&pure, &linux]).is_none());
    }

    #[test]
    fn test_registry_version_change_forces_refetch() {
        let cache = cache("rack", json!({
            "version": "3.0.7",
            "source": {"type": "gem", "remotes": ["https://rubygems.org"], "sha256": "h"}
        }));
        let pkg = registry("rack", "3.0.8", None);
        assert!(cache.lookup(&[&pkg]).is_none());
    }

    #[test]
    fn test_registry_entry_of_other_kind_is_not_reused() {
        let cache = cache("beta", git_entry());
        let pkg = registry("beta", "0.1.0", None);
        assert!(cache.lookup(&[&pkg]).is_none());
    }

    #[test]
    fn test_path_is_never_reused() {
        let cache = cache("local", json!({
            "version": "1.0.0",
            "source": {"type": "path", "path": "engines/local"}
        }));
        let pkg = LockedPackage {
            name: "local".to_string(),
            version: "1.0.0".to_string(),
            platform: None,
            origin: Origin::Path {
                path: "engines/local".to_string(),
            },
            dependencies: Vec::new(),
        };
        assert!(cache.lookup(&[&pkg]).is_none());
    }

    #[test]
    fn test_malformed_entry_is_a_miss() {
        let cache = cache("rack", json!({"version": "3.0.8", "source": {"type": "gem"}}));
        let pkg = registry("rack", "3.0.8", None);
        assert!(cache.lookup(&[&pkg]).is_none());

        let cache = self::cache("rack", json!("not an attribute set"));
        assert!(cache.lookup(&[&pkg]).is_none());
    }

    #[test]
    fn test_unresolved_entry_is_a_miss() {
        let cache = cache("rack", json!({
            "version": "3.0.8",
            "source": {"type": "empty"}
        }));
        let pkg = registry("rack", "3.0.8", None);
        assert!(cache.lookup(&[&pkg]).is_none());
    }

    #[test]
    fn test_unknown_name_is_a_miss() {
        let pkg = registry("rack", "3.0.8", None);
        assert!(GemsetCache::empty().lookup(&[&pkg]).is_none());
    }
}
