//! RubyGems platform tokens and Gemfile platform names
//!
//! Two unrelated vocabularies share the word "platform":
//! - artifact platforms such as `x86_64-linux` or `arm64-darwin-22`, which are
//!   parsed into a cpu/os/version triple, and
//! - Gemfile platform names such as `mri_31` or `jruby`, which map to the Ruby
//!   engines a gem should be installed for.

use crate::model::PURE_PLATFORM;
use serde::{Deserialize, Serialize};

/// Ruby versions Bundler accepts as suffixes on Gemfile platform names.
const RUBY_VERSIONS: &[&str] = &[
    "1.8", "1.9", "2.0", "2.1", "2.2", "2.3", "2.4", "2.5", "2.6", "2.7", "3.0", "3.1", "3.2",
    "3.3", "3.4",
];

/// Engines each base Gemfile platform name selects.
const ENGINE_TABLE: &[(&str, &[&str])] = &[
    ("ruby", &["ruby", "rbx", "maglev"]),
    ("mri", &["ruby", "maglev"]),
    ("rbx", &["rbx"]),
    ("jruby", &["jruby"]),
    ("mswin", &["mswin"]),
    ("mswin64", &["mswin64"]),
    ("mingw", &["mingw"]),
    ("truffleruby", &["ruby"]),
    ("x64_mingw", &["mingw"]),
];

/// A parsed artifact platform, e.g. `arm64-darwin-22`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub cpu: Option<String>,
    pub os: String,
    pub version: Option<String>,
}

impl Platform {
    /// Parse a platform token. Returns `None` for the pure `ruby` platform.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || token == PURE_PLATFORM {
            return None;
        }

        let mut parts: Vec<String> = token.split('-').map(str::to_string).collect();

        // x86_64-linux-musl: the libc suffix belongs to the os
        if parts.len() > 2 && !is_numeric_version(parts.last().map(String::as_str).unwrap_or("")) {
            let extra = parts.pop().unwrap_or_default();
            if let Some(last) = parts.last_mut() {
                last.push('-');
                last.push_str(&extra);
            }
        }

        let first = parts.remove(0);
        let mut cpu = Some(if is_x86_cpu(&first) {
            "x86".to_string()
        } else {
            first.clone()
        });

        if parts.len() == 2 && is_numeric_version(&parts[1]) {
            return Some(Self {
                cpu,
                os: parts[0].clone(),
                version: Some(parts[1].clone()),
            });
        }

        let os = match parts.into_iter().next() {
            Some(os) => os,
            None => {
                // single token such as "java"
                cpu = None;
                first
            }
        };

        let (os, version) = split_os(&os);
        Some(Self { cpu, os, version })
    }

    /// Exact equality, used to pick the upstream spec for a locked platform.
    pub fn parse_eq(a: &str, b: &str) -> bool {
        Self::parse(a) == Self::parse(b)
    }

    /// Loose compatibility: a `universal` or missing CPU and a missing version
    /// act as wildcards.
    pub fn matches(&self, other: &Platform) -> bool {
        let wildcard_cpu = |cpu: &Option<String>| matches!(cpu.as_deref(), None | Some("universal"));

        if (self.cpu.as_deref() == Some("universal") || other.cpu.as_deref() == Some("universal"))
            && self.os.starts_with("mingw")
            && other.os.starts_with("mingw")
        {
            return true;
        }

        let cpu_ok = wildcard_cpu(&self.cpu)
            || wildcard_cpu(&other.cpu)
            || self.cpu == other.cpu
            || (self.cpu.as_deref() == Some("arm")
                && other.cpu.as_deref().is_some_and(|c| c.starts_with("armv")));

        let version_ok = if self.os == "linux" {
            normalized_linux_version(&self.version) == normalized_linux_version(&other.version)
        } else {
            self.version.is_none() || other.version.is_none() || self.version == other.version
        };

        cpu_ok && self.os == other.os && version_ok
    }
}

/// Whether a locked platform token accepts an artifact built for `candidate`.
pub fn accepts(locked: &str, candidate: &str) -> bool {
    match (Platform::parse(locked), Platform::parse(candidate)) {
        (Some(locked), Some(candidate)) => locked.matches(&candidate),
        (None, None) => true,
        _ => false,
    }
}

fn is_x86_cpu(cpu: &str) -> bool {
    let bytes = cpu.as_bytes();
    bytes.len() == 4 && bytes[0] == b'i' && bytes[1].is_ascii_digit() && &cpu[2..] == "86"
}

fn is_numeric_version(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let major = parts.next().unwrap_or("");
    let minor_ok = parts
        .next()
        .is_none_or(|minor| !minor.is_empty() && minor.chars().all(|c| c.is_ascii_digit()));
    !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()) && minor_ok
}

fn normalized_linux_version(version: &Option<String>) -> Option<&str> {
    match version.as_deref() {
        None | Some("gnu") => None,
        Some(other) => Some(other),
    }
}

/// Digits trailing `prefix` anywhere in `os`, e.g. `darwin22` -> `Some(Some("22"))`.
fn suffix_after(os: &str, prefix: &str) -> Option<Option<String>> {
    let idx = os.find(prefix)?;
    let digits: String = os[idx + prefix.len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Some((!digits.is_empty()).then_some(digits))
}

/// Normalize an os string into its family and version.
fn split_os(os: &str) -> (String, Option<String>) {
    let family = |name: &str, version: Option<String>| (name.to_string(), version);

    if let Some(v) = suffix_after(os, "aix") {
        return family("aix", v);
    }
    if os.contains("cygwin") {
        return family("cygwin", None);
    }
    if let Some(v) = suffix_after(os, "darwin") {
        return family("darwin", v);
    }
    if os == "macruby" {
        return family("macruby", None);
    }
    if let Some(v) = suffix_after(os, "freebsd") {
        return family("freebsd", v);
    }
    if os == "java" || os == "jruby" {
        return family("java", None);
    }
    if let Some(rest) = os.strip_prefix("java") {
        return family("java", Some(rest.to_string()));
    }
    if let Some(rest) = os.strip_prefix("dalvik") {
        return family("dalvik", (!rest.is_empty()).then(|| rest.to_string()));
    }
    if let Some(rest) = os.strip_prefix("dotnet") {
        return family("dotnet", (!rest.is_empty()).then(|| rest.to_string()));
    }
    if let Some(idx) = os.find("linux") {
        let rest = os[idx + "linux".len()..].trim_start_matches('-');
        return family("linux", (!rest.is_empty()).then(|| rest.to_string()));
    }
    if os.contains("mingw32") {
        return family("mingw32", None);
    }
    if let Some(idx) = os.find("mingw") {
        let rest = os[idx + "mingw".len()..].trim_start_matches('-');
        return family("mingw", (!rest.is_empty()).then(|| rest.to_string()));
    }
    if let Some(idx) = os.find("mswin") {
        let tail = &os[idx..];
        let (name, version) = match tail.split_once('_') {
            Some((name, version)) => (name, Some(version.to_string())),
            None => (tail, None),
        };
        return (name.to_string(), version);
    }
    if os.contains("netbsdelf") {
        return family("netbsdelf", None);
    }
    if let Some(v) = suffix_after(os, "openbsd") {
        return family("openbsd", v);
    }
    if let Some(v) = suffix_after(os, "solaris") {
        return family("solaris", v);
    }
    if os.contains("wasi") {
        return family("wasi", None);
    }
    family("unknown", None)
}

/// A Ruby engine (and optionally engine version) a gem is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePlatform {
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Expand a Gemfile platform name like `mri_31` into engine records.
pub fn engines_for(name: &str) -> Option<Vec<EnginePlatform>> {
    let lookup = |base: &str| {
        ENGINE_TABLE
            .iter()
            .find(|(key, _)| *key == base)
            .map(|(_, engines)| *engines)
    };

    if let Some(engines) = lookup(name) {
        return Some(
            engines
                .iter()
                .map(|engine| EnginePlatform {
                    engine: engine.to_string(),
                    version: None,
                })
                .collect(),
        );
    }

    let (base, suffix) = name.rsplit_once('_')?;
    let version = RUBY_VERSIONS
        .iter()
        .find(|v| v.replace('.', "") == suffix)?;
    let engines = lookup(base)?;
    Some(
        engines
            .iter()
            .map(|engine| EnginePlatform {
                engine: engine.to_string(),
                version: Some(version.to_string()),
            })
            .collect(),
    )
}
