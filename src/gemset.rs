//! The gemset: one record per gem name, ready for Nix
//!
//! Handles:
//! - Reuse: deciding whether a previous run's record is still valid
//! - Assembly: merging platform variants into one record
//! - Existing state: reading a previous `gemset.nix` / `gemset.json`
//! - Rendering: Nix attribute set or JSON

pub mod assemble;
pub mod existing;
pub mod nix;
pub mod reuse;

pub use assemble::{ResolvedVariant, assemble};
pub use reuse::GemsetCache;

use crate::platform::EnginePlatform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the bytes of one platform variant come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Gem {
        remotes: Vec<String>,
        sha256: String,
        /// Published platform token; absent for pure gems
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(rename = "targetCPU", default, skip_serializing_if = "Option::is_none")]
        target_cpu: Option<String>,
        #[serde(rename = "targetOS", default, skip_serializing_if = "Option::is_none")]
        target_os: Option<String>,
    },
    Git {
        url: String,
        rev: String,
        sha256: String,
        #[serde(rename = "fetchSubmodules", default)]
        fetch_submodules: bool,
    },
    Path {
        path: String,
    },
    /// A variant that could not be resolved. The reason is logged and
    /// reported, never written.
    Empty {
        #[serde(skip)]
        reason: String,
    },
}

impl SourceDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::Gem { .. } => "gem",
            SourceDescriptor::Git { .. } => "git",
            SourceDescriptor::Path { .. } => "path",
            SourceDescriptor::Empty { .. } => "empty",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SourceDescriptor::Empty { .. })
    }

    /// The published platform of a gem artifact.
    pub fn target(&self) -> Option<&str> {
        match self {
            SourceDescriptor::Gem { target, .. } => target.as_deref(),
            _ => None,
        }
    }
}

/// Everything Nix needs to build one gem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemsetEntry {
    pub version: String,
    /// The pure-platform variant; absent when only native variants are locked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDescriptor>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<EnginePlatform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub targets: Vec<SourceDescriptor>,
}

impl GemsetEntry {
    /// Primary and target descriptors, primary first.
    pub fn descriptors(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.source.iter().chain(self.targets.iter())
    }
}

/// Gem name to record, in name order.
pub type Gemset = BTreeMap<String, GemsetEntry>;
