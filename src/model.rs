//! Lock and manifest data shared by every stage of the conversion.

use std::collections::BTreeSet;
use std::fmt;

/// Platform token Bundler uses for platform-independent gems.
pub const PURE_PLATFORM: &str = "ruby";

/// Bundler itself shows up as a dependency of some gems without being locked.
pub const BUILD_TOOL: &str = "bundler";

/// Group every Gemfile declaration belongs to unless told otherwise.
pub const DEFAULT_GROUP: &str = "default";

/// Where a locked gem's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A `GEM` section: artifacts served by one or more registries.
    Registry { remotes: Vec<String> },
    /// A `GIT` section pinned to a revision.
    Git {
        url: String,
        revision: String,
        submodules: bool,
    },
    /// A `PATH` section pointing at a directory on disk.
    Path { path: String },
    /// Any other source section (plugin sources and the like).
    Unknown { kind: String },
}

impl Origin {
    pub fn kind(&self) -> &str {
        match self {
            Origin::Registry { .. } => "GEM",
            Origin::Git { .. } => "GIT",
            Origin::Path { .. } => "PATH",
            Origin::Unknown { kind } => kind,
        }
    }
}

/// One locked (name, platform) variant from Gemfile.lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    /// `None` for the pure `ruby` platform
    pub platform: Option<String>,
    pub origin: Origin,
    /// Names of direct dependencies, in lockfile order
    pub dependencies: Vec<String>,
}

impl LockedPackage {
    /// The platform token as Bundler prints it, `ruby` when pure.
    pub fn platform_token(&self) -> &str {
        self.platform.as_deref().unwrap_or(PURE_PLATFORM)
    }

    pub fn is_platform_specific(&self) -> bool {
        self.platform_token() != PURE_PLATFORM
    }

    /// `name-version`, the stem shared by every artifact of this gem.
    pub fn name_version(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// `name-version[-platform]`, the artifact file stem.
    pub fn full_name(&self) -> String {
        match &self.platform {
            Some(platform) if platform != PURE_PLATFORM => {
                format!("{}-{}-{}", self.name, self.version, platform)
            }
            _ => self.name_version(),
        }
    }
}

impl fmt::Display for LockedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Groups and platforms a Gemfile attaches to a top-level `gem` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyConstraint {
    pub name: String,
    pub groups: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
}

impl DependencyConstraint {
    /// A declaration with no options: the default group, every platform.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: BTreeSet::from([DEFAULT_GROUP.to_string()]),
            platforms: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }
}

/// Union of every group and platform under which a gem is reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveConstraint {
    pub groups: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
    /// Only set for the synthetic build-tool entry
    pub version: Option<String>,
}

impl EffectiveConstraint {
    pub fn from_declared(declared: &DependencyConstraint) -> Self {
        let groups = if declared.groups.is_empty() {
            BTreeSet::from([DEFAULT_GROUP.to_string()])
        } else {
            declared.groups.clone()
        };
        Self {
            groups,
            platforms: declared.platforms.clone(),
            version: None,
        }
    }

    pub fn default_group() -> Self {
        Self {
            groups: BTreeSet::from([DEFAULT_GROUP.to_string()]),
            ..Self::default()
        }
    }

    /// Whether `other` adds nothing beyond the default group to this constraint.
    pub fn covers(&self, other: &EffectiveConstraint) -> bool {
        let missing_group = other
            .groups
            .iter()
            .any(|g| g != DEFAULT_GROUP && !self.groups.contains(g));
        let missing_platform = other.platforms.iter().any(|p| !self.platforms.contains(p));
        !missing_group && !missing_platform
    }

    pub fn absorb(&mut self, other: &EffectiveConstraint) {
        self.groups.extend(other.groups.iter().cloned());
        self.platforms.extend(other.platforms.iter().cloned());
    }
}
