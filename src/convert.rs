//! Lockfile to gemset conversion
//!
//! 1. Close the Gemfile's group/platform constraints over the lock graph.
//! 2. Per gem name, reuse the previous record when it still matches the lock.
//! 3. Otherwise resolve every platform variant and assemble a new record.

use crate::closure::{ClosureError, DependencyClosureBuilder};
use crate::fetcher::HashFetcher;
use crate::gemset::{self, Gemset, GemsetCache, SourceDescriptor};
use crate::model::{BUILD_TOOL, DependencyConstraint, EffectiveConstraint, LockedPackage, Origin};
use crate::ruby::Lockfile;
use crate::source::{SourceError, SourceResolver};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Gem dependency '{name}' (required by '{dependent}') not specified in the lockfile")]
    UnsatisfiedDependency { name: String, dependent: String },

    #[error("Unknown bundler source '{kind}' for gem {name}")]
    UnknownOrigin { name: String, kind: String },

    #[error("Internal error: constraint closure did not settle after {passes} passes")]
    ClosureDiverged { passes: usize },

    #[error(transparent)]
    Lockfile(#[from] crate::ruby::LockfileError),

    #[error(transparent)]
    Gemfile(#[from] crate::ruby::GemfileError),
}

impl From<ClosureError> for ConvertError {
    fn from(err: ClosureError) -> Self {
        match err {
            ClosureError::UnsatisfiedDependency { name, dependent } => {
                ConvertError::UnsatisfiedDependency { name, dependent }
            }
            ClosureError::Diverged { passes } => ConvertError::ClosureDiverged { passes },
        }
    }
}

impl From<SourceError> for ConvertError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::UnknownOrigin { name, kind } => ConvertError::UnknownOrigin { name, kind },
        }
    }
}

/// The gemset plus what happened to each gem.
#[derive(Debug, Default)]
pub struct Conversion {
    pub gemset: Gemset,
    /// Names carried over from the previous gemset
    pub reused: Vec<String>,
    /// Names resolved in this run
    pub resolved: Vec<String>,
    /// Variants that could not be resolved, with the reason
    pub failed: Vec<(String, String)>,
    /// Bundler version the lock was written with
    pub bundler_version: Option<String>,
}

pub fn convert(
    lockfile: &Lockfile,
    declared: &[DependencyConstraint],
    previous: &GemsetCache,
    fetcher: &dyn HashFetcher,
) -> Result<Conversion, ConvertError> {
    check_origins(&lockfile.packages)?;

    let declared = with_lock_dependencies(declared, &lockfile.dependencies);
    let constraints = DependencyClosureBuilder::new(&declared, &lockfile.packages)
        .build_tool_version(lockfile.bundler_version.as_deref())
        .build()?;
    debug!("constraints computed for {} names", constraints.len());

    let resolver = SourceResolver::new(fetcher);
    let mut conversion = Conversion {
        bundler_version: constraints
            .get(BUILD_TOOL)
            .and_then(|c| c.version.clone()),
        ..Conversion::default()
    };
    let fallback = EffectiveConstraint::default_group();

    for (name, variants) in by_name(&lockfile.packages) {
        let constraint = constraints.get(&name).unwrap_or(&fallback);

        if let Some(cached) = previous.lookup(&variants) {
            let entry = gemset::assemble::refresh(cached, &variants, constraint);
            conversion.gemset.insert(name.clone(), entry);
            conversion.reused.push(name);
            continue;
        }

        info!("Resolving {}", name);
        let mut resolved = Vec::with_capacity(variants.len());
        for package in &variants {
            let variant = resolver.resolve(package)?;
            if let SourceDescriptor::Empty { reason } = &variant.source {
                conversion
                    .failed
                    .push((package.full_name(), reason.clone()));
            }
            resolved.push(variant);
        }

        if let Some(entry) = gemset::assemble(&resolved, constraint) {
            conversion.gemset.insert(name.clone(), entry);
            conversion.resolved.push(name);
        }
    }

    Ok(conversion)
}

fn check_origins(packages: &[LockedPackage]) -> Result<(), ConvertError> {
    for package in packages {
        if let Origin::Unknown { kind } = &package.origin {
            return Err(ConvertError::UnknownOrigin {
                name: package.name.clone(),
                kind: kind.clone(),
            });
        }
    }
    Ok(())
}

/// Names the lock lists under DEPENDENCIES but the Gemfile reader did not
/// see get the default constraint.
fn with_lock_dependencies(
    declared: &[DependencyConstraint],
    lock_dependencies: &[String],
) -> Vec<DependencyConstraint> {
    let mut all = declared.to_vec();
    for name in lock_dependencies {
        if !all.iter().any(|d| &d.name == name) {
            debug!("{} is locked but not declared in the Gemfile", name);
            all.push(DependencyConstraint::new(name.clone()));
        }
    }
    all
}

/// Variants grouped by gem name, in order of first appearance.
fn by_name(packages: &[LockedPackage]) -> Vec<(String, Vec<&LockedPackage>)> {
    let mut groups: Vec<(String, Vec<&LockedPackage>)> = Vec::new();
    for package in packages {
        match groups.iter_mut().find(|(name, _)| *name == package.name) {
            Some((_, variants)) => variants.push(package),
            None => groups.push((package.name.clone(), vec![package])),
        }
    }
    groups
}
