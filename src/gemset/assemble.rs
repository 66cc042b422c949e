//! Merging the platform variants of one gem into a single record

use super::{GemsetEntry, SourceDescriptor};
use crate::model::{BUILD_TOOL, EffectiveConstraint, LockedPackage, PURE_PLATFORM};
use crate::platform::{self, EnginePlatform};
use std::collections::BTreeSet;
use tracing::debug;

/// A locked variant with the descriptor it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariant<'a> {
    pub package: &'a LockedPackage,
    pub source: SourceDescriptor,
}

impl ResolvedVariant<'_> {
    /// The platform this variant serves. Unresolved variants keep the
    /// platform they were locked for.
    pub fn platform_key(&self) -> &str {
        match &self.source {
            SourceDescriptor::Empty { .. } => self.package.platform_token(),
            source => source.target().unwrap_or(PURE_PLATFORM),
        }
    }
}

/// Build the record for one gem from its variants in lockfile order.
///
/// The pure variant becomes `source` and every other variant a target, in
/// order. Without a pure variant `source` is left out, every variant becomes
/// a target and the first one supplies version and dependencies.
pub fn assemble(
    variants: &[ResolvedVariant<'_>],
    constraint: &EffectiveConstraint,
) -> Option<GemsetEntry> {
    let first = variants.first()?;

    let mut seen = BTreeSet::new();
    let mut primary = None;
    let mut targets = Vec::new();
    for variant in variants {
        let key = variant.platform_key();
        if !seen.insert(key) {
            debug!(
                "dropping duplicate {} variant of {}",
                key, variant.package.name
            );
            continue;
        }
        if key == PURE_PLATFORM {
            primary = Some(variant);
        } else {
            targets.push(variant.source.clone());
        }
    }

    let base = primary.unwrap_or(first);
    Some(GemsetEntry {
        version: base.package.version.clone(),
        source: primary.map(|v| v.source.clone()),
        groups: groups_of(constraint),
        platforms: engines_of(constraint),
        dependencies: dependencies_of(base.package),
        targets,
    })
}

/// Carry a previous record forward, refreshing what the lock and Gemfile
/// decide: groups, platforms and dependencies.
pub fn refresh(
    mut entry: GemsetEntry,
    packages: &[&LockedPackage],
    constraint: &EffectiveConstraint,
) -> GemsetEntry {
    let base = packages
        .iter()
        .find(|p| !p.is_platform_specific())
        .or_else(|| packages.first());

    entry.groups = groups_of(constraint);
    entry.platforms = engines_of(constraint);
    if let Some(base) = base {
        entry.dependencies = dependencies_of(base);
    }
    entry
}

fn groups_of(constraint: &EffectiveConstraint) -> Vec<String> {
    constraint.groups.iter().cloned().collect()
}

fn engines_of(constraint: &EffectiveConstraint) -> Vec<EnginePlatform> {
    constraint
        .platforms
        .iter()
        .flat_map(|name| {
            let engines = platform::engines_for(name);
            if engines.is_none() {
                debug!("unknown Gemfile platform {}", name);
            }
            engines.unwrap_or_default()
        })
        .collect()
}

/// Direct dependencies in lock order, without duplicates or bundler.
fn dependencies_of(package: &LockedPackage) -> Vec<String> {
    let mut seen = BTreeSet::new();
    package
        .dependencies
        .iter()
        .filter(|name| name.as_str() != BUILD_TOOL && seen.insert(name.as_str()))
        .cloned()
        .collect()
}
