//! Group/platform closure over the locked dependency graph
//!
//! A gem declared in `group :test` pulls its whole dependency tree into the
//! test group, and a gem restricted to `platforms :jruby` restricts what it
//! pulls in the same way. Each locked name ends up with the union of the
//! constraints of every ancestor that reaches it.

use crate::model::{BUILD_TOOL, DependencyConstraint, EffectiveConstraint, LockedPackage};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClosureError {
    #[error("Gem dependency '{name}' (required by '{dependent}') not specified in the lockfile")]
    UnsatisfiedDependency { name: String, dependent: String },

    #[error("Constraint closure did not settle after {passes} passes")]
    Diverged { passes: usize },
}

#[derive(Debug, Clone, Default)]
struct Node {
    constraint: EffectiveConstraint,
    edges: BTreeSet<String>,
}

/// Effective constraint for every locked name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    by_name: BTreeMap<String, EffectiveConstraint>,
}

impl Constraints {
    pub fn get(&self, name: &str) -> Option<&EffectiveConstraint> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Re-express the closure as top-level declarations.
    pub fn as_declared(&self) -> Vec<DependencyConstraint> {
        self.by_name
            .iter()
            .map(|(name, c)| DependencyConstraint {
                name: name.clone(),
                groups: c.groups.clone(),
                platforms: c.platforms.clone(),
            })
            .collect()
    }
}

/// Builds the closure from Gemfile declarations and the locked package list.
pub struct DependencyClosureBuilder<'a> {
    declared: &'a [DependencyConstraint],
    packages: &'a [LockedPackage],
    build_tool_version: Option<&'a str>,
}

impl<'a> DependencyClosureBuilder<'a> {
    pub fn new(declared: &'a [DependencyConstraint], packages: &'a [LockedPackage]) -> Self {
        Self {
            declared,
            packages,
            build_tool_version: None,
        }
    }

    /// Version recorded under `BUNDLED WITH`.
    pub fn build_tool_version(mut self, version: Option<&'a str>) -> Self {
        self.build_tool_version = version;
        self
    }

    pub fn build(&self) -> Result<Constraints, ClosureError> {
        let mut graph = self.seed();
        self.validate_edges(&graph)?;

        let universe: BTreeSet<&String> = graph
            .values()
            .flat_map(|n| n.constraint.groups.iter().chain(n.constraint.platforms.iter()))
            .collect();
        // every productive pass adds at least one element to some node
        let cap = graph.len() * (universe.len() + 1) + 1;

        let order: Vec<String> = graph.keys().cloned().collect();
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > cap {
                return Err(ClosureError::Diverged { passes: cap });
            }

            let mut changed = false;
            for name in &order {
                let Some(node) = graph.get(name) else {
                    continue;
                };
                let parent = node.constraint.clone();
                let edges: Vec<String> = node.edges.iter().cloned().collect();

                for dep in edges {
                    let Some(child) = graph.get_mut(&dep) else {
                        continue;
                    };
                    if child.constraint.covers(&parent) {
                        continue;
                    }
                    child.constraint.absorb(&parent);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        debug!(names = graph.len(), passes, "constraint closure settled");

        Ok(Constraints {
            by_name: graph
                .into_iter()
                .map(|(name, node)| (name, node.constraint))
                .collect(),
        })
    }

    fn seed(&self) -> BTreeMap<String, Node> {
        let mut graph: BTreeMap<String, Node> = BTreeMap::new();

        for declared in self.declared {
            let node = graph.entry(declared.name.clone()).or_default();
            node.constraint = EffectiveConstraint::from_declared(declared);
        }

        for package in self.packages {
            let node = graph.entry(package.name.clone()).or_insert_with(|| Node {
                constraint: EffectiveConstraint::default_group(),
                edges: BTreeSet::new(),
            });
            node.edges.extend(package.dependencies.iter().cloned());
        }

        graph.entry(BUILD_TOOL.to_string()).or_insert_with(|| Node {
            constraint: EffectiveConstraint {
                version: self.build_tool_version.map(str::to_string),
                ..EffectiveConstraint::default_group()
            },
            edges: BTreeSet::new(),
        });

        graph
    }

    fn validate_edges(&self, graph: &BTreeMap<String, Node>) -> Result<(), ClosureError> {
        for (name, node) in graph {
            if let Some(missing) = node.edges.iter().find(|dep| !graph.contains_key(*dep)) {
                return Err(ClosureError::UnsatisfiedDependency {
                    name: missing.clone(),
                    dependent: name.clone(),
                });
            }
        }
        Ok(())
    }
}
