// src/resolver.rs

//! First-level dependency resolution
//!
//! Expands the mandatory dependency groups of one package into the list of
//! packages to bundle with it. This is deliberately not a solver: only the
//! package's own groups are examined, each group picks one alternative, and
//! nothing is checked for global consistency.
//!
//! Packages that are part of the base image (the seed) are dropped from the
//! result, since the target system already ships them.

use crate::cache::{DependencyGroup, PackageCache, PackageRef};
use crate::error::{Error, Result};
use crate::seed::Seed;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Picks one package out of a dependency group
pub trait SelectionPolicy: Send + Sync {
    /// Return the chosen alternative, or `None` when nothing is available
    fn select(&self, group: &DependencyGroup, cache: &dyn PackageCache) -> Option<PackageRef>;
}

/// Chooses the first alternative present in the cache, in declared order
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl SelectionPolicy for FirstAvailable {
    fn select(&self, group: &DependencyGroup, cache: &dyn PackageCache) -> Option<PackageRef> {
        group.alternatives().iter().find_map(|name| cache.get(name))
    }
}

/// Resolves a package's first-level dependencies against a cache
pub struct DependencyResolver<'a> {
    cache: &'a dyn PackageCache,
    seed: &'a Seed,
    policy: Box<dyn SelectionPolicy + 'a>,
    strict: bool,
}

impl<'a> DependencyResolver<'a> {
    /// Create a lenient resolver using [`FirstAvailable`]
    pub fn new(cache: &'a dyn PackageCache, seed: &'a Seed) -> Self {
        Self {
            cache,
            seed,
            policy: Box::new(FirstAvailable),
            strict: false,
        }
    }

    /// Replace the selection policy
    pub fn with_policy(mut self, policy: impl SelectionPolicy + 'a) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Fail on a group with no available alternative instead of skipping it
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Resolve the packages to bundle alongside `name`
    ///
    /// The result is in group declaration order, free of duplicates and
    /// seed members, and never contains `name` itself.
    pub fn resolve(&self, name: &str) -> Result<Vec<PackageRef>> {
        let package = self
            .cache
            .get(name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(package.name.clone());

        let mut resolved = Vec::new();
        let mut skipped_seed = 0usize;

        for group in &package.depends {
            let Some(selected) = self.policy.select(group, self.cache) else {
                if self.strict {
                    return Err(Error::UnresolvedDependency {
                        package: package.name.clone(),
                        group: group.to_string(),
                    });
                }
                warn!(
                    "No available alternative for '{}' required by {}, skipping",
                    group, package.name
                );
                continue;
            };

            if self.seed.contains(&selected.name) {
                debug!("{} is part of the base image, not bundling", selected.name);
                skipped_seed += 1;
                continue;
            }

            if !seen.insert(selected.name.clone()) {
                continue;
            }

            debug!("{} -> {} {}", group, selected.name, selected.version);
            resolved.push(selected);
        }

        info!(
            "Resolved {} dependencies for {} ({} groups, {} in base image)",
            resolved.len(),
            package.name,
            package.depends.len(),
            skipped_seed
        );

        Ok(resolved)
    }
}
