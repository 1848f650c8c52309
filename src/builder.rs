// src/builder.rs

//! Bundle build pipeline
//!
//! Builds one `.on` bundle from a package name:
//!
//! 1. look the package up and resolve its first-level dependencies
//! 2. prepare and lock the staging tree for its key
//! 3. fetch the package and its dependencies into `data/`
//! 4. write `blank.manifest`
//! 5. extract the package's control fields into `blank.info`
//! 6. compress the tree into the result directory
//!
//! Every step depends on the files produced by the one before it, so a
//! single build is strictly sequential. Separate builds share nothing but
//! the read-only [`BuildContext`] and can run in parallel.

use crate::archive;
use crate::cache::PackageCache;
use crate::compression::CompressionAlgorithm;
use crate::config::BuildConfig;
use crate::control;
use crate::download::{Downloader, Fetch};
use crate::error::{Error, Result};
use crate::manifest::ManifestBuilder;
use crate::resolver::DependencyResolver;
use crate::seed::Seed;
use crate::staging::{StagingArea, StagingKey};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Read-only inputs shared by every build
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub config: &'a BuildConfig,
    pub cache: &'a dyn PackageCache,
    pub seed: &'a Seed,
    pub fetcher: &'a dyn Fetch,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        config: &'a BuildConfig,
        cache: &'a dyn PackageCache,
        seed: &'a Seed,
        fetcher: &'a dyn Fetch,
    ) -> Self {
        Self {
            config,
            cache,
            seed,
            fetcher,
        }
    }
}

/// A finished bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub key: StagingKey,
    pub path: PathBuf,
    pub compression: CompressionAlgorithm,
    /// Packages in the bundle, the primary one included
    pub packages: usize,
}

/// Build the bundle for one package
pub fn build_package(ctx: &BuildContext<'_>, name: &str) -> Result<BuildArtifact> {
    let config = ctx.config;
    info!("Building bundle for {}", name);

    let package = ctx
        .cache
        .get(name)
        .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;
    let dependencies = DependencyResolver::new(ctx.cache, ctx.seed)
        .strict(config.strict_dependencies)
        .resolve(name)?;

    let area = StagingArea::new(&config.staging_dir);
    let dirs = area.prepare(&package, &config.distribution_key())?;
    let _lock = area.lock(&dirs.key)?;
    dirs.reset_outputs()?;

    let uris: Vec<String> = std::iter::once(package.uri.clone())
        .chain(dependencies.iter().map(|dep| dep.uri.clone()))
        .collect();
    let paths = Downloader::new(ctx.fetcher)
        .jobs(config.jobs)
        .checksum(config.checksum)
        .fetch_all(&dirs.data_dir, &uris)?;
    let stale = dirs.retain_data(&paths)?;
    if stale > 0 {
        debug!("Dropped {} stale files from {}", stale, dirs.data_dir.display());
    }

    ManifestBuilder::new(config.checksum).build(&dirs)?;

    let primary = paths
        .first()
        .ok_or_else(|| Error::download(package.uri.as_str(), "nothing was fetched"))?;
    let info = control::extract(primary)?;
    control::write_info(&dirs.root, &info)?;

    let path = archive::compress(&dirs.root, &config.result_dir, config.compression)?;

    info!(
        "Built {} ({}) with {} packages",
        path.display(),
        info.synopsis(),
        dependencies.len() + 1
    );
    Ok(BuildArtifact {
        key: dirs.key.clone(),
        path,
        compression: config.compression,
        packages: dependencies.len() + 1,
    })
}

/// Build several bundles in parallel
///
/// Each name gets its own result, in input order; one failed build does
/// not stop the others. Repeats of a name share a staging key, so they are
/// built one after another inside a single task. Waiting on the download
/// pool lets a rayon worker pick up queued builds, and a queued build of a
/// key the worker already holds would block on its own lock.
pub fn build_all<S>(ctx: &BuildContext<'_>, names: &[S]) -> Vec<(String, Result<BuildArtifact>)>
where
    S: AsRef<str> + Sync,
{
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut group_of: HashMap<&str, usize> = HashMap::new();
    for (position, name) in names.iter().enumerate() {
        let name = name.as_ref();
        match group_of.get(name) {
            Some(&group) => groups[group].1.push(position),
            None => {
                group_of.insert(name, groups.len());
                groups.push((name, vec![position]));
            }
        }
    }

    let mut results: Vec<(usize, String, Result<BuildArtifact>)> = groups
        .par_iter()
        .flat_map_iter(|(name, positions)| {
            positions
                .iter()
                .map(move |&position| (position, name.to_string(), build_package(ctx, name)))
        })
        .collect();

    results.sort_by_key(|(position, _, _)| *position);
    results
        .into_iter()
        .map(|(_, name, result)| (name, result))
        .collect()
}
