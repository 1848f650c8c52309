// src/repository/publish.rs

//! Copy built bundles into the publish tree
//!
//! Bundles land in `<publish_dir>/<distribution>/<arch>/`, where the
//! architecture is the last `_` field of the bundle's file name
//! (`hello_2.10-3_blankon7.0_amd64.on` goes to `amd64/`).

use crate::archive::ARTIFACT_EXTENSION;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Architecture encoded in a bundle file name
pub fn architecture_of(artifact: &Path) -> Option<&str> {
    let stem = artifact.file_stem()?.to_str()?;
    let (_, arch) = stem.rsplit_once('_')?;
    (!arch.is_empty()).then_some(arch)
}

/// Publish every bundle of `result_dir`, returning the published paths
///
/// Existing files with the same name are replaced. Bundles whose name
/// carries no architecture are skipped.
pub fn publish(result_dir: &Path, publish_dir: &Path, distribution: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(result_dir).map_err(|e| Error::index(result_dir, e))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::index(result_dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION) {
            artifacts.push(path);
        }
    }
    artifacts.sort();

    let mut published = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        let Some(arch) = architecture_of(artifact) else {
            warn!("Skipping {}: no architecture in file name", artifact.display());
            continue;
        };
        let Some(filename) = artifact.file_name() else {
            continue;
        };

        let arch_dir = publish_dir.join(distribution).join(arch);
        fs::create_dir_all(&arch_dir).map_err(|e| Error::index(&arch_dir, e))?;

        let dest = arch_dir.join(filename);
        copy_atomic(artifact, &dest)?;
        debug!("Published {} to {}", artifact.display(), dest.display());
        published.push(dest);
    }

    info!(
        "Published {} bundles to {}",
        published.len(),
        publish_dir.join(distribution).display()
    );
    Ok(published)
}

/// Copy through a temporary file in the destination directory
fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".publish-")
        .tempfile_in(dir)
        .map_err(|e| Error::index(dir, e))?;

    let mut source = File::open(src).map_err(|e| Error::index(src, e))?;
    io::copy(&mut source, &mut temp).map_err(|e| Error::index(dest, e))?;

    temp.persist(dest).map_err(|e| Error::index(dest, e.error))?;
    Ok(())
}
