// src/manifest.rs

//! Bundle manifests
//!
//! `blank.manifest` lists every package file of a bundle with its checksum,
//! one line per file:
//!
//! ```text
//! hello_2.10-3_amd64.deb : sha256:5f1c...
//! libfoo1_1.2_amd64.deb : sha256:9ab0...
//! ```
//!
//! Lines are appended, so building twice into the same tree duplicates
//! them; the pipeline resets the file before each build.

use crate::error::{Error, Result};
use crate::hash::{hash_file, Hash, HashAlgorithm};
use crate::staging::StagingDirs;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the manifest written at the root of a staging tree
pub const MANIFEST_FILE: &str = "blank.manifest";

const SEPARATOR: &str = " : ";

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub filename: String,
    pub hash: Hash,
}

impl ManifestEntry {
    fn to_line(&self) -> String {
        format!("{}{}{}\n", self.filename, SEPARATOR, self.hash.to_prefixed_string())
    }

    fn parse(line: &str) -> std::result::Result<Self, String> {
        let (filename, hash) = line
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| format!("expected 'filename{}checksum'", SEPARATOR))?;
        let hash = Hash::parse_prefixed(hash.trim()).map_err(|e| e.to_string())?;
        Ok(Self {
            filename: filename.to_string(),
            hash,
        })
    }
}

/// Writes `blank.manifest` for a staging tree
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestBuilder {
    algorithm: HashAlgorithm,
}

impl ManifestBuilder {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Hash every file in `data/` and append the lines to the manifest
    ///
    /// Only regular files directly under `data/` are listed, sorted by name.
    pub fn build(&self, dirs: &StagingDirs) -> Result<PathBuf> {
        let manifest_path = dirs.manifest_path();
        let mut entries = Vec::new();

        for filename in list_data_files(&dirs.data_dir)? {
            let path = dirs.data_dir.join(&filename);
            let hash = hash_file(self.algorithm, &path).map_err(|e| Error::manifest(&path, e))?;
            debug!("{} {}", hash.to_prefixed_string(), filename);
            entries.push(ManifestEntry { filename, hash });
        }

        let content: String = entries.iter().map(ManifestEntry::to_line).collect();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)
            .map_err(|e| Error::manifest(&manifest_path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| Error::manifest(&manifest_path, e))?;

        info!(
            "Wrote manifest for {} ({} files, {})",
            dirs.key,
            entries.len(),
            self.algorithm
        );
        Ok(manifest_path)
    }
}

/// A manifest read back from disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::manifest(path, e))?;

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = ManifestEntry::parse(line)
                .map_err(|e| Error::manifest(path, format!("line {}: {}", lineno + 1, e)))?;
            entries.push(entry);
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the manifest against the files in `data_dir`
    ///
    /// Fails on a duplicate line, a listed file that is missing or whose
    /// checksum differs, and a file that is not listed.
    pub fn verify(&self, data_dir: &Path) -> Result<()> {
        let mut listed: HashMap<&str, &Hash> = HashMap::new();
        for entry in &self.entries {
            if listed.insert(entry.filename.as_str(), &entry.hash).is_some() {
                return Err(Error::manifest(
                    &self.path,
                    format!("{} is listed more than once", entry.filename),
                ));
            }
        }

        let present: HashSet<String> = list_data_files(data_dir)?.into_iter().collect();

        for (filename, expected) in &listed {
            if !present.contains(*filename) {
                return Err(Error::manifest(&self.path, format!("{} is missing", filename)));
            }
            let path = data_dir.join(filename);
            let actual = hash_file(expected.algorithm, &path).map_err(|e| Error::manifest(&path, e))?;
            if actual != **expected {
                return Err(Error::manifest(
                    &self.path,
                    format!("checksum mismatch for {}: expected {}, got {}", filename, expected, actual),
                ));
            }
        }

        if let Some(extra) = present.iter().find(|name| !listed.contains_key(name.as_str())) {
            return Err(Error::manifest(&self.path, format!("{} is not listed", extra)));
        }

        debug!("Verified {} manifest entries", self.entries.len());
        Ok(())
    }
}

/// Names of the regular files directly under `dir`, sorted
fn list_data_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::manifest(dir, e))? {
        let entry = entry.map_err(|e| Error::manifest(dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::manifest(entry.path(), e))?;
        if file_type.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}
