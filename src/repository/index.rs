// src/repository/index.rs

//! `Packages.info` generation
//!
//! Each architecture directory of the publish tree carries a
//! `Packages.info` file with one stanza per indexed bundle:
//!
//! ```text
//! Package: hello
//! Version: 2.10-3
//! Architecture: amd64
//! Section: devel
//! Filename: blankon/amd64/hello_2.10-3_blankon7.0_amd64.on
//! Size: 48213
//! SHA256: 7d4f...
//! Description: example package based on GNU hello
//!  The GNU hello program produces a familiar, friendly greeting.
//! ```
//!
//! The file is only ever appended to. Indexing the same bundle twice adds
//! a second stanza.

use crate::archive::{read_info, ARTIFACT_EXTENSION};
use crate::control::{push_field, ControlInfo};
use crate::error::{Error, Result};
use crate::hash::{hash_file, Hash, HashAlgorithm};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the index file in each architecture directory
pub const INDEX_FILE: &str = "Packages.info";

/// One indexed bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Control fields embedded in the bundle
    pub control: ControlInfo,
    /// Bundle path relative to the publish root
    pub filename: String,
    pub size: u64,
    pub checksum: Hash,
}

impl IndexRecord {
    /// Render as a stanza, terminated by a blank line
    pub fn to_stanza(&self) -> String {
        let control = &self.control;
        let mut stanza = String::new();

        push_field(&mut stanza, "Package", &control.package);
        push_field(&mut stanza, "Version", &control.version);
        for (key, value) in [
            ("Architecture", &control.architecture),
            ("Section", &control.section),
            ("Homepage", &control.homepage),
        ] {
            if !value.is_empty() {
                push_field(&mut stanza, key, value);
            }
        }
        push_field(&mut stanza, "Filename", &self.filename);
        push_field(&mut stanza, "Size", &self.size.to_string());
        push_field(&mut stanza, self.checksum.algorithm.index_label(), self.checksum.as_str());
        if !control.description.is_empty() {
            push_field(&mut stanza, "Description", &control.description);
        }

        stanza.push('\n');
        stanza
    }
}

/// Package name encoded in a bundle file name (text before the first `_`)
pub fn package_name_of(filename: &str) -> &str {
    filename.split('_').next().unwrap_or(filename)
}

/// Index the requested packages of one architecture directory
///
/// Scans `publish_dir/distribution/architecture` for `.on` bundles, in
/// file name order. Bundles whose package name is in `names` get a stanza
/// appended to `Packages.info` there; all others are skipped.
pub fn index<S: AsRef<str>>(
    publish_dir: &Path,
    distribution: &str,
    architecture: &str,
    names: &[S],
    algorithm: HashAlgorithm,
) -> Result<Vec<IndexRecord>> {
    let arch_dir = publish_dir.join(distribution).join(architecture);
    if !arch_dir.is_dir() {
        return Err(Error::index(&arch_dir, "directory does not exist"));
    }

    let mut records = Vec::new();
    for path in list_artifacts(&arch_dir)? {
        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let name = package_name_of(&filename);
        if !names.iter().any(|n| n.as_ref() == name) {
            debug!("Skipping {}: {} not requested", filename, name);
            continue;
        }

        records.push(index_artifact(publish_dir, &path, algorithm)?);
    }

    let index_path = arch_dir.join(INDEX_FILE);
    if !records.is_empty() {
        let content: String = records.iter().map(IndexRecord::to_stanza).collect();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .map_err(|e| Error::index(&index_path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| Error::index(&index_path, e))?;
    }

    info!(
        "Indexed {} packages into {}",
        records.len(),
        index_path.display()
    );
    Ok(records)
}

fn index_artifact(publish_dir: &Path, path: &Path, algorithm: HashAlgorithm) -> Result<IndexRecord> {
    let control = read_info(path).map_err(|e| Error::index(path, e))?;
    let size = fs::metadata(path).map_err(|e| Error::index(path, e))?.len();
    let checksum = hash_file(algorithm, path).map_err(|e| Error::index(path, e))?;
    let filename = path
        .strip_prefix(publish_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    debug!("{} {} ({} bytes)", control.package, control.version, size);
    Ok(IndexRecord {
        control,
        filename,
        size,
        checksum,
    })
}

/// `.on` files directly under `dir`, sorted by name
fn list_artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::index(dir, e))? {
        let path = entry.map_err(|e| Error::index(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::compress;
    use crate::compression::CompressionAlgorithm;
    use crate::control::{write_info, ControlInfo};
    use tempfile::TempDir;

    /// Build a bundle for `name` straight into the architecture directory
    fn publish_bundle(publish_dir: &Path, name: &str, version: &str) -> PathBuf {
        let staging = TempDir::new().unwrap();
        let root = staging.path().join(format!("{name}_{version}_blankon7.0_amd64"));
        fs::create_dir_all(root.join("data")).unwrap();
        let info = ControlInfo {
            package: name.to_string(),
            version: version.to_string(),
            architecture: "amd64".to_string(),
            description: format!("{name} synopsis\n{name} long description"),
            section: "utils".to_string(),
            filename: format!("{name}_{version}_amd64.deb"),
            ..Default::default()
        };
        write_info(&root, &info).unwrap();

        let arch_dir = publish_dir.join("blankon").join("amd64");
        compress(&root, &arch_dir, CompressionAlgorithm::Gzip).unwrap()
    }

    #[test]
    fn test_package_name_of() {
        assert_eq!(package_name_of("foo_1.0_distro_amd64.on"), "foo");
        assert_eq!(package_name_of("foo"), "foo");
    }

    #[test]
    fn test_index_requested_package() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = publish_bundle(temp_dir.path(), "foo", "1.0");
        publish_bundle(temp_dir.path(), "bar", "2.0");

        let records = index(temp_dir.path(), "blankon", "amd64", &["foo"], HashAlgorithm::Sha256).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.control.package, "foo");
        assert_eq!(record.filename, "blankon/amd64/foo_1.0_blankon7.0_amd64.on");
        assert_eq!(record.size, fs::metadata(&artifact).unwrap().len());
        assert_eq!(record.checksum, hash_file(HashAlgorithm::Sha256, &artifact).unwrap());

        let content = fs::read_to_string(temp_dir.path().join("blankon/amd64").join(INDEX_FILE)).unwrap();
        assert_eq!(content.matches("Package: ").count(), 1);
        assert!(content.starts_with("Package: foo\nVersion: 1.0\n"));
        assert!(content.contains(&format!("Size: {}\n", record.size)));
        assert!(content.contains(&format!("SHA256: {}\n", record.checksum)));
        assert!(content.ends_with("Description: foo synopsis\n foo long description\n\n"));
    }

    #[test]
    fn test_index_appends_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        publish_bundle(temp_dir.path(), "foo", "1.0");

        index(temp_dir.path(), "blankon", "amd64", &["foo"], HashAlgorithm::Md5).unwrap();
        index(temp_dir.path(), "blankon", "amd64", &["foo"], HashAlgorithm::Md5).unwrap();

        let content = fs::read_to_string(temp_dir.path().join("blankon/amd64").join(INDEX_FILE)).unwrap();
        assert_eq!(content.matches("Package: foo").count(), 2);
        assert_eq!(content.matches("MD5sum: ").count(), 2);
    }

    #[test]
    fn test_unrequested_packages_skipped() {
        let temp_dir = TempDir::new().unwrap();
        publish_bundle(temp_dir.path(), "foo", "1.0");

        let records = index(temp_dir.path(), "blankon", "amd64", &["other"], HashAlgorithm::Sha256).unwrap();
        assert!(records.is_empty());
        assert!(!temp_dir.path().join("blankon/amd64").join(INDEX_FILE).exists());
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let names: [&str; 0] = [];
        let err = index(temp_dir.path(), "blankon", "armel", &names, HashAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, Error::RepositoryIndex { .. }));
    }

    #[test]
    fn test_unreadable_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let arch_dir = temp_dir.path().join("blankon").join("amd64");
        fs::create_dir_all(&arch_dir).unwrap();
        fs::write(arch_dir.join("foo_1.0_blankon7.0_amd64.on"), b"not a bundle").unwrap();

        let err = index(temp_dir.path(), "blankon", "amd64", &["foo"], HashAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, Error::RepositoryIndex { .. }));
    }
}
