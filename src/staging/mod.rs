// src/staging/mod.rs

//! Staging directories for bundle builds
//!
//! Each build works in its own tree under the staging base:
//!
//! ```text
//! <base>/
//!   hello_2.10-3_blankon7.0_amd64/        staging root (archived)
//!     blank.manifest
//!     blank.info
//!     data/                               downloaded package files
//!       hello_2.10-3_amd64.deb
//!       libfoo1_1.2_amd64.deb
//!   hello_2.10-3_blankon7.0_amd64.lock    per-key build lock
//! ```
//!
//! The directory name is the staging key, so rebuilding the same package
//! for the same distribution reuses the same tree.

mod lock;

pub use lock::StagingLock;

use crate::cache::PackageRef;
use crate::control::INFO_FILE;
use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILE;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Subdirectory of the staging root holding fetched package files
pub const DATA_DIR: &str = "data";

/// Deterministic identifier of one build: `name_version_<dist>_arch`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey(String);

impl StagingKey {
    /// `dist_key` is the distribution name and version run together
    /// (`blankon7.0`)
    pub fn new(package: &PackageRef, dist_key: &str) -> Self {
        Self(format!(
            "{}_{}_{}_{}",
            package.name, package.version, dist_key, package.architecture
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StagingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parent directory under which staging trees are created
#[derive(Debug, Clone)]
pub struct StagingArea {
    base: PathBuf,
}

impl StagingArea {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create (or reuse) the staging tree for a package
    ///
    /// Existing directories are not an error.
    pub fn prepare(&self, package: &PackageRef, dist_key: &str) -> Result<StagingDirs> {
        let key = StagingKey::new(package, dist_key);
        let root = self.base.join(key.as_str());
        let data_dir = root.join(DATA_DIR);

        fs::create_dir_all(&data_dir).map_err(|source| Error::Preparation {
            key: key.to_string(),
            path: data_dir.clone(),
            source,
        })?;

        debug!("Prepared staging tree {}", root.display());
        Ok(StagingDirs {
            key,
            root,
            data_dir,
        })
    }

    /// Take the build lock for a key, blocking until it is free
    pub fn lock(&self, key: &StagingKey) -> Result<StagingLock> {
        let path = self.lock_path(key);
        if let Some(lock) = StagingLock::try_acquire(&path, key.as_str())? {
            return Ok(lock);
        }

        info!("Waiting for another build of {} in {}", key, self.base.display());
        StagingLock::acquire(path, key.as_str())
    }

    /// Location of a key's lock file (outside its staging root)
    pub fn lock_path(&self, key: &StagingKey) -> PathBuf {
        self.base.join(format!("{}.lock", key))
    }
}

/// The directories of one staging tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDirs {
    pub key: StagingKey,
    /// Tree that becomes the archive payload
    pub root: PathBuf,
    /// Where package files are fetched to
    pub data_dir: PathBuf,
}

impl StagingDirs {
    /// Remove manifest and info files left behind by an earlier build
    ///
    /// Both files are appended to, so a reused tree must start without them.
    /// Fetched package files are kept.
    pub fn reset_outputs(&self) -> Result<()> {
        for name in [MANIFEST_FILE, INFO_FILE] {
            let path = self.root.join(name);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed stale {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(Error::Preparation {
                        key: self.key.to_string(),
                        path,
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    /// Delete files in `data/` that are not in `keep`
    ///
    /// A reused tree may still hold packages from an earlier build whose
    /// dependencies have since changed.
    pub fn retain_data(&self, keep: &[PathBuf]) -> Result<usize> {
        let preparation = |path: &Path, source| Error::Preparation {
            key: self.key.to_string(),
            path: path.to_path_buf(),
            source,
        };

        let mut removed = 0;
        for entry in fs::read_dir(&self.data_dir).map_err(|e| preparation(&self.data_dir, e))? {
            let path = entry.map_err(|e| preparation(&self.data_dir, e))?.path();
            if path.is_file() && !keep.contains(&path) {
                fs::remove_file(&path).map_err(|e| preparation(&path, e))?;
                debug!("Removed stale {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn info_path(&self) -> PathBuf {
        self.root.join(INFO_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hello() -> PackageRef {
        PackageRef::new("hello", "2.10-3", "amd64", "file:///pool/hello_2.10-3_amd64.deb")
    }

    #[test]
    fn test_staging_key_format() {
        let key = StagingKey::new(&hello(), "blankon7.0");
        assert_eq!(key.as_str(), "hello_2.10-3_blankon7.0_amd64");
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let area = StagingArea::new(temp_dir.path());

        let first = area.prepare(&hello(), "blankon7.0").unwrap();
        assert!(first.data_dir.is_dir());
        assert_eq!(first.data_dir, first.root.join("data"));
        assert_eq!(first.root, temp_dir.path().join("hello_2.10-3_blankon7.0_amd64"));

        let second = area.prepare(&hello(), "blankon7.0").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_prepare_failure() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let area = StagingArea::new(&blocker);
        let err = area.prepare(&hello(), "blankon7.0").unwrap_err();
        assert!(matches!(err, Error::Preparation { ref key, .. } if key == "hello_2.10-3_blankon7.0_amd64"));
    }

    #[test]
    fn test_reset_outputs_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let dirs = StagingArea::new(temp_dir.path())
            .prepare(&hello(), "blankon7.0")
            .unwrap();

        fs::write(dirs.manifest_path(), "stale\n").unwrap();
        fs::write(dirs.info_path(), "stale\n").unwrap();
        fs::write(dirs.data_dir.join("hello_2.10-3_amd64.deb"), b"deb").unwrap();

        dirs.reset_outputs().unwrap();
        assert!(!dirs.manifest_path().exists());
        assert!(!dirs.info_path().exists());
        assert!(dirs.data_dir.join("hello_2.10-3_amd64.deb").exists());

        // Nothing to remove is fine
        dirs.reset_outputs().unwrap();
    }

    #[test]
    fn test_retain_data() {
        let temp_dir = TempDir::new().unwrap();
        let dirs = StagingArea::new(temp_dir.path())
            .prepare(&hello(), "blankon7.0")
            .unwrap();
        let keep = dirs.data_dir.join("hello_2.10-3_amd64.deb");
        fs::write(&keep, b"deb").unwrap();
        fs::write(dirs.data_dir.join("libold_0.9_amd64.deb"), b"old").unwrap();

        assert_eq!(dirs.retain_data(&[keep.clone()]).unwrap(), 1);
        assert!(keep.exists());
        assert!(!dirs.data_dir.join("libold_0.9_amd64.deb").exists());
    }

    #[test]
    fn test_lock_lives_outside_root() {
        let temp_dir = TempDir::new().unwrap();
        let area = StagingArea::new(temp_dir.path());
        let dirs = area.prepare(&hello(), "blankon7.0").unwrap();

        let lock = area.lock(&dirs.key).unwrap();
        assert!(!lock.path().starts_with(&dirs.root));
        assert_eq!(
            lock.path(),
            temp_dir.path().join("hello_2.10-3_blankon7.0_amd64.lock")
        );
    }

    #[test]
    fn test_lock_waits_for_holder() {
        let temp_dir = TempDir::new().unwrap();
        let area = StagingArea::new(temp_dir.path());
        let dirs = area.prepare(&hello(), "blankon7.0").unwrap();

        let held = area.lock(&dirs.key).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::scope(|s| {
            s.spawn(|| {
                let _lock = area.lock(&dirs.key).unwrap();
                tx.send(()).unwrap();
            });

            // Still held, so the second build cannot have started
            assert!(rx.recv_timeout(std::time::Duration::from_millis(200)).is_err());
            drop(held);
            rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
        });
    }
}
