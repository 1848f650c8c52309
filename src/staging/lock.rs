// src/staging/lock.rs

//! Per-key exclusive lock for staging trees
//!
//! Two builds of the same staging key would share one directory tree and
//! interleave their manifest lines. Each build holds this lock while it
//! writes into the tree.
//!
//! The lock file lives next to the staging directory (`<base>/<key>.lock`)
//! rather than inside it, so it never ends up in an archive. The lock is an
//! `flock(LOCK_EX)` on a separately opened handle, which serializes threads
//! of one process as well as separate processes.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on one staging key, released on drop
#[derive(Debug)]
pub struct StagingLock {
    file: File,
    path: PathBuf,
    key: String,
}

impl StagingLock {
    /// Acquire the lock, blocking while another build holds it
    pub fn acquire(path: impl AsRef<Path>, key: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path, key)?;

        file.lock_exclusive().map_err(|source| Error::Preparation {
            key: key.to_string(),
            path: path.clone(),
            source,
        })?;

        debug!("Acquired staging lock for {} at {}", key, path.display());
        Ok(Self {
            file,
            path,
            key: key.to_string(),
        })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when another build holds it.
    pub fn try_acquire(path: impl AsRef<Path>, key: &str) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path, key)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired staging lock for {} at {}", key, path.display());
                Ok(Some(Self {
                    file,
                    path,
                    key: key.to_string(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Staging lock for {} already held", key);
                Ok(None)
            }
            // fs2 reports contention with the platform's lock error on some targets
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(source) => Err(Error::Preparation {
                key: key.to_string(),
                path,
                source,
            }),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staging key this lock guards
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release staging lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released staging lock for {}", self.key);
        }
    }
}

fn open_lock_file(path: &Path, key: &str) -> Result<File> {
    let preparation = |source| Error::Preparation {
        key: key.to_string(),
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(preparation)?;
    }

    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(preparation)
}
