// src/error.rs

//! Error types for the build pipeline and repository indexer
//!
//! Every variant aborts the current build or index run. Each one carries
//! the package name, staging key, URI or path involved so a failure can be
//! diagnosed from the message alone.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::compression::CompressionError;
use crate::hash::HashError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building bundles or indexing a repository
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file could not be opened or read
    #[error("Cannot read configuration {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    /// The configuration file was read but is invalid
    #[error("Invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The seed file could not be opened or read
    #[error("Cannot read seed {path}: {source}")]
    SeedRead { path: PathBuf, source: io::Error },

    /// The `Packages` index backing the package cache could not be read
    #[error("Cannot read package list {path}: {source}")]
    PackagesRead { path: PathBuf, source: io::Error },

    /// The requested package is not present in the package cache
    #[error("Package '{0}' not found in package cache")]
    PackageNotFound(String),

    /// Strict resolution found a dependency group with no resolvable member
    #[error("No alternative of dependency group '{group}' of '{package}' is available")]
    UnresolvedDependency { package: String, group: String },

    /// A staging directory could not be created
    #[error("Cannot prepare staging directory {path} for {key}: {source}")]
    Preparation {
        key: String,
        path: PathBuf,
        source: io::Error,
    },

    /// A package file could not be fetched into the staging area
    #[error("Failed to download {uri}: {reason}")]
    Download { uri: String, reason: String },

    /// The manifest could not be written, read or verified
    #[error("Manifest error at {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// Control metadata could not be extracted or parsed
    #[error("Cannot extract control metadata from {path}: {reason}")]
    MetadataExtraction { path: PathBuf, reason: String },

    /// The configured compression algorithm is not supported
    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedCompression(String),

    /// The bundle archive could not be written or read
    #[error("Archive error at {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// The publish tree could not be scanned, indexed or synchronized
    #[error("Repository index error at {path}: {reason}")]
    RepositoryIndex { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn download(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn metadata(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MetadataExtraction {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn index(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::RepositoryIndex {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<CompressionError> for Error {
    fn from(err: CompressionError) -> Self {
        match err {
            CompressionError::UnsupportedFormat(name) => Self::UnsupportedCompression(name),
            other => Self::Archive {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<HashError> for Error {
    fn from(err: HashError) -> Self {
        Self::Manifest {
            path: PathBuf::new(),
            reason: err.to_string(),
        }
    }
}
