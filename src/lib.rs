// src/lib.rs

//! Warsito bundle builder
//!
//! Repackages a binary Debian package, together with the dependencies that
//! are not already part of a base image, into a single `.on` bundle for a
//! derivative distribution, and maintains a browsable repository of those
//! bundles.
//!
//! # Architecture
//!
//! - Resolution: first-level dependency groups only, seed packages excluded
//! - Staging: one directory tree per `name_version_dist_arch` key, locked
//!   for the duration of a build
//! - Bundles: tarball of the staging tree (manifest, control info, package
//!   files) in a self-describing compression format
//! - Repository: bundles published per architecture and indexed into
//!   append-only `Packages.info` files

pub mod archive;
pub mod builder;
pub mod cache;
pub mod compression;
pub mod config;
pub mod control;
pub mod download;
mod error;
pub mod hash;
pub mod manifest;
pub mod repository;
pub mod resolver;
pub mod seed;
pub mod staging;

pub use builder::{build_all, build_package, BuildArtifact, BuildContext};
pub use cache::{DependencyGroup, MemoryCache, PackageCache, PackageRef, PackagesFileCache};
pub use compression::CompressionAlgorithm;
pub use config::BuildConfig;
pub use control::ControlInfo;
pub use download::{Downloader, Fetch, HttpFetcher};
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use manifest::{Manifest, ManifestBuilder};
pub use repository::IndexRecord;
pub use resolver::{DependencyResolver, FirstAvailable, SelectionPolicy};
pub use seed::Seed;
pub use staging::{StagingArea, StagingDirs, StagingKey};
