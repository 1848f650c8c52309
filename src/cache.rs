// src/cache.rs

//! Package cache lookups
//!
//! The package cache is the read-only store the resolver queries by name.
//! Builds receive it as an explicit `&dyn PackageCache` handle so several
//! builds can share one cache across threads without locking.
//!
//! Two implementations are provided:
//! - [`MemoryCache`]: records inserted programmatically
//! - [`PackagesFileCache`]: a Debian `Packages` index plus a mirror URL

use crate::control::parse_paragraphs;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered alternatives of which any one satisfies the dependency
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyGroup {
    alternatives: Vec<String>,
}

impl DependencyGroup {
    pub fn new<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            alternatives: alternatives.into_iter().map(Into::into).collect(),
        }
    }

    /// Alternatives in declared order
    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }
}

impl fmt::Display for DependencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alternatives.join(" | "))
    }
}

/// A package record as stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
    pub architecture: String,
    /// Where the package file can be fetched from
    pub uri: String,
    /// First-level mandatory dependency groups, in declared order
    pub depends: Vec<DependencyGroup>,
}

impl PackageRef {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            architecture: architecture.into(),
            uri: uri.into(),
            depends: Vec::new(),
        }
    }

    /// Builder-style helper to attach dependency groups
    pub fn with_depends(mut self, depends: Vec<DependencyGroup>) -> Self {
        self.depends = depends;
        self
    }
}

/// Read-only lookup of package records by name
pub trait PackageCache: Send + Sync {
    /// Look up a package by exact name
    fn get(&self, name: &str) -> Option<PackageRef>;

    /// Check whether a package is known
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// In-memory package cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    packages: HashMap<String, PackageRef>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any previous record with the same name
    pub fn insert(&mut self, package: PackageRef) {
        self.packages.insert(package.name.clone(), package);
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl FromIterator<PackageRef> for MemoryCache {
    fn from_iter<I: IntoIterator<Item = PackageRef>>(iter: I) -> Self {
        let mut cache = Self::new();
        for package in iter {
            cache.insert(package);
        }
        cache
    }
}

impl PackageCache for MemoryCache {
    fn get(&self, name: &str) -> Option<PackageRef> {
        self.packages.get(name).cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }
}

/// Package cache backed by a Debian `Packages` index
///
/// Download URIs are the mirror base URL joined with each stanza's
/// `Filename`. When a name appears in several stanzas the first one wins.
#[derive(Debug, Clone)]
pub struct PackagesFileCache {
    inner: MemoryCache,
}

impl PackagesFileCache {
    /// Load a `Packages` file from disk
    pub fn load(path: impl AsRef<Path>, mirror: &str) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| Error::PackagesRead {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let cache = Self::parse(&content, mirror);
        debug!(
            "Loaded {} packages from {}",
            cache.inner.len(),
            path.as_ref().display()
        );
        Ok(cache)
    }

    /// Parse the content of a `Packages` file
    pub fn parse(content: &str, mirror: &str) -> Self {
        let mirror = mirror.trim_end_matches('/');
        let mut inner = MemoryCache::new();

        for paragraph in parse_paragraphs(content) {
            let Some(name) = paragraph.get("Package") else {
                continue;
            };
            if inner.contains(name) {
                continue;
            }
            let Some(filename) = paragraph.get("Filename") else {
                warn!("Skipping {}: stanza has no Filename", name);
                continue;
            };

            let mut depends = Vec::new();
            for field in ["Pre-Depends", "Depends"] {
                if let Some(value) = paragraph.get(field) {
                    depends.extend(parse_depends(value));
                }
            }

            let package = PackageRef::new(
                name,
                paragraph.get("Version").unwrap_or_default(),
                paragraph.get("Architecture").unwrap_or_default(),
                format!("{}/{}", mirror, filename.trim_start_matches('/')),
            )
            .with_depends(depends);
            inner.insert(package);
        }

        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PackageCache for PackagesFileCache {
    fn get(&self, name: &str) -> Option<PackageRef> {
        self.inner.get(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }
}

/// Parse a Debian dependency field into groups of bare package names
///
/// Version constraints (`(>= 1.0)`), architecture restrictions (`[amd64]`),
/// build profiles (`<!nocheck>`) and architecture qualifiers (`:any`) are
/// dropped: resolution only looks at names.
pub fn parse_depends(field: &str) -> Vec<DependencyGroup> {
    field
        .split(',')
        .map(|group| {
            DependencyGroup::new(
                group
                    .split('|')
                    .filter_map(|alternative| {
                        let name = alternative
                            .split(|c: char| c.is_whitespace() || matches!(c, '(' | '[' | '<'))
                            .find(|token| !token.is_empty())?;
                        let name = name.split(':').next().unwrap_or(name);
                        (!name.is_empty()).then(|| name.to_string())
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .filter(|group| !group.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGES: &str = "\
Package: hello
Version: 2.10-3
Architecture: amd64
Pre-Depends: dpkg (>= 1.15)
Depends: libc6 (>= 2.34), libfoo1 | libbar1 [amd64], perl:any
Filename: pool/main/h/hello/hello_2.10-3_amd64.deb
Description: example package based on GNU hello
 The GNU hello program produces a familiar, friendly greeting.

Package: libc6
Version: 2.36-9
Architecture: amd64
Filename: pool/main/g/glibc/libc6_2.36-9_amd64.deb

Package: hello
Version: 1.0
Architecture: amd64
Filename: pool/main/h/hello/hello_1.0_amd64.deb

Package: broken
Version: 1.0
";

    #[test]
    fn test_parse_depends() {
        let groups = parse_depends("libc6 (>= 2.34), libfoo1 | libbar1 [amd64], perl:any");
        assert_eq!(
            groups,
            vec![
                DependencyGroup::new(["libc6"]),
                DependencyGroup::new(["libfoo1", "libbar1"]),
                DependencyGroup::new(["perl"]),
            ]
        );
    }

    #[test]
    fn test_parse_depends_empty() {
        assert!(parse_depends("").is_empty());
        assert!(parse_depends(" , ").is_empty());
    }

    #[test]
    fn test_packages_file_cache() {
        let cache = PackagesFileCache::parse(PACKAGES, "http://deb.example.org/debian/");
        assert_eq!(cache.len(), 2);

        let hello = cache.get("hello").unwrap();
        assert_eq!(hello.version, "2.10-3");
        assert_eq!(hello.architecture, "amd64");
        assert_eq!(
            hello.uri,
            "http://deb.example.org/debian/pool/main/h/hello/hello_2.10-3_amd64.deb"
        );
        // Pre-Depends come first
        assert_eq!(hello.depends[0], DependencyGroup::new(["dpkg"]));
        assert_eq!(hello.depends.len(), 4);

        assert!(cache.contains("libc6"));
        assert!(!cache.contains("broken"));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_memory_cache_from_iter() {
        let cache: MemoryCache = vec![
            PackageRef::new("foo", "1.0", "amd64", "file:///pool/foo_1.0_amd64.deb"),
            PackageRef::new("bar", "2.0", "all", "file:///pool/bar_2.0_all.deb"),
        ]
        .into_iter()
        .collect();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("bar").unwrap().version, "2.0");
    }

    #[test]
    fn test_load_missing_packages_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("Packages");

        let err = PackagesFileCache::load(&path, "http://deb.example.org/debian").unwrap_err();
        assert!(matches!(err, Error::PackagesRead { path: ref failed, .. } if *failed == path));

        std::fs::write(&path, PACKAGES).unwrap();
        let cache = PackagesFileCache::load(&path, "http://deb.example.org/debian").unwrap();
        assert!(cache.contains("hello"));
    }
}
