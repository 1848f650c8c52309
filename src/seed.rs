// src/seed.rs

//! Seed (base image) manifests
//!
//! A seed lists the packages already installed in the target base image.
//! Those packages are never bundled. The format follows the Ubuntu seed
//! convention:
//!
//! ```text
//! # Base system
//!  * coreutils
//!  * (bash)          # parentheses are stripped
//! Free text lines are ignored.
//! ```

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Ordered, duplicate-free set of base package names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seed {
    order: Vec<String>,
    members: HashSet<String>,
}

impl Seed {
    /// An empty seed (nothing is excluded)
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a seed file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::SeedRead {
            path: path.to_path_buf(),
            source,
        })?;

        let seed = Self::parse(&content);
        debug!("Loaded {} base packages from {}", seed.len(), path.display());
        Ok(seed)
    }

    /// Parse seed text
    pub fn parse(content: &str) -> Self {
        let mut seed = Self::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim_start();
            if line.starts_with('#') {
                continue;
            }
            let Some(rest) = line.strip_prefix('*') else {
                continue;
            };

            let name: String = rest
                .split_whitespace()
                .next()
                .unwrap_or("")
                .chars()
                .filter(|c| *c != '(' && *c != ')')
                .collect();

            if name.is_empty() {
                debug!("Skipping seed line {}: list marker without a package name", lineno + 1);
                continue;
            }
            seed.insert(name);
        }

        seed
    }

    /// Add a package name; returns false if it was already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.members.contains(&name) {
            return false;
        }
        self.members.insert(name.clone());
        self.order.push(name);
        true
    }

    /// Check whether a package belongs to the base image
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    /// Base package names in order of first appearance
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Seed {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut seed = Self::new();
        for name in iter {
            seed.insert(name);
        }
        seed
    }
}
