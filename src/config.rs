// src/config.rs

//! Build configuration
//!
//! The configuration is a flat file of `KEY="value"` lines:
//!
//! ```text
//! DIST="blankon"
//! DISTVERSION="7.0"
//! RESULTDIR="/var/cache/warsito/result"
//! ARCH="i386,amd64,armel"
//! COMPRESSION="bzip2"
//! PUBLICDIR="/srv/warsito/public"
//! ```
//!
//! Blank lines and `#` comments are skipped. Every key must be one of the
//! known keys below; anything else is a configuration error rather than
//! being silently ignored.

use crate::compression::CompressionAlgorithm;
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Keys that must be present
pub const REQUIRED_KEYS: &[&str] = &["DIST", "DISTVERSION", "RESULTDIR", "ARCH"];

/// Keys that may be present
pub const OPTIONAL_KEYS: &[&str] = &[
    "COMPRESSION",
    "PUBLICDIR",
    "STAGINGDIR",
    "CHECKSUM",
    "JOBS",
    "TIMEOUT",
    "STRICTDEPS",
];

/// Default number of concurrent downloads per build
pub const DEFAULT_JOBS: usize = 4;

/// Default per-fetch timeout (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only parameters for one or more builds
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Distribution name (`DIST`)
    pub distribution: String,
    /// Distribution version (`DISTVERSION`)
    pub distribution_version: String,
    /// Architectures served by the repository (`ARCH`)
    pub architectures: Vec<String>,
    /// Where finished bundles are written (`RESULTDIR`)
    pub result_dir: PathBuf,
    /// Bundle codec (`COMPRESSION`, bzip2 when absent)
    pub compression: CompressionAlgorithm,
    /// Root of the published repository tree (`PUBLICDIR`)
    pub publish_dir: Option<PathBuf>,
    /// Parent of the per-key staging directories (`STAGINGDIR`)
    pub staging_dir: PathBuf,
    /// Checksum used in manifests and index records (`CHECKSUM`)
    pub checksum: HashAlgorithm,
    /// Concurrent downloads per build (`JOBS`)
    pub jobs: usize,
    /// Per-fetch timeout (`TIMEOUT`, seconds)
    pub timeout: Duration,
    /// Fail on dependency groups with no available alternative (`STRICTDEPS`)
    pub strict_dependencies: bool,
}

impl BuildConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let invalid = |message: String| Error::Config {
            path: origin.to_path_buf(),
            message,
        };

        let mut values: HashMap<&str, String> = HashMap::new();

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(invalid(format!("line {}: expected KEY=\"value\"", lineno + 1)));
            };
            let key = key.trim();
            let value = unquote(value.trim());

            let known = REQUIRED_KEYS
                .iter()
                .chain(OPTIONAL_KEYS)
                .copied()
                .find(|k| *k == key)
                .ok_or_else(|| invalid(format!("line {}: unknown configuration item '{}'", lineno + 1, key)))?;

            if values.insert(known, value.to_string()).is_some() {
                return Err(invalid(format!("line {}: duplicate key '{}'", lineno + 1, key)));
            }
        }

        for key in REQUIRED_KEYS {
            match values.get(key) {
                Some(v) if !v.is_empty() => {}
                _ => return Err(invalid(format!("missing required key '{}'", key))),
            }
        }

        let architectures: Vec<String> = values["ARCH"]
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
        if architectures.is_empty() {
            return Err(invalid("ARCH lists no architectures".to_string()));
        }

        let compression = CompressionAlgorithm::from_config(values.get("COMPRESSION").map(String::as_str))?;

        let checksum = match values.get("CHECKSUM") {
            Some(v) => v
                .parse::<HashAlgorithm>()
                .map_err(|e| invalid(format!("CHECKSUM: {}", e)))?,
            None => HashAlgorithm::default(),
        };

        let jobs = match values.get("JOBS") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid(format!("JOBS must be a positive integer, got '{}'", v))),
            },
            None => DEFAULT_JOBS,
        };

        let timeout = match values.get("TIMEOUT") {
            Some(v) => v
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| invalid(format!("TIMEOUT must be a number of seconds, got '{}'", v)))?,
            None => DEFAULT_TIMEOUT,
        };

        let strict_dependencies = match values.get("STRICTDEPS").map(|v| v.to_lowercase()) {
            None => false,
            Some(v) => match v.as_str() {
                "yes" | "true" | "1" => true,
                "no" | "false" | "0" => false,
                _ => return Err(invalid(format!("STRICTDEPS must be yes or no, got '{}'", v))),
            },
        };

        let config = Self {
            distribution: values["DIST"].clone(),
            distribution_version: values["DISTVERSION"].clone(),
            architectures,
            result_dir: PathBuf::from(&values["RESULTDIR"]),
            compression,
            publish_dir: values.get("PUBLICDIR").filter(|v| !v.is_empty()).map(PathBuf::from),
            staging_dir: values
                .get("STAGINGDIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            checksum,
            jobs,
            timeout,
            strict_dependencies,
        };

        debug!(
            "Loaded configuration for {} ({} architectures, {} compression)",
            config.distribution_key(),
            config.architectures.len(),
            config.compression
        );

        Ok(config)
    }

    /// Distribution component of the staging key (`DIST` + `DISTVERSION`)
    pub fn distribution_key(&self) -> String {
        format!("{}{}", self.distribution, self.distribution_version)
    }

    /// Publish root, or a configuration error naming the missing key
    pub fn require_publish_dir(&self) -> Result<&Path> {
        self.publish_dir.as_deref().ok_or_else(|| Error::Config {
            path: PathBuf::new(),
            message: "PUBLICDIR is required for publishing and indexing".to_string(),
        })
    }
}

/// Strip one pair of matching surrounding quotes
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
DIST="blankon"
DISTVERSION="7.0"
RESULTDIR="/var/cache/warsito/result"
ARCH="i386, amd64,armel"
"#;

    fn parse(content: &str) -> Result<BuildConfig> {
        BuildConfig::parse(content, Path::new("warsito.conf"))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();

        assert_eq!(config.distribution, "blankon");
        assert_eq!(config.distribution_version, "7.0");
        assert_eq!(config.distribution_key(), "blankon7.0");
        assert_eq!(config.architectures, vec!["i386", "amd64", "armel"]);
        assert_eq!(config.result_dir, PathBuf::from("/var/cache/warsito/result"));
        assert_eq!(config.compression, CompressionAlgorithm::Bzip2);
        assert_eq!(config.checksum, HashAlgorithm::Sha256);
        assert_eq!(config.jobs, DEFAULT_JOBS);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.publish_dir.is_none());
        assert!(!config.strict_dependencies);
    }

    #[test]
    fn test_optional_keys() {
        let content = format!(
            "{MINIMAL}\n# bundle settings\nCOMPRESSION=gzip\nPUBLICDIR='/srv/public'\nCHECKSUM=\"md5\"\nJOBS=8\nTIMEOUT=5\nSTRICTDEPS=yes\n"
        );
        let config = parse(&content).unwrap();

        assert_eq!(config.compression, CompressionAlgorithm::Gzip);
        assert_eq!(config.publish_dir, Some(PathBuf::from("/srv/public")));
        assert_eq!(config.checksum, HashAlgorithm::Md5);
        assert_eq!(config.jobs, 8);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.strict_dependencies);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let content = format!("{MINIMAL}MIRROR=\"http://example.org\"\n");
        let err = parse(&content).unwrap_err();
        assert!(matches!(err, Error::Config { ref message, .. } if message.contains("MIRROR")));
    }

    #[test]
    fn test_missing_required_key() {
        let err = parse("DIST=\"blankon\"\nARCH=amd64\n").unwrap_err();
        assert!(matches!(err, Error::Config { ref message, .. } if message.contains("DISTVERSION")));
    }

    #[test]
    fn test_unsupported_compression() {
        let content = format!("{MINIMAL}COMPRESSION=\"rar\"\n");
        assert!(matches!(parse(&content), Err(Error::UnsupportedCompression(name)) if name == "rar"));
    }

    #[test]
    fn test_malformed_line() {
        let content = format!("{MINIMAL}this is not a setting\n");
        assert!(matches!(parse(&content), Err(Error::Config { .. })));
    }

    #[test]
    fn test_unreadable_file() {
        let err = BuildConfig::load("/nonexistent/warsito.conf").unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warsito.conf");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.distribution, "blankon");
    }
}
