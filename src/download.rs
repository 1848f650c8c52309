// src/download.rs

//! Package downloads into a staging data directory
//!
//! A build fetches its primary package and every resolved dependency into
//! `data/`. Fetches run concurrently on a bounded worker pool, and
//! [`Downloader::fetch_all`] only returns once all of them have finished,
//! so the manifest always sees the complete set of files.
//!
//! Files are named after the last path segment of their URI. When two
//! URIs map to the same name:
//! - the same URI listed twice is fetched once
//! - a different URI is fetched to a temporary file and compared by
//!   checksum; identical content is accepted, anything else is an error

use crate::error::{Error, Result};
use crate::hash::{hash_file, HashAlgorithm};
use rayon::prelude::*;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Delay between HTTP attempts, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Prefix of in-flight download files inside the data directory
const TEMP_PREFIX: &str = ".fetch-";

/// Transport that copies the content behind a URI to a local file
pub trait Fetch: Send + Sync {
    /// Write the complete content of `uri` to `dest`, returning its size
    ///
    /// `dest` already exists and may be truncated and rewritten.
    fn fetch(&self, uri: &str, dest: &Path) -> Result<u64>;
}

/// Fetcher for `http(s)://` and `file://` URIs and plain local paths
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    attempts: u32,
}

impl HttpFetcher {
    /// Create a fetcher whose HTTP requests expire after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("warsito/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::download("<http client>", format!("cannot create HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            attempts: 1,
        })
    }

    /// Number of attempts per HTTP fetch (at least one)
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    fn fetch_http(&self, uri: &str, dest: &Path) -> Result<u64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_http(uri, dest) {
                Ok(size) => return Ok(size),
                Err(e) if attempt < self.attempts => {
                    warn!("Download attempt {} of {} failed: {}, retrying...", attempt, uri, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
                Err(e) if self.attempts > 1 => {
                    return Err(Error::download(uri, format!("failed after {attempt} attempts: {e}")))
                }
                Err(e) => return Err(Error::download(uri, e)),
            }
        }
    }

    fn try_http(&self, uri: &str, dest: &Path) -> std::result::Result<u64, String> {
        let mut response = self.client.get(uri).send().map_err(|e| {
            if e.is_timeout() {
                self.timed_out()
            } else {
                e.to_string()
            }
        })?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let mut file = File::create(dest).map_err(|e| format!("cannot write {}: {e}", dest.display()))?;
        io::copy(&mut response, &mut file).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => self.timed_out(),
            _ => format!("transfer interrupted: {e}"),
        })
    }

    fn timed_out(&self) -> String {
        format!("timed out after {:?}", self.timeout)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<u64> {
        let source = match Url::parse(uri) {
            Ok(url) => match url.scheme() {
                "http" | "https" => return self.fetch_http(uri, dest),
                "file" => url
                    .to_file_path()
                    .map_err(|()| Error::download(uri, "not a local file URL"))?,
                other => return Err(Error::download(uri, format!("unsupported scheme '{other}'"))),
            },
            Err(_) => PathBuf::from(uri),
        };

        fs::copy(&source, dest).map_err(|e| Error::download(uri, e))
    }
}

/// File name a URI is stored under: its last path segment
pub fn filename_from_uri(uri: &str) -> Option<String> {
    let name = match Url::parse(uri) {
        Ok(url) => url.path_segments().and_then(|s| s.last()).map(String::from),
        Err(_) => Path::new(uri)
            .file_name()
            .map(|n| n.to_string_lossy().to_string()),
    };
    name.filter(|n| !n.is_empty() && n != "." && n != "..")
}

/// A fetch scheduled by [`Downloader::fetch_all`]
struct Job<'u> {
    uri: &'u str,
    filename: String,
}

/// Fetches a build's package files with bounded concurrency
pub struct Downloader<'a> {
    fetcher: &'a dyn Fetch,
    jobs: usize,
    algorithm: HashAlgorithm,
}

impl<'a> Downloader<'a> {
    pub fn new(fetcher: &'a dyn Fetch) -> Self {
        Self {
            fetcher,
            jobs: crate::config::DEFAULT_JOBS,
            algorithm: HashAlgorithm::default(),
        }
    }

    /// Maximum number of concurrent fetches
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Checksum used to compare files that share a name
    pub fn checksum(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Fetch every URI into `data_dir`
    ///
    /// Returns the local path of each URI, in input order. Nothing is
    /// returned until all fetches are done; the first failure is reported.
    pub fn fetch_all(&self, data_dir: &Path, uris: &[String]) -> Result<Vec<PathBuf>> {
        let mut claimed: HashMap<String, &str> = HashMap::new();
        let mut fresh = Vec::new();
        let mut verify = Vec::new();
        let mut paths = Vec::with_capacity(uris.len());

        for uri in uris {
            let filename = filename_from_uri(uri)
                .ok_or_else(|| Error::download(uri.as_str(), "URI has no file name"))?;
            paths.push(data_dir.join(&filename));

            match claimed.get(&filename) {
                Some(first) if *first == uri.as_str() => {
                    debug!("{} listed more than once, fetching once", uri);
                }
                Some(first) => {
                    debug!("{} and {} share the name {}", first, uri, filename);
                    verify.push(Job { uri, filename });
                }
                None => {
                    claimed.insert(filename.clone(), uri);
                    fresh.push(Job { uri, filename });
                }
            }
        }

        info!(
            "Fetching {} files into {} ({} workers)",
            fresh.len(),
            data_dir.display(),
            self.jobs
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| Error::download(data_dir.display().to_string(), format!("cannot start workers: {e}")))?;

        pool.install(|| {
            fresh
                .par_iter()
                .map(|job| self.fetch_one(data_dir, job))
                .collect::<Result<Vec<_>>>()
        })?;

        // Name clashes are checked against the files fetched above
        pool.install(|| {
            verify
                .par_iter()
                .map(|job| self.verify_duplicate(data_dir, job))
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(paths)
    }

    /// Fetch through a temporary file so `dest` is never half written
    fn fetch_one(&self, data_dir: &Path, job: &Job<'_>) -> Result<()> {
        let dest = data_dir.join(&job.filename);
        let temp = self.temp_file(data_dir, job.uri)?;

        let size = self.fetcher.fetch(job.uri, temp.path())?;
        temp.persist(&dest)
            .map_err(|e| Error::download(job.uri, format!("cannot move into {}: {}", dest.display(), e.error)))?;

        debug!("Fetched {} ({} bytes)", job.filename, size);
        Ok(())
    }

    fn verify_duplicate(&self, data_dir: &Path, job: &Job<'_>) -> Result<()> {
        let existing = data_dir.join(&job.filename);
        let temp = self.temp_file(data_dir, job.uri)?;
        self.fetcher.fetch(job.uri, temp.path())?;

        let expected = hash_file(self.algorithm, &existing).map_err(|e| Error::download(job.uri, e))?;
        let actual = hash_file(self.algorithm, temp.path()).map_err(|e| Error::download(job.uri, e))?;

        if expected != actual {
            return Err(Error::download(
                job.uri,
                format!(
                    "conflicting content for {}: {} != {}",
                    job.filename,
                    actual.to_prefixed_string(),
                    expected.to_prefixed_string()
                ),
            ));
        }

        debug!("{} matches the already fetched {}", job.uri, job.filename);
        Ok(())
    }

    fn temp_file(&self, data_dir: &Path, uri: &str) -> Result<tempfile::NamedTempFile> {
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(data_dir)
            .map_err(|e| Error::download(uri, format!("cannot create file in {}: {e}", data_dir.display())))
    }
}
