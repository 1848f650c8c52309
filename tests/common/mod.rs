// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use warsito::{BuildConfig, DependencyGroup, MemoryCache, PackageRef};

/// Build a minimal but real `.deb` in `dir` and return its path.
///
/// The package has a gzip control tarball with a `control` file and a
/// data tarball holding one file under `/usr/share/doc/<name>/`.
pub fn build_deb(dir: &Path, name: &str, version: &str, arch: &str) -> PathBuf {
    let control = format!(
        "Package: {name}\n\
         Version: {version}\n\
         Architecture: {arch}\n\
         Maintainer: Test Suite <tests@example.org>\n\
         Section: utils\n\
         Homepage: https://example.org/{name}\n\
         Description: {name} test package\n \
         Built by the integration test fixtures.\n"
    );
    let control_tar = gzip_tar(&[("./control", control.as_bytes())]);

    let doc = format!("{name} {version}\n");
    let doc_path = format!("./usr/share/doc/{name}/README");
    let data_tar = gzip_tar(&[(doc_path.as_str(), doc.as_bytes())]);

    let deb_path = dir.join(format!("{name}_{version}_{arch}.deb"));
    let mut deb = ar::Builder::new(File::create(&deb_path).unwrap());
    deb.append(&ar::Header::new(b"debian-binary".to_vec(), 4), &b"2.0\n"[..])
        .unwrap();
    deb.append(
        &ar::Header::new(b"control.tar.gz".to_vec(), control_tar.len() as u64),
        control_tar.as_slice(),
    )
    .unwrap();
    deb.append(
        &ar::Header::new(b"data.tar.gz".to_vec(), data_tar.len() as u64),
        data_tar.as_slice(),
    )
    .unwrap();

    deb_path
}

fn gzip_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// `file://` URI of a local path
pub fn file_uri(path: &Path) -> String {
    url::Url::from_file_path(path).unwrap().to_string()
}

/// A package pool, a cache describing it and a configuration whose
/// directories all live in one temporary directory.
pub struct Fixture {
    pub temp_dir: TempDir,
    pub pool: PathBuf,
    pub cache: MemoryCache,
    pub config: BuildConfig,
}

impl Fixture {
    /// Add a package to the pool and the cache
    pub fn add_package(&mut self, name: &str, version: &str, depends: &[&[&str]]) -> PackageRef {
        let deb = build_deb(&self.pool, name, version, "amd64");
        let package = PackageRef::new(name, version, "amd64", file_uri(&deb)).with_depends(
            depends
                .iter()
                .map(|group| DependencyGroup::new(group.iter().copied()))
                .collect(),
        );
        self.cache.insert(package.clone());
        package
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }
}

/// Create a fixture with `extra` appended to the configuration file.
pub fn fixture_with(extra: &str) -> Fixture {
    let temp_dir = tempfile::tempdir().unwrap();
    let pool = temp_dir.path().join("pool");
    fs::create_dir_all(&pool).unwrap();

    let content = format!(
        "DIST=\"blankon\"\n\
         DISTVERSION=\"7.0\"\n\
         ARCH=\"amd64,i386\"\n\
         RESULTDIR=\"{}\"\n\
         STAGINGDIR=\"{}\"\n\
         PUBLICDIR=\"{}\"\n\
         JOBS=2\n\
         {extra}\n",
        temp_dir.path().join("result").display(),
        temp_dir.path().join("staging").display(),
        temp_dir.path().join("public").display(),
    );
    let config_path = temp_dir.path().join("warsito.conf");
    fs::write(&config_path, content).unwrap();
    let config = BuildConfig::load(&config_path).unwrap();

    Fixture {
        temp_dir,
        pool,
        cache: MemoryCache::new(),
        config,
    }
}

/// Fixture with `foo` depending on `bar | baz` and `libc`, where only
/// `bar` and `libc` exist.
pub fn foo_fixture() -> Fixture {
    let mut fixture = fixture_with("");
    fixture.add_package("foo", "1.0", &[&["bar", "baz"], &["libc"]]);
    fixture.add_package("bar", "2.1", &[]);
    fixture.add_package("libc", "2.36", &[]);
    fixture
}
