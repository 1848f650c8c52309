// src/archive.rs

//! Bundle archives
//!
//! A bundle is a tarball of one staging tree, compressed with the
//! configured codec and written to `<result_dir>/<key>.on`:
//!
//! ```text
//! hello_2.10-3_blankon7.0_amd64/
//!   blank.info
//!   blank.manifest
//!   data/hello_2.10-3_amd64.deb
//! ```
//!
//! The file name does not change with the codec. Readers detect it from
//! the magic bytes at the start of the stream.

use crate::compression::{create_decoder_auto, CompressionAlgorithm, Encoder};
use crate::control::{ControlInfo, INFO_FILE};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// File extension of bundle archives
pub const ARTIFACT_EXTENSION: &str = "on";

/// Compress a staging tree into `<result_dir>/<key>.on`
///
/// `root` is the staging root; its directory name is the key. The archive
/// is written to a temporary file in `result_dir` and renamed into place,
/// so a failed run never leaves a partial artifact behind.
pub fn compress(root: &Path, result_dir: &Path, algorithm: CompressionAlgorithm) -> Result<PathBuf> {
    let key = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::archive(root, "staging root has no directory name"))?;
    let output = result_dir.join(format!("{}.{}", key, ARTIFACT_EXTENSION));

    std::fs::create_dir_all(result_dir).map_err(|e| Error::archive(result_dir, e))?;

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", key))
        .suffix(".partial")
        .tempfile_in(result_dir)
        .map_err(|e| Error::archive(result_dir, e))?;

    let encoder = Encoder::new(BufWriter::new(temp.as_file()), algorithm)?;
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    builder
        .append_dir_all(&key, root)
        .map_err(|e| Error::archive(root, e))?;

    let encoder = builder.into_inner().map_err(|e| Error::archive(&output, e))?;
    let writer = encoder.finish().map_err(|e| Error::archive(&output, e))?;
    writer
        .into_inner()
        .map_err(|e| Error::archive(&output, e.error()))?
        .sync_all()
        .map_err(|e| Error::archive(&output, e))?;

    temp.persist(&output)
        .map_err(|e| Error::archive(&output, e.error))?;

    info!("Created {} ({} compression)", output.display(), algorithm);
    Ok(output)
}

/// Compress with a codec given by name, as read from configuration
///
/// The name is checked before anything is written; `None` selects bzip2.
pub fn compress_named(root: &Path, result_dir: &Path, compression: Option<&str>) -> Result<PathBuf> {
    let algorithm = CompressionAlgorithm::from_config(compression)?;
    compress(root, result_dir, algorithm)
}

/// Codec of an existing artifact, from its magic bytes
pub fn detect_compression(artifact: &Path) -> Result<CompressionAlgorithm> {
    let mut magic = Vec::with_capacity(6);
    File::open(artifact)
        .map_err(|e| Error::archive(artifact, e))?
        .take(6)
        .read_to_end(&mut magic)
        .map_err(|e| Error::archive(artifact, e))?;
    Ok(CompressionAlgorithm::from_magic_bytes(&magic))
}

/// Read the embedded `blank.info` of an artifact
pub fn read_info(artifact: &Path) -> Result<ControlInfo> {
    let file = File::open(artifact).map_err(|e| Error::archive(artifact, e))?;
    let (format, decoder) = create_decoder_auto(BufReader::new(file)).map_err(|e| Error::archive(artifact, e))?;
    debug!("Reading {} as {}", artifact.display(), format);

    let mut tarball = tar::Archive::new(decoder);
    let entries = tarball.entries().map_err(|e| Error::archive(artifact, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::archive(artifact, e))?;
        let path = entry.path().map_err(|e| Error::archive(artifact, e))?.into_owned();
        if !is_top_level_info(&path) {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| Error::archive(artifact, e))?;
        return ControlInfo::parse(&content)
            .map_err(|e| Error::archive(artifact, format!("invalid {}: {}", INFO_FILE, e)));
    }

    Err(Error::archive(artifact, format!("no {} in archive", INFO_FILE)))
}

/// Matches `<key>/blank.info`
fn is_top_level_info(path: &Path) -> bool {
    let components: Vec<_> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    components.len() == 2 && components[1].as_os_str() == INFO_FILE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const INFO: &str = "Package: hello\nVersion: 1.0\nArchitecture: amd64\nDescription: greeting\n";

    fn staging_tree(temp_dir: &TempDir) -> PathBuf {
        let root = temp_dir.path().join("staging").join("hello_1.0_blankon7.0_amd64");
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(root.join(INFO_FILE), INFO).unwrap();
        fs::write(root.join("blank.manifest"), "hello_1.0_amd64.deb : md5:d41d8cd98f00b204e9800998ecf8427e\n").unwrap();
        fs::write(root.join("data").join("hello_1.0_amd64.deb"), b"").unwrap();
        root
    }

    fn members(artifact: &Path) -> Vec<String> {
        let (_, decoder) = create_decoder_auto(File::open(artifact).unwrap()).unwrap();
        let mut names: Vec<String> = tar::Archive::new(decoder)
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_default_is_bzip2() {
        let temp_dir = TempDir::new().unwrap();
        let root = staging_tree(&temp_dir);
        let result_dir = temp_dir.path().join("result");

        let artifact = compress_named(&root, &result_dir, None).unwrap();
        assert_eq!(artifact, result_dir.join("hello_1.0_blankon7.0_amd64.on"));
        assert_eq!(detect_compression(&artifact).unwrap(), CompressionAlgorithm::Bzip2);
    }

    #[test]
    fn test_payload_under_key_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = staging_tree(&temp_dir);
        let result_dir = temp_dir.path().join("result");

        let artifact = compress(&root, &result_dir, CompressionAlgorithm::Gzip).unwrap();
        assert_eq!(
            members(&artifact),
            vec![
                "hello_1.0_blankon7.0_amd64",
                "hello_1.0_blankon7.0_amd64/blank.info",
                "hello_1.0_blankon7.0_amd64/blank.manifest",
                "hello_1.0_blankon7.0_amd64/data",
                "hello_1.0_blankon7.0_amd64/data/hello_1.0_amd64.deb",
            ]
        );
    }

    #[test]
    fn test_every_codec_is_readable() {
        let temp_dir = TempDir::new().unwrap();
        let root = staging_tree(&temp_dir);

        for name in ["none", "gzip", "bzip2", "lzma", "zstd"] {
            let result_dir = temp_dir.path().join(name);
            let artifact = compress_named(&root, &result_dir, Some(name)).unwrap();

            assert_eq!(detect_compression(&artifact).unwrap().name(), name);
            let info = read_info(&artifact).unwrap();
            assert_eq!(info.package, "hello");
            assert_eq!(info.version, "1.0");
        }
    }

    #[test]
    fn test_unsupported_compression_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let root = staging_tree(&temp_dir);
        let result_dir = temp_dir.path().join("result");

        let err = compress_named(&root, &result_dir, Some("rar")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression(ref name) if name == "rar"));
        assert!(!result_dir.exists());
    }

    #[test]
    fn test_failed_compress_leaves_no_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let result_dir = temp_dir.path().join("result");
        let missing_root = temp_dir.path().join("staging").join("ghost_1.0_blankon7.0_amd64");

        assert!(compress(&missing_root, &result_dir, CompressionAlgorithm::Gzip).is_err());
        assert_eq!(fs::read_dir(&result_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_read_info_requires_info_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("bare_1.0_blankon7.0_amd64");
        fs::create_dir_all(root.join("data")).unwrap();

        let artifact = compress(&root, temp_dir.path(), CompressionAlgorithm::Zstd).unwrap();
        assert!(matches!(read_info(&artifact), Err(Error::Archive { .. })));
    }
}
