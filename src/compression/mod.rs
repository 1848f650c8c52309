// src/compression/mod.rs
//! Unified compression/decompression utilities
//!
//! Provides one interface over the codecs used for bundles (gzip, bzip2,
//! lzma/xz, zstd) and for reading the control members of DEB packages.
//! Bundles keep the `.on` extension whatever the codec, so readers detect
//! the format from the stream's magic bytes.

use std::io::{self, Read, Write};
use std::str::FromStr;
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} encoder: {source}")]
    EncoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Unsupported compression format: {0}")]
    UnsupportedFormat(String),
}

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    /// No compression (plain tar)
    None,
    /// Gzip compression
    Gzip,
    /// Bzip2 compression, the default for bundles
    #[default]
    Bzip2,
    /// LZMA2 in an XZ container
    Lzma,
    /// Zstandard compression
    Zstd,
}

impl CompressionAlgorithm {
    /// Resolve an optional configured name, falling back to the default
    ///
    /// An absent value selects bzip2; an unknown value is an error.
    pub fn from_config(value: Option<&str>) -> Result<Self, CompressionError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(name) => name.parse(),
        }
    }

    /// Detect compression format from file extension
    ///
    /// Used for DEB members such as `control.tar.xz`.
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".gz") || path.ends_with(".tgz") {
            Self::Gzip
        } else if path.ends_with(".bz2") {
            Self::Bzip2
        } else if path.ends_with(".xz") || path.ends_with(".lzma") {
            Self::Lzma
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect compression format from magic bytes
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - Bzip2: `42 5a 68` ("BZh")
    /// - XZ: `fd 37 7a 58 5a 00` (FD + "7zXZ" + NUL)
    /// - Zstd: `28 b5 2f fd`
    ///
    /// Anything else is treated as an uncompressed stream.
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(b"BZh") {
            Self::Bzip2
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Lzma
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Lzma => "lzma",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            "bzip2" | "bz2" => Ok(Self::Bzip2),
            "lzma" | "xz" => Ok(Self::Lzma),
            "zstd" | "zst" => Ok(Self::Zstd),
            _ => Err(CompressionError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// A compressing writer for one of the supported algorithms
///
/// Each codec needs an explicit `finish` to flush its trailer, so the
/// concrete encoder is kept instead of a boxed `Write`.
pub enum Encoder<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Lzma(xz2::write::XzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    /// Wrap `writer` in an encoder for `algorithm`
    pub fn new(writer: W, algorithm: CompressionAlgorithm) -> Result<Self, CompressionError> {
        Ok(match algorithm {
            CompressionAlgorithm::None => Self::None(writer),
            CompressionAlgorithm::Gzip => Self::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
            CompressionAlgorithm::Bzip2 => Self::Bzip2(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::best(),
            )),
            CompressionAlgorithm::Lzma => Self::Lzma(xz2::write::XzEncoder::new(writer, 6)),
            CompressionAlgorithm::Zstd => {
                let encoder = zstd::Encoder::new(writer, 0).map_err(|e| {
                    CompressionError::EncoderCreation {
                        format: "zstd",
                        source: e,
                    }
                })?;
                Self::Zstd(encoder)
            }
        })
    }

    /// Flush the codec trailer and return the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::None(mut w) => {
                w.flush()?;
                Ok(w)
            }
            Self::Gzip(e) => e.finish(),
            Self::Bzip2(e) => e.finish(),
            Self::Lzma(e) => e.finish(),
            Self::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(e) => e.write(buf),
            Self::Bzip2(e) => e.write(buf),
            Self::Lzma(e) => e.write(buf),
            Self::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(e) => e.flush(),
            Self::Bzip2(e) => e.flush(),
            Self::Lzma(e) => e.flush(),
            Self::Zstd(e) => e.flush(),
        }
    }
}

/// Create a decompressing reader for the given format
///
/// For `CompressionAlgorithm::None`, returns the reader unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionAlgorithm,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionAlgorithm::None => Ok(Box::new(reader)),
        CompressionAlgorithm::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionAlgorithm::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(reader))),
        CompressionAlgorithm::Lzma => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionAlgorithm::Zstd => {
            let decoder = zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                format: "zstd",
                source: e,
            })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Sniff the format of a seekable stream and return a decoder for it
///
/// Reads the first bytes to detect the codec, then rewinds before
/// decoding.
pub fn create_decoder_auto<'a, R: Read + io::Seek + 'a>(
    mut reader: R,
) -> io::Result<(CompressionAlgorithm, Box<dyn Read + 'a>)> {
    let mut magic = [0u8; 6];
    let mut filled = 0;
    while filled < magic.len() {
        let n = reader.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.rewind()?;

    let format = CompressionAlgorithm::from_magic_bytes(&magic[..filled]);
    let decoder = create_decoder(reader, format)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok((format, decoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ALL: [CompressionAlgorithm; 5] = [
        CompressionAlgorithm::None,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Bzip2,
        CompressionAlgorithm::Lzma,
        CompressionAlgorithm::Zstd,
    ];

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("gzip".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::Gzip);
        assert_eq!("BZ2".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::Bzip2);
        assert_eq!("xz".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::Lzma);
        assert_eq!("zst".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::Zstd);
        assert_eq!("none".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::None);
        assert!(matches!(
            "rar".parse::<CompressionAlgorithm>(),
            Err(CompressionError::UnsupportedFormat(name)) if name == "rar"
        ));
    }

    #[test]
    fn test_from_config_defaults_to_bzip2() {
        assert_eq!(CompressionAlgorithm::from_config(None).unwrap(), CompressionAlgorithm::Bzip2);
        assert_eq!(
            CompressionAlgorithm::from_config(Some("  ")).unwrap(),
            CompressionAlgorithm::Bzip2
        );
        assert!(CompressionAlgorithm::from_config(Some("lz4")).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CompressionAlgorithm::from_extension("control.tar.gz"), CompressionAlgorithm::Gzip);
        assert_eq!(CompressionAlgorithm::from_extension("control.tar.xz"), CompressionAlgorithm::Lzma);
        assert_eq!(CompressionAlgorithm::from_extension("control.tar.zst"), CompressionAlgorithm::Zstd);
        assert_eq!(CompressionAlgorithm::from_extension("control.tar.bz2"), CompressionAlgorithm::Bzip2);
        assert_eq!(CompressionAlgorithm::from_extension("control.tar"), CompressionAlgorithm::None);
    }

    #[test]
    fn test_encoded_stream_is_self_describing() {
        for algorithm in ALL {
            let mut encoder = Encoder::new(Vec::new(), algorithm).unwrap();
            encoder.write_all(b"bundle payload").unwrap();
            let encoded = encoder.finish().unwrap();

            assert_eq!(
                CompressionAlgorithm::from_magic_bytes(&encoded),
                algorithm,
                "magic bytes for {algorithm}"
            );

            let (detected, mut decoder) = create_decoder_auto(Cursor::new(encoded)).unwrap();
            assert_eq!(detected, algorithm);
            let mut decoded = Vec::new();
            decoder.read_to_end(&mut decoded).unwrap();
            assert_eq!(decoded, b"bundle payload");
        }
    }

    #[test]
    fn test_magic_bytes_too_short() {
        assert_eq!(CompressionAlgorithm::from_magic_bytes(&[0x1f]), CompressionAlgorithm::None);
        assert_eq!(CompressionAlgorithm::from_magic_bytes(&[]), CompressionAlgorithm::None);
    }
}
