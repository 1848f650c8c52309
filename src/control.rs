// src/control.rs

//! Control metadata extraction
//!
//! Reads the `control` file embedded in a DEB package and records the
//! fields a bundle needs in `blank.info` at the root of the staging tree.
//!
//! A DEB package is an `ar` archive containing:
//! - `debian-binary`: version string "2.0\n"
//! - `control.tar{,.gz,.xz,.zst}`: package metadata and scripts
//! - `data.tar{,.gz,.xz,.zst}`: actual file contents

use crate::compression::{create_decoder, CompressionAlgorithm};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the info file written at the root of a staging tree
pub const INFO_FILE: &str = "blank.info";

/// Maximum size of a control member we are willing to read (1 MB)
const MAX_CONTROL_SIZE: u64 = 1024 * 1024;

/// One RFC 822-style stanza, fields kept in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    fields: Vec<(String, String)>,
}

impl Paragraph {
    /// Look up a field by name (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split text into blank-line separated stanzas
///
/// Continuation lines (leading space or tab) are appended to the previous
/// field's value, separated by a newline and without the leading blank.
pub fn parse_paragraphs(content: &str) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::default();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.fields.last_mut() {
                value.push('\n');
                value.push_str(&line[1..]);
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            current
                .fields
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// Control fields recorded for a bundle's primary package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlInfo {
    pub package: String,
    pub version: String,
    pub architecture: String,
    /// Synopsis, followed by the extended description lines (if any)
    pub description: String,
    pub section: String,
    pub homepage: String,
    /// File name of the package the fields were read from
    pub filename: String,
}

impl ControlInfo {
    /// Build from a parsed stanza; `Package` and `Version` are mandatory
    pub fn from_paragraph(paragraph: &Paragraph) -> std::result::Result<Self, String> {
        let required = |key: &str| {
            paragraph
                .get(key)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or_else(|| format!("missing {} field", key))
        };
        let optional = |key: &str| paragraph.get(key).unwrap_or_default().to_string();

        Ok(Self {
            package: required("Package")?,
            version: required("Version")?,
            architecture: optional("Architecture"),
            description: optional("Description"),
            section: optional("Section"),
            homepage: optional("Homepage"),
            filename: optional("Filename"),
        })
    }

    /// Parse the first stanza of a control or info block
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let paragraph = parse_paragraphs(content)
            .into_iter()
            .next()
            .ok_or_else(|| "empty control block".to_string())?;
        Self::from_paragraph(&paragraph)
    }

    /// First line of the description
    pub fn synopsis(&self) -> &str {
        self.description.lines().next().unwrap_or("")
    }

    /// Render as a stanza (without the trailing blank line)
    ///
    /// `Description` goes last so its continuation lines cannot be mistaken
    /// for another field's.
    pub fn to_block(&self) -> String {
        let mut block = String::new();
        push_field(&mut block, "Package", &self.package);
        push_field(&mut block, "Version", &self.version);
        push_field(&mut block, "Architecture", &self.architecture);
        push_field(&mut block, "Section", &self.section);
        push_field(&mut block, "Homepage", &self.homepage);
        push_field(&mut block, "Filename", &self.filename);
        push_field(&mut block, "Description", &self.description);
        block
    }
}

/// Append `Key: value`, writing multi-line values as continuation lines
pub(crate) fn push_field(out: &mut String, key: &str, value: &str) {
    let mut lines = value.lines();
    out.push_str(key);
    out.push(':');
    if let Some(first) = lines.next() {
        out.push(' ');
        out.push_str(first);
    }
    out.push('\n');
    for line in lines {
        out.push(' ');
        out.push_str(if line.is_empty() { "." } else { line });
        out.push('\n');
    }
}

/// Extract the control fields of a DEB package
pub fn extract(deb_path: &Path) -> Result<ControlInfo> {
    debug!("Extracting control metadata from {}", deb_path.display());

    let control = read_control_member(deb_path)?;
    let mut info = ControlInfo::parse(&control).map_err(|e| Error::metadata(deb_path, e))?;

    info.filename = deb_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(info)
}

/// Read the text of `./control` from the package's control tarball
fn read_control_member(deb_path: &Path) -> Result<String> {
    let file = File::open(deb_path).map_err(|e| Error::metadata(deb_path, e))?;
    let mut archive = ar::Archive::new(file);

    while let Some(entry) = archive.next_entry() {
        let entry = entry.map_err(|e| Error::metadata(deb_path, format!("bad ar archive: {e}")))?;
        let name = String::from_utf8_lossy(entry.header().identifier())
            .trim_end_matches('/')
            .trim()
            .to_string();

        if !name.starts_with("control.tar") {
            continue;
        }

        let format = CompressionAlgorithm::from_extension(&name);
        let decoder = create_decoder(entry, format).map_err(|e| Error::metadata(deb_path, e))?;
        let mut tarball = tar::Archive::new(decoder);

        let entries = tarball
            .entries()
            .map_err(|e| Error::metadata(deb_path, format!("bad {name}: {e}")))?;
        for member in entries {
            let member = member.map_err(|e| Error::metadata(deb_path, format!("bad {name}: {e}")))?;
            let path = member
                .path()
                .map_err(|e| Error::metadata(deb_path, e))?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();
            if path != "control" {
                continue;
            }

            let mut text = String::new();
            member
                .take(MAX_CONTROL_SIZE)
                .read_to_string(&mut text)
                .map_err(|e| Error::metadata(deb_path, format!("unreadable control file: {e}")))?;
            return Ok(text);
        }

        return Err(Error::metadata(deb_path, format!("{name} has no control file")));
    }

    Err(Error::metadata(deb_path, "no control.tar member (not a DEB package?)"))
}

/// Append the info block to `root/blank.info`
pub fn write_info(root: &Path, info: &ControlInfo) -> Result<PathBuf> {
    let path = root.join(INFO_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::metadata(&path, e))?;

    file.write_all(info.to_block().as_bytes())
        .map_err(|e| Error::metadata(&path, e))?;

    debug!("Wrote control info for {} to {}", info.package, path.display());
    Ok(path)
}
