//! Archive container handling
//!
//! [`ArchiveIndex`] reads a module archive into an ordered list of
//! [`ArchiveMember`]s without touching their stored bytes, and
//! [`ArchiveWriter`] emits a new archive holding a retained subset of them.

mod format;
mod index;
pub mod manifest;
mod writer;

pub use index::ArchiveIndex;
pub use manifest::Manifest;
pub use writer::{ArchiveWriter, WriteSummary};

use crate::error::{Result, ShrinkError};
use flate2::read::DeflateDecoder;
use flate2::Crc;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::io::Read;

/// Prefix of versioned class directories in multi-release archives
const VERSIONS_PREFIX: &str = "META-INF/versions/";

/// What an archive member holds, decided once at indexing time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// A compiled class that can be referenced by type name
    Class,
    /// Any other file; its content is opaque
    Resource,
    /// A directory marker entry (name ends with `/`)
    Directory,
}

impl MemberKind {
    /// Classify a member by its path
    pub fn classify(path: &str) -> Self {
        if path.ends_with('/') {
            return MemberKind::Directory;
        }

        let Some(stem) = path.strip_suffix(".class") else {
            return MemberKind::Resource;
        };

        // module-info and package-info carry no type that can be referenced by name
        let simple = stem.rsplit('/').next().unwrap_or(stem);
        if simple.is_empty() || simple == "module-info" || simple == "package-info" {
            MemberKind::Resource
        } else {
            MemberKind::Class
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MemberKind::Class => "class",
            MemberKind::Resource => "resource",
            MemberKind::Directory => "directory",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Compression method of a stored member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Other(u16),
}

impl CompressionMethod {
    pub fn from_u16(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Other(method) => *method,
        }
    }
}

/// Container metadata carried through to the output unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    pub raw_name: Vec<u8>,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_extra: Vec<u8>,
    pub central_extra: Vec<u8>,
    pub comment: Vec<u8>,
}

/// A single entry of the input archive
///
/// Immutable once indexed. `raw` holds the stored bytes exactly as they
/// appear in the input, still compressed when `method` says so.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub path: String,
    pub kind: MemberKind,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub uncompressed_size: u32,
    pub(crate) header: EntryHeader,
    raw: Vec<u8>,
}

impl ArchiveMember {
    pub(crate) fn new(
        path: String,
        method: CompressionMethod,
        crc32: u32,
        uncompressed_size: u32,
        header: EntryHeader,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            kind: MemberKind::classify(&path),
            path,
            method,
            crc32,
            uncompressed_size,
            header,
            raw,
        }
    }

    /// Stored bytes, exactly as found in the input archive
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Size of the stored bytes
    pub fn stored_size(&self) -> u64 {
        self.raw.len() as u64
    }

    pub fn is_class(&self) -> bool {
        self.kind == MemberKind::Class
    }

    /// Internal type name (`a/b/C`) for class members
    ///
    /// Multi-release variants under `META-INF/versions/<n>/` map to the
    /// same name as their base class.
    pub fn type_name(&self) -> Option<&str> {
        if self.kind != MemberKind::Class {
            return None;
        }
        let stem = self.path.strip_suffix(".class")?;
        let stem = match stem.strip_prefix(VERSIONS_PREFIX) {
            Some(versioned) => match versioned.split_once('/') {
                Some((release, rest)) if release.chars().all(|c| c.is_ascii_digit()) => rest,
                _ => stem,
            },
            None => stem,
        };
        Some(stem)
    }

    /// Directory marker path this member lives in (`a/b/` for `a/b/c.txt`)
    pub fn parent_directory(&self) -> Option<&str> {
        parent_directory(&self.path)
    }

    /// Decompressed content, verified against the recorded CRC-32
    pub fn data(&self) -> Result<Cow<'_, [u8]>> {
        let data: Cow<'_, [u8]> = match self.method {
            CompressionMethod::Stored => Cow::Borrowed(&self.raw),
            CompressionMethod::Deflated => {
                let mut out = Vec::new();
                DeflateDecoder::new(self.raw.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| {
                        ShrinkError::corrupt(format!("{}: failed to inflate: {}", self.path, e))
                    })?;
                Cow::Owned(out)
            }
            CompressionMethod::Other(method) => {
                return Err(ShrinkError::corrupt(format!(
                    "{}: unsupported compression method {}",
                    self.path, method
                )));
            }
        };

        if data.len() as u64 != u64::from(self.uncompressed_size) {
            return Err(ShrinkError::corrupt(format!(
                "{}: expected {} bytes after decompression, found {}",
                self.path,
                self.uncompressed_size,
                data.len()
            )));
        }

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != self.crc32 {
            return Err(ShrinkError::corrupt(format!(
                "{}: CRC-32 mismatch (recorded {:08x}, computed {:08x})",
                self.path,
                self.crc32,
                crc.sum()
            )));
        }

        Ok(data)
    }
}

/// Directory marker path enclosing `path`, whether or not the archive has it
pub fn parent_directory(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let cut = trimmed.rfind('/')?;
    Some(&path[..=cut])
}
