use super::format::{
    CentralRecord, EndOfCentralDirectory, LocalHeader, FLAG_COMPRESSION_OPTIONS,
    FLAG_DATA_DESCRIPTOR,
};
use super::{ArchiveIndex, ArchiveMember, CompressionMethod, MemberKind};
use crate::analysis::RetainedSet;
use crate::error::{Result, ShrinkError};
use crate::pipeline::{CancellationToken, Stage};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lowest "version needed to extract" that allows deflate
const DEFLATE_VERSION_NEEDED: u16 = 20;

/// Outcome of writing an output archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Members written
    pub entries: usize,
    /// Total size of the output file
    pub bytes_written: u64,
    /// Stored members that were deflated on the way out
    pub recompressed: usize,
}

/// Emits the retained members of an archive into a new archive
///
/// The output is assembled in a temporary file next to the destination
/// and renamed into place once complete, so a failed or cancelled run
/// never leaves a partial archive behind.
pub struct ArchiveWriter {
    output: PathBuf,
    recompress: bool,
    cancel: CancellationToken,
}

impl ArchiveWriter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            recompress: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Deflate stored members when that makes them smaller
    pub fn with_recompression(mut self, recompress: bool) -> Self {
        self.recompress = recompress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Write every member of `index` that is in `retained`, in archive order
    pub fn write(&self, index: &ArchiveIndex, retained: &RetainedSet) -> Result<WriteSummary> {
        self.cancel.check(Stage::Writing)?;

        let selected: Vec<&ArchiveMember> = index
            .members()
            .iter()
            .filter(|m| retained.contains(&m.path))
            .collect();

        let deflated: Vec<Option<Vec<u8>>> = if self.recompress {
            selected
                .par_iter()
                .map(|m| recompress(m))
                .collect::<io::Result<_>>()
                .map_err(|e| ShrinkError::write(&self.output, e))?
        } else {
            vec![None; selected.len()]
        };

        let dir = self
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".jarprune-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ShrinkError::write(&self.output, e))?;

        let summary = {
            let mut out = CountingWriter::new(BufWriter::new(temp.as_file_mut()));
            let summary = self.write_entries(&mut out, index, &selected, &deflated)?;
            out.flush().map_err(|e| ShrinkError::write(&self.output, e))?;
            summary
        };

        temp.as_file()
            .sync_all()
            .map_err(|e| ShrinkError::write(&self.output, e))?;
        temp.persist(&self.output)
            .map_err(|e| ShrinkError::write(&self.output, e.error))?;

        info!(
            "Wrote {} members ({} bytes) to {}",
            summary.entries,
            summary.bytes_written,
            self.output.display()
        );
        Ok(summary)
    }

    fn write_entries<W: Write>(
        &self,
        out: &mut CountingWriter<W>,
        index: &ArchiveIndex,
        selected: &[&ArchiveMember],
        deflated: &[Option<Vec<u8>>],
    ) -> Result<WriteSummary> {
        let io_err = |e: io::Error| ShrinkError::write(&self.output, e);
        let mut central = Vec::with_capacity(selected.len());
        let mut recompressed = 0;

        for (member, deflated) in selected.iter().zip(deflated) {
            self.cancel.check(Stage::Writing)?;

            let offset = offset_u32(out.count()).map_err(io_err)?;
            let header = &member.header;
            let mut flags = header.flags & !FLAG_DATA_DESCRIPTOR;
            let mut version_needed = header.version_needed;
            let (method, data) = match deflated {
                Some(data) => {
                    recompressed += 1;
                    flags &= !FLAG_COMPRESSION_OPTIONS;
                    version_needed = version_needed.max(DEFLATE_VERSION_NEEDED);
                    (CompressionMethod::Deflated, data.as_slice())
                }
                None => (member.method, member.raw()),
            };
            let compressed_size = offset_u32(data.len() as u64).map_err(io_err)?;

            let local = LocalHeader {
                version_needed,
                flags,
                method: method.as_u16(),
                mod_time: header.mod_time,
                mod_date: header.mod_date,
                crc32: member.crc32,
                compressed_size,
                uncompressed_size: member.uncompressed_size,
                name: header.raw_name.clone(),
                extra: header.local_extra.clone(),
            };
            local.write(out).map_err(io_err)?;
            out.write_all(data).map_err(io_err)?;

            central.push(CentralRecord {
                version_made_by: header.version_made_by,
                version_needed,
                flags,
                method: method.as_u16(),
                mod_time: header.mod_time,
                mod_date: header.mod_date,
                crc32: member.crc32,
                compressed_size,
                uncompressed_size: member.uncompressed_size,
                disk_start: 0,
                internal_attributes: header.internal_attributes,
                external_attributes: header.external_attributes,
                local_header_offset: offset,
                name: header.raw_name.clone(),
                extra: header.central_extra.clone(),
                comment: header.comment.clone(),
            });
        }

        let directory_start = out.count();
        for record in &central {
            record.write(out).map_err(io_err)?;
        }
        let directory_size = out.count() - directory_start;

        let entries = u16::try_from(central.len())
            .map_err(|_| io_err(zip64_required("too many entries")))?;
        let eocd = EndOfCentralDirectory {
            disk: 0,
            central_directory_disk: 0,
            entries_on_disk: entries,
            entries,
            central_directory_size: offset_u32(directory_size).map_err(io_err)?,
            central_directory_offset: offset_u32(directory_start).map_err(io_err)?,
            comment: index.comment().to_vec(),
        };
        eocd.write(out).map_err(io_err)?;

        Ok(WriteSummary {
            entries: central.len(),
            bytes_written: out.count(),
            recompressed,
        })
    }
}

/// Deflate a stored member, returning the new bytes only when they are smaller
fn recompress(member: &ArchiveMember) -> io::Result<Option<Vec<u8>>> {
    if member.method != CompressionMethod::Stored
        || member.kind == MemberKind::Directory
        || member.raw().is_empty()
    {
        return Ok(None);
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(member.raw())?;
    let compressed = encoder.finish()?;

    if compressed.len() < member.raw().len() {
        debug!(
            "Recompressed {} ({} -> {} bytes)",
            member.path,
            member.raw().len(),
            compressed.len()
        );
        Ok(Some(compressed))
    } else {
        Ok(None)
    }
}

fn offset_u32(value: u64) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| zip64_required("offset exceeds 4 GiB"))
}

fn zip64_required(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("output requires ZIP64 ({})", what),
    )
}

/// Tracks the number of bytes written so far
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
