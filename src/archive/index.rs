use super::format::{
    u32_at, CentralRecord, EndOfCentralDirectory, LeReader, LocalHeader, Truncated,
    CENTRAL_DIRECTORY_SIG, END_OF_CENTRAL_DIRECTORY_SIG, EOCD_LEN, FLAG_ENCRYPTED,
    LOCAL_FILE_HEADER_SIG, ZIP64_EOCD_LOCATOR_SIG, ZIP64_LOCATOR_LEN,
};
use super::{ArchiveMember, CompressionMethod, EntryHeader, MemberKind};
use crate::error::{Result, ShrinkError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ordered view of every member of an input archive
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    members: Vec<ArchiveMember>,

    /// Map from member path to its position in `members`
    by_path: HashMap<String, usize>,

    /// Map from internal type name to class member positions
    types: HashMap<String, Vec<usize>>,

    /// Archive-level comment from the end of central directory record
    comment: Vec<u8>,

    /// Later entries that repeated an earlier path with identical bytes
    skipped_duplicates: usize,
}

impl ArchiveIndex {
    /// Open and index an archive on disk
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| ShrinkError::ArchiveUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let index = Self::from_bytes(&bytes)?;
        info!(
            "Indexed {} members ({} classes) from {}",
            index.len(),
            index.class_count(),
            path.display()
        );
        Ok(index)
    }

    /// Index an archive held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let eocd_offset = find_end_of_central_directory(bytes)?;
        let eocd = EndOfCentralDirectory::parse(&mut LeReader::at(bytes, eocd_offset))
            .map_err(|e| truncated("end of central directory", e))?;

        if eocd_offset >= ZIP64_LOCATOR_LEN
            && u32_at(bytes, eocd_offset - ZIP64_LOCATOR_LEN) == Some(ZIP64_EOCD_LOCATOR_SIG)
        {
            return Err(ShrinkError::corrupt("ZIP64 archives are not supported"));
        }

        if eocd.disk != 0 || eocd.central_directory_disk != 0 || eocd.entries_on_disk != eocd.entries {
            return Err(ShrinkError::corrupt("multi-disk archives are not supported"));
        }

        // Tolerate bytes prepended to the archive by shifting every recorded offset
        let directory_start = eocd_offset
            .checked_sub(eocd.central_directory_size as usize)
            .ok_or_else(|| ShrinkError::corrupt("central directory size exceeds archive size"))?;
        let shift = directory_start
            .checked_sub(eocd.central_directory_offset as usize)
            .ok_or_else(|| {
                ShrinkError::corrupt(format!(
                    "central directory offset {} lies past its actual position {}",
                    eocd.central_directory_offset, directory_start
                ))
            })?;
        if shift > 0 {
            debug!("Archive carries a {} byte prefix", shift);
        }

        let directory = &bytes[..eocd_offset];
        let mut reader = LeReader::at(directory, directory_start);
        let mut index = ArchiveIndex {
            comment: eocd.comment.clone(),
            ..Default::default()
        };

        for entry in 0..eocd.entries {
            if u32_at(directory, reader.pos()) != Some(CENTRAL_DIRECTORY_SIG) {
                return Err(ShrinkError::corrupt(format!(
                    "central directory record {} has an invalid signature",
                    entry
                )));
            }
            let record = CentralRecord::parse(&mut reader)
                .map_err(|e| truncated("central directory record", e))?;
            let member = read_member(bytes, &record, shift)?;
            index.insert(member)?;
        }

        Ok(index)
    }

    fn insert(&mut self, member: ArchiveMember) -> Result<()> {
        if let Some(&existing) = self.by_path.get(&member.path) {
            let first = &self.members[existing];
            if first.raw() == member.raw() && first.method == member.method {
                debug!("Skipping identical duplicate entry {}", member.path);
                self.skipped_duplicates += 1;
                return Ok(());
            }
            return Err(ShrinkError::corrupt(format!(
                "conflicting duplicate entries for {}",
                member.path
            )));
        }

        let position = self.members.len();
        if let Some(name) = member.type_name() {
            self.types.entry(name.to_string()).or_default().push(position);
        }
        self.by_path.insert(member.path.clone(), position);
        self.members.push(member);
        Ok(())
    }

    /// Members in original archive order
    pub fn members(&self) -> &[ArchiveMember] {
        &self.members
    }

    /// Look up a member by path
    pub fn get(&self, path: &str) -> Option<&ArchiveMember> {
        self.by_path.get(path).map(|&i| &self.members[i])
    }

    /// Position of a member in archive order
    pub fn position(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    /// Class members declaring the given internal type name (`a/b/C`)
    pub fn find_class(&self, type_name: &str) -> impl Iterator<Item = &ArchiveMember> + '_ {
        self.types
            .get(type_name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.members[i])
    }

    /// Class members in archive order
    pub fn classes(&self) -> impl Iterator<Item = &ArchiveMember> + '_ {
        self.members.iter().filter(|m| m.kind == MemberKind::Class)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes().count()
    }

    /// Sum of stored (compressed) member sizes
    pub fn stored_size(&self) -> u64 {
        self.members.iter().map(ArchiveMember::stored_size).sum()
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn skipped_duplicates(&self) -> usize {
        self.skipped_duplicates
    }
}

/// Locate the end of central directory record, scanning back over the comment
///
/// A candidate only counts when its comment runs exactly to the end of the
/// file, so a signature inside the comment is never taken for the record.
fn find_end_of_central_directory(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < EOCD_LEN {
        return Err(ShrinkError::corrupt("file is too small to be a ZIP archive"));
    }

    let last = bytes.len() - EOCD_LEN;
    let first = last.saturating_sub(u16::MAX as usize);

    for offset in (first..=last).rev() {
        if u32_at(bytes, offset) != Some(END_OF_CENTRAL_DIRECTORY_SIG) {
            continue;
        }
        let comment_len = u16::from_le_bytes([bytes[offset + 20], bytes[offset + 21]]) as usize;
        if offset + EOCD_LEN + comment_len == bytes.len() {
            return Ok(offset);
        }
    }

    Err(ShrinkError::corrupt("end of central directory record not found"))
}

/// Resolve a central directory record to its local header and stored bytes
fn read_member(bytes: &[u8], record: &CentralRecord, shift: usize) -> Result<ArchiveMember> {
    let path = decode_name(&record.name);

    if record.flags & FLAG_ENCRYPTED != 0 {
        return Err(ShrinkError::corrupt(format!(
            "{}: encrypted entries are not supported",
            path
        )));
    }

    let local_offset = (record.local_header_offset as usize)
        .checked_add(shift)
        .ok_or_else(|| ShrinkError::corrupt(format!("{}: local header offset overflows", path)))?;
    if u32_at(bytes, local_offset) != Some(LOCAL_FILE_HEADER_SIG) {
        return Err(ShrinkError::corrupt(format!(
            "{}: no local file header at offset {}",
            path, local_offset
        )));
    }

    let local = LocalHeader::parse(&mut LeReader::at(bytes, local_offset))
        .map_err(|e| truncated(&format!("{} local header", path), e))?;
    if local.name != record.name {
        return Err(ShrinkError::corrupt(format!(
            "{}: local header names a different entry",
            path
        )));
    }
    if local.method != record.method {
        warn!("{}: local and central compression methods disagree", path);
    }

    let data_start = local_offset + local.len();
    let raw = data_start
        .checked_add(record.compressed_size as usize)
        .and_then(|end| bytes.get(data_start..end))
        .ok_or_else(|| {
            ShrinkError::corrupt(format!("{}: stored data extends past the end of the archive", path))
        })?;

    let header = EntryHeader {
        raw_name: record.name.clone(),
        version_made_by: record.version_made_by,
        version_needed: record.version_needed,
        flags: record.flags,
        mod_time: record.mod_time,
        mod_date: record.mod_date,
        internal_attributes: record.internal_attributes,
        external_attributes: record.external_attributes,
        local_extra: local.extra,
        central_extra: record.extra.clone(),
        comment: record.comment.clone(),
    };

    Ok(ArchiveMember::new(
        path,
        CompressionMethod::from_u16(record.method),
        record.crc32,
        record.uncompressed_size,
        header,
        raw.to_vec(),
    ))
}

fn decode_name(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(name) => name.to_string(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

fn truncated(what: &str, err: Truncated) -> ShrinkError {
    ShrinkError::corrupt(format!("truncated {}: {}", what, err))
}
