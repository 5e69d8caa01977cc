// ZIP container records
//
// Only the subset of the format that module archives use is understood:
// single-disk, non-ZIP64, unencrypted. Stored data is never interpreted here.

use std::fmt;
use std::io::{self, Write};

pub(crate) const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
pub(crate) const CENTRAL_DIRECTORY_SIG: u32 = 0x0201_4b50;
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIG: u32 = 0x0605_4b50;
pub(crate) const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0706_4b50;

pub(crate) const LOCAL_HEADER_LEN: usize = 30;
pub(crate) const EOCD_LEN: usize = 22;
pub(crate) const ZIP64_LOCATOR_LEN: usize = 20;

pub(crate) const FLAG_ENCRYPTED: u16 = 0x0001;
pub(crate) const FLAG_COMPRESSION_OPTIONS: u16 = 0x0006;
pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Read past the end of the available bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Truncated {
    pub offset: usize,
}

impl fmt::Display for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected end of data at offset {}", self.offset)
    }
}

/// Little-endian cursor over archive bytes
pub(crate) struct LeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], Truncated> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u16(&mut self) -> Result<u16, Truncated> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, Truncated> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Peek a little-endian u32 at an absolute offset
pub(crate) fn u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let b = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// End of central directory record
#[derive(Debug, Clone)]
pub(crate) struct EndOfCentralDirectory {
    pub disk: u16,
    pub central_directory_disk: u16,
    pub entries_on_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub fn parse(reader: &mut LeReader<'_>) -> Result<Self, Truncated> {
        let _signature = reader.u32()?;
        let disk = reader.u16()?;
        let central_directory_disk = reader.u16()?;
        let entries_on_disk = reader.u16()?;
        let entries = reader.u16()?;
        let central_directory_size = reader.u32()?;
        let central_directory_offset = reader.u32()?;
        let comment_len = reader.u16()? as usize;
        let comment = reader.bytes(comment_len)?.to_vec();

        Ok(Self {
            disk,
            central_directory_disk,
            entries_on_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            comment,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_u32(out, END_OF_CENTRAL_DIRECTORY_SIG)?;
        write_u16(out, self.disk)?;
        write_u16(out, self.central_directory_disk)?;
        write_u16(out, self.entries_on_disk)?;
        write_u16(out, self.entries)?;
        write_u32(out, self.central_directory_size)?;
        write_u32(out, self.central_directory_offset)?;
        write_u16(out, self.comment.len() as u16)?;
        out.write_all(&self.comment)
    }
}

/// Central directory file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CentralRecord {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralRecord {
    /// Parse one record; the caller has already checked the signature
    pub fn parse(reader: &mut LeReader<'_>) -> Result<Self, Truncated> {
        let _signature = reader.u32()?;
        let version_made_by = reader.u16()?;
        let version_needed = reader.u16()?;
        let flags = reader.u16()?;
        let method = reader.u16()?;
        let mod_time = reader.u16()?;
        let mod_date = reader.u16()?;
        let crc32 = reader.u32()?;
        let compressed_size = reader.u32()?;
        let uncompressed_size = reader.u32()?;
        let name_len = reader.u16()? as usize;
        let extra_len = reader.u16()? as usize;
        let comment_len = reader.u16()? as usize;
        let disk_start = reader.u16()?;
        let internal_attributes = reader.u16()?;
        let external_attributes = reader.u32()?;
        let local_header_offset = reader.u32()?;
        let name = reader.bytes(name_len)?.to_vec();
        let extra = reader.bytes(extra_len)?.to_vec();
        let comment = reader.bytes(comment_len)?.to_vec();

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_start,
            internal_attributes,
            external_attributes,
            local_header_offset,
            name,
            extra,
            comment,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_u32(out, CENTRAL_DIRECTORY_SIG)?;
        write_u16(out, self.version_made_by)?;
        write_u16(out, self.version_needed)?;
        write_u16(out, self.flags)?;
        write_u16(out, self.method)?;
        write_u16(out, self.mod_time)?;
        write_u16(out, self.mod_date)?;
        write_u32(out, self.crc32)?;
        write_u32(out, self.compressed_size)?;
        write_u32(out, self.uncompressed_size)?;
        write_u16(out, self.name.len() as u16)?;
        write_u16(out, self.extra.len() as u16)?;
        write_u16(out, self.comment.len() as u16)?;
        write_u16(out, self.disk_start)?;
        write_u16(out, self.internal_attributes)?;
        write_u32(out, self.external_attributes)?;
        write_u32(out, self.local_header_offset)?;
        out.write_all(&self.name)?;
        out.write_all(&self.extra)?;
        out.write_all(&self.comment)
    }
}

/// Local file header preceding each entry's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalHeader {
    pub fn parse(reader: &mut LeReader<'_>) -> Result<Self, Truncated> {
        let _signature = reader.u32()?;
        let version_needed = reader.u16()?;
        let flags = reader.u16()?;
        let method = reader.u16()?;
        let mod_time = reader.u16()?;
        let mod_date = reader.u16()?;
        let crc32 = reader.u32()?;
        let compressed_size = reader.u32()?;
        let uncompressed_size = reader.u32()?;
        let name_len = reader.u16()? as usize;
        let extra_len = reader.u16()? as usize;
        let name = reader.bytes(name_len)?.to_vec();
        let extra = reader.bytes(extra_len)?.to_vec();

        Ok(Self {
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_u32(out, LOCAL_FILE_HEADER_SIG)?;
        write_u16(out, self.version_needed)?;
        write_u16(out, self.flags)?;
        write_u16(out, self.method)?;
        write_u16(out, self.mod_time)?;
        write_u16(out, self.mod_date)?;
        write_u32(out, self.crc32)?;
        write_u32(out, self.compressed_size)?;
        write_u32(out, self.uncompressed_size)?;
        write_u16(out, self.name.len() as u16)?;
        write_u16(out, self.extra.len() as u16)?;
        out.write_all(&self.name)?;
        out.write_all(&self.extra)
    }

    /// Encoded length of this header
    pub fn len(&self) -> usize {
        LOCAL_HEADER_LEN + self.name.len() + self.extra.len()
    }
}

fn write_u16<W: Write>(out: &mut W, value: u16) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}
