//! MPQ v1 archive header: parsing, serialization, and signature scanning

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// Archive signature: 'MPQ\x1A'
pub const SIGNATURE: u32 = 0x1A51_504D;

/// Size of the v1 header in bytes
pub const HEADER_SIZE: u32 = 32;

/// Headers are aligned to 512-byte boundaries within the containing file
pub const HEADER_ALIGN: u64 = 512;

/// The MPQ archive header
///
/// All table offsets are relative to the start of the header, which is not
/// necessarily the start of the containing file: archives may be embedded
/// after an executable stub at any 512-byte-aligned offset.
#[derive(Debug, Clone)]
pub struct Header {
    /// Size of the header in bytes
    pub header_size: u32,
    /// Size of the whole archive in bytes, from the header onwards
    pub archive_size: u32,
    /// Format version; only version 0 (v1) is supported
    pub format_version: u16,
    /// Sector size exponent; sector size is `512 << shift`
    pub sector_size_shift: u16,
    /// Offset of the hash table, relative to the header
    pub hash_table_offset: u32,
    /// Offset of the block table, relative to the header
    pub block_table_offset: u32,
    /// Number of hash table entries; always a power of two
    pub hash_table_count: u32,
    /// Number of block table entries
    pub block_table_count: u32,
}

impl Header {
    /// Create a fresh header for an empty archive
    pub fn new(sector_size_shift: u16) -> Self {
        Self {
            header_size: HEADER_SIZE,
            archive_size: HEADER_SIZE,
            format_version: 0,
            sector_size_shift,
            hash_table_offset: 0,
            block_table_offset: 0,
            hash_table_count: 0,
            block_table_count: 0,
        }
    }

    /// Sector size in bytes for this archive
    pub fn sector_size(&self) -> usize {
        512usize << self.sector_size_shift
    }

    /// Read a header from the current position; the signature must have
    /// already been consumed by the caller.
    fn read_body<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            header_size: reader.read_u32::<LittleEndian>()?,
            archive_size: reader.read_u32::<LittleEndian>()?,
            format_version: reader.read_u16::<LittleEndian>()?,
            sector_size_shift: reader.read_u16::<LittleEndian>()?,
            hash_table_offset: reader.read_u32::<LittleEndian>()?,
            block_table_offset: reader.read_u32::<LittleEndian>()?,
            hash_table_count: reader.read_u32::<LittleEndian>()?,
            block_table_count: reader.read_u32::<LittleEndian>()?,
        })
    }

    /// Read a header, including the signature, from the current position
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != SIGNATURE {
            return Err(Error::corrupt("missing MPQ signature"));
        }
        Self::read_body(reader)
    }

    /// Write the header, including the signature, at the current position
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.header_size)?;
        writer.write_u32::<LittleEndian>(self.archive_size)?;
        writer.write_u16::<LittleEndian>(self.format_version)?;
        writer.write_u16::<LittleEndian>(self.sector_size_shift)?;
        writer.write_u32::<LittleEndian>(self.hash_table_offset)?;
        writer.write_u32::<LittleEndian>(self.block_table_offset)?;
        writer.write_u32::<LittleEndian>(self.hash_table_count)?;
        writer.write_u32::<LittleEndian>(self.block_table_count)?;
        Ok(())
    }

    /// Validate internal consistency of the header
    pub fn validate(&self) -> Result<()> {
        if self.format_version != 0 {
            return Err(Error::corrupt(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.header_size < HEADER_SIZE {
            return Err(Error::corrupt(format!(
                "header size {} is too small",
                self.header_size
            )));
        }
        if self.hash_table_count == 0 || !self.hash_table_count.is_power_of_two() {
            return Err(Error::corrupt(format!(
                "hash table size {} is not a power of two",
                self.hash_table_count
            )));
        }

        let hash_table_bytes = self.hash_table_count as u64 * 16;
        let block_table_bytes = self.block_table_count as u64 * 16;
        if self.hash_table_offset as u64 + hash_table_bytes > self.archive_size as u64 {
            return Err(Error::corrupt("hash table exceeds archive bounds"));
        }
        if self.block_table_offset as u64 + block_table_bytes > self.archive_size as u64 {
            return Err(Error::corrupt("block table exceeds archive bounds"));
        }

        Ok(())
    }
}

/// Locate and read the archive header.
///
/// The signature is searched at 512-byte-aligned offsets from the start of
/// the file, so archives embedded after an executable stub are found.
/// Returns the header offset within the file and the parsed header.
pub fn find_header<R: Read + Seek>(reader: &mut R) -> Result<(u64, Header)> {
    let file_len = reader.seek(SeekFrom::End(0))?;

    let mut offset = 0u64;
    while offset + HEADER_SIZE as u64 <= file_len {
        reader.seek(SeekFrom::Start(offset))?;
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature == SIGNATURE {
            let header = Header::read_body(reader)?;
            return Ok((offset, header));
        }
        offset += HEADER_ALIGN;
    }

    Err(Error::corrupt("no MPQ signature found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> Header {
        Header {
            header_size: HEADER_SIZE,
            archive_size: 0x1000,
            format_version: 0,
            sector_size_shift: 3,
            hash_table_offset: 0x800,
            block_table_offset: 0x900,
            hash_table_count: 16,
            block_table_count: 4,
        }
    }

    #[test]
    fn header_round_trip() {
        let original = sample_header();

        let mut buffer = Cursor::new(Vec::new());
        original.write_to(&mut buffer).unwrap();
        assert_eq!(buffer.get_ref().len(), HEADER_SIZE as usize);

        buffer.set_position(0);
        let read_back = Header::read_from(&mut buffer).unwrap();

        assert_eq!(read_back.archive_size, original.archive_size);
        assert_eq!(read_back.sector_size_shift, original.sector_size_shift);
        assert_eq!(read_back.hash_table_offset, original.hash_table_offset);
        assert_eq!(read_back.block_table_offset, original.block_table_offset);
        assert_eq!(read_back.hash_table_count, original.hash_table_count);
        assert_eq!(read_back.block_table_count, original.block_table_count);
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let mut buffer = Cursor::new(vec![0u8; HEADER_SIZE as usize]);
        assert!(matches!(
            Header::read_from(&mut buffer),
            Err(Error::CorruptArchive(_))
        ));
    }

    #[test]
    fn find_header_at_aligned_offset() {
        let mut bytes = vec![0u8; 1024];
        let mut header_bytes = Cursor::new(Vec::new());
        sample_header().write_to(&mut header_bytes).unwrap();
        bytes.extend_from_slice(header_bytes.get_ref());

        let (offset, header) = find_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(offset, 1024);
        assert_eq!(header.hash_table_count, 16);
    }

    #[test]
    fn find_header_rejects_garbage() {
        let bytes = vec![0u8; 4096];
        assert!(find_header(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let mut header = sample_header();
        header.hash_table_count = 12; // not a power of two
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.hash_table_offset = 0xFF0; // table runs past archive end
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.format_version = 1;
        assert!(header.validate().is_err());

        assert!(sample_header().validate().is_ok());
    }

    #[test]
    fn sector_size_from_shift() {
        assert_eq!(Header::new(0).sector_size(), 512);
        assert_eq!(Header::new(3).sector_size(), 4096);
        assert_eq!(Header::new(8).sector_size(), 131072);
    }
}
