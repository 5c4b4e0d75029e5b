//! The block table: position, sizes, and storage flags per stored file

use crate::crypto::{self, BLOCK_TABLE_KEY};
use crate::error::Result;
use crate::tables::TABLE_ENTRY_SIZE;
use std::io::{Read, Seek, SeekFrom, Write};

/// Block flags describing how a file is stored
pub mod block_flags {
    /// File is compressed with PKWARE implode only (no method byte)
    pub const IMPLODE: u32 = 0x0000_0100;
    /// File is compressed; each compressed sector carries a method byte
    pub const COMPRESS: u32 = 0x0000_0200;
    /// File is encrypted with a key derived from its plain name
    pub const ENCRYPTED: u32 = 0x0001_0000;
    /// Encryption key is adjusted by the block position in the archive
    pub const FIX_KEY: u32 = 0x0002_0000;
    /// File is an incremental patch
    pub const PATCH_FILE: u32 = 0x0010_0000;
    /// Placeholder marking a deletion in a patch archive
    pub const DELETE_MARKER: u32 = 0x0200_0000;
    /// A CRC table covering all sectors trails the sector data
    pub const SECTOR_CRC: u32 = 0x0400_0000;
    /// File is stored as one unit instead of being split into sectors
    pub const SINGLE_UNIT: u32 = 0x1000_0000;
    /// Entry describes a live file
    pub const EXISTS: u32 = 0x8000_0000;
}

/// A single block table entry
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockEntry {
    /// Offset of the file data, relative to the archive header
    pub file_pos: u32,
    /// Stored size in bytes, including sector offset and CRC tables
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub file_size: u32,
    /// Storage flags
    pub flags: u32,
}

impl BlockEntry {
    /// A zeroed, free entry
    pub fn free() -> Self {
        Self::default()
    }

    /// True if this entry describes a live file
    pub fn exists(&self) -> bool {
        self.flags & block_flags::EXISTS != 0
    }

    /// True if this entry is free for reuse
    pub fn is_free(&self) -> bool {
        self.flags == 0
    }

    /// True if the file data is compressed by either scheme
    pub fn is_compressed(&self) -> bool {
        self.flags & (block_flags::COMPRESS | block_flags::IMPLODE) != 0
    }

    /// True if the file data is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.flags & block_flags::ENCRYPTED != 0
    }

    /// True if the encryption key depends on the block position
    pub fn uses_fix_key(&self) -> bool {
        self.flags & block_flags::FIX_KEY != 0
    }

    /// True if the file is stored as a single unit
    pub fn is_single_unit(&self) -> bool {
        self.flags & block_flags::SINGLE_UNIT != 0
    }

    /// True if a sector CRC table trails the data
    pub fn has_sector_crc(&self) -> bool {
        self.flags & block_flags::SECTOR_CRC != 0
    }

    /// Zero the entry, freeing it for compaction or reuse
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The block table of an archive
#[derive(Debug, Clone, Default)]
pub struct BlockTable {
    entries: Vec<BlockEntry>,
}

impl BlockTable {
    /// Create a table with `size` zeroed entries
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![BlockEntry::free(); size],
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in table order
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&BlockEntry> {
        self.entries.get(index)
    }

    /// Mutable entry at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockEntry> {
        self.entries.get_mut(index)
    }

    /// Append an entry and return its index
    pub fn push(&mut self, entry: BlockEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Index of the first free entry, if any
    pub fn find_free(&self) -> Option<usize> {
        self.entries.iter().position(BlockEntry::is_free)
    }

    /// Allocate an entry index, reusing a free slot before growing
    pub fn allocate(&mut self) -> usize {
        match self.find_free() {
            Some(index) => index,
            None => self.push(BlockEntry::free()),
        }
    }

    /// Serialize all entries to little-endian bytes, unencrypted
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.entries.len() * TABLE_ENTRY_SIZE);
        for entry in &self.entries {
            buffer.extend_from_slice(&entry.file_pos.to_le_bytes());
            buffer.extend_from_slice(&entry.compressed_size.to_le_bytes());
            buffer.extend_from_slice(&entry.file_size.to_le_bytes());
            buffer.extend_from_slice(&entry.flags.to_le_bytes());
        }
        buffer
    }

    /// Read and decrypt a block table of `count` entries at `offset`
    pub fn read_from<R: Read + Seek>(reader: &mut R, offset: u64, count: usize) -> Result<Self> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; count * TABLE_ENTRY_SIZE];
        reader.read_exact(&mut buffer)?;

        crypto::decrypt(&mut buffer, BLOCK_TABLE_KEY);

        let mut table = Self::new(count);
        for (i, chunk) in buffer.chunks_exact(TABLE_ENTRY_SIZE).enumerate() {
            table.entries[i] = BlockEntry {
                file_pos: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                compressed_size: u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                file_size: u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]),
                flags: u32::from_le_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]),
            };
        }

        Ok(table)
    }

    /// Encrypt and write the table at `offset`
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W, offset: u64) -> Result<()> {
        let mut buffer = self.to_bytes();
        crypto::encrypt(&mut buffer, BLOCK_TABLE_KEY);

        writer.seek(SeekFrom::Start(offset))?;
        writer.write_all(&buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn flag_accessors() {
        let mut entry = BlockEntry::free();
        assert!(entry.is_free());
        assert!(!entry.exists());

        entry.flags = block_flags::EXISTS | block_flags::COMPRESS | block_flags::ENCRYPTED;
        assert!(entry.exists());
        assert!(entry.is_compressed());
        assert!(entry.is_encrypted());
        assert!(!entry.uses_fix_key());
        assert!(!entry.is_single_unit());

        entry.clear();
        assert!(entry.is_free());
    }

    #[test]
    fn allocate_reuses_free_slots() {
        let mut table = BlockTable::new(0);

        let first = table.allocate();
        table.get_mut(first).unwrap().flags = block_flags::EXISTS;
        let second = table.allocate();
        table.get_mut(second).unwrap().flags = block_flags::EXISTS;
        assert_eq!((first, second), (0, 1));

        table.get_mut(first).unwrap().clear();
        assert_eq!(table.allocate(), first);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn encrypted_round_trip() {
        let mut original = BlockTable::new(0);
        original.push(BlockEntry {
            file_pos: 0x20,
            compressed_size: 200,
            file_size: 300,
            flags: block_flags::EXISTS | block_flags::COMPRESS,
        });
        original.push(BlockEntry {
            file_pos: 0xE8,
            compressed_size: 500,
            file_size: 600,
            flags: block_flags::EXISTS | block_flags::ENCRYPTED,
        });

        let mut buffer = Cursor::new(Vec::new());
        original.write_to(&mut buffer, 0).unwrap();
        assert_ne!(buffer.get_ref()[..], original.to_bytes()[..]);

        let read_back = BlockTable::read_from(&mut buffer, 0, 2).unwrap();
        assert_eq!(read_back.len(), 2);

        let entry = read_back.get(0).unwrap();
        assert_eq!(entry.file_pos, 0x20);
        assert_eq!(entry.compressed_size, 200);
        assert_eq!(entry.file_size, 300);
        assert_eq!(entry.flags, block_flags::EXISTS | block_flags::COMPRESS);

        let entry = read_back.get(1).unwrap();
        assert_eq!(entry.file_pos, 0xE8);
        assert_eq!(entry.flags, block_flags::EXISTS | block_flags::ENCRYPTED);
    }
}
