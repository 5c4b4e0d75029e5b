//! The open-addressed hash table directory
//!
//! Entries are probed linearly from `TableOffset hash & mask`. Deleted
//! slots are tombstones: they terminate nothing during lookup but are
//! reused during insertion, so probe chains built across them survive.

use crate::crypto::{self, HASH_TABLE_KEY};
use crate::error::{Error, Result};
use crate::tables::TABLE_ENTRY_SIZE;
use std::io::{Read, Seek, SeekFrom, Write};

/// Block index value marking a never-used slot
pub const BLOCK_INDEX_EMPTY: u32 = 0xFFFF_FFFF;

/// Block index value marking a deleted slot (tombstone)
pub const BLOCK_INDEX_DELETED: u32 = 0xFFFF_FFFE;

/// A single hash table entry
#[derive(Debug, Clone, Copy)]
pub struct HashEntry {
    /// First verification hash of the file name
    pub name_a: u32,
    /// Second verification hash of the file name
    pub name_b: u32,
    /// Locale code of this entry; 0 is neutral
    pub locale: u16,
    /// Platform code; always 0 in practice
    pub platform: u16,
    /// Index into the block table, or one of the marker values
    pub block_index: u32,
}

impl HashEntry {
    /// An empty, never-used entry
    pub fn empty() -> Self {
        Self {
            name_a: 0,
            name_b: 0,
            locale: 0,
            platform: 0,
            block_index: BLOCK_INDEX_EMPTY,
        }
    }

    /// True if this slot has never held a file
    pub fn is_empty(&self) -> bool {
        self.block_index == BLOCK_INDEX_EMPTY
    }

    /// True if this slot is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.block_index == BLOCK_INDEX_DELETED
    }

    /// True if this slot references a block
    pub fn is_occupied(&self) -> bool {
        !self.is_empty() && !self.is_deleted()
    }

    /// Turn this slot into a tombstone
    pub fn mark_deleted(&mut self) {
        self.name_a = 0;
        self.name_b = 0;
        self.locale = 0;
        self.platform = 0;
        self.block_index = BLOCK_INDEX_DELETED;
    }
}

/// The hash table of an archive
#[derive(Debug, Clone)]
pub struct HashTable {
    entries: Vec<HashEntry>,
    mask: u32,
}

impl HashTable {
    /// Create an empty table; `size` must be a power of two
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(Error::corrupt(format!(
                "hash table size {} is not a power of two",
                size
            )));
        }

        Ok(Self {
            entries: vec![HashEntry::empty(); size],
            mask: (size - 1) as u32,
        })
    }

    /// Number of slots in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no slots
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All slots in table order
    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    /// All slots, mutably; used for block-index remapping on compaction
    pub(crate) fn entries_mut(&mut self) -> &mut [HashEntry] {
        &mut self.entries
    }

    /// Slot at `index`
    pub fn get(&self, index: usize) -> Option<&HashEntry> {
        self.entries.get(index)
    }

    /// Mutable slot at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut HashEntry> {
        self.entries.get_mut(index)
    }

    /// Find the slot for `name`, preferring an exact locale match and
    /// falling back to the neutral locale.
    pub fn find(&self, name: &str, locale: u16) -> Option<usize> {
        let (offset, a, b) = crypto::file_hashes(name);

        if let Some(index) = self.probe(offset, a, b, locale) {
            return Some(index);
        }
        if locale != 0 {
            return self.probe(offset, a, b, 0);
        }
        None
    }

    /// Find the slot for `name` under exactly `locale`, with no neutral
    /// fallback; used when replacing or removing a specific entry.
    pub(crate) fn find_exact(&self, name: &str, locale: u16) -> Option<usize> {
        let (offset, a, b) = crypto::file_hashes(name);
        self.probe(offset, a, b, locale)
    }

    /// Find every slot matching `name`, across all locales, in probe order
    pub fn find_all(&self, name: &str) -> Vec<usize> {
        let (offset, a, b) = crypto::file_hashes(name);
        let start = (offset & self.mask) as usize;

        let mut matches = Vec::new();
        for i in 0..self.entries.len() {
            let index = (start + i) & self.mask as usize;
            let entry = &self.entries[index];

            if entry.is_empty() {
                break;
            }
            if entry.is_occupied() && entry.name_a == a && entry.name_b == b {
                matches.push(index);
            }
        }
        matches
    }

    /// Probe for an exact (hashes, locale) match
    fn probe(&self, offset_hash: u32, a: u32, b: u32, locale: u16) -> Option<usize> {
        let start = (offset_hash & self.mask) as usize;

        for i in 0..self.entries.len() {
            let index = (start + i) & self.mask as usize;
            let entry = &self.entries[index];

            if entry.is_empty() {
                // An empty slot ends the probe chain; tombstones do not
                return None;
            }
            if entry.is_occupied()
                && entry.name_a == a
                && entry.name_b == b
                && entry.locale == locale
            {
                return Some(index);
            }
        }

        None
    }

    /// Insert `name` pointing at `block_index`, reusing the first empty
    /// or deleted slot on the probe chain.
    pub fn insert(&mut self, name: &str, locale: u16, block_index: u32) -> Result<usize> {
        let (offset, a, b) = crypto::file_hashes(name);
        self.insert_raw(offset, a, b, locale, block_index)
    }

    /// Insert by precomputed hashes; exposed for probe-chain tests
    pub(crate) fn insert_raw(
        &mut self,
        offset_hash: u32,
        a: u32,
        b: u32,
        locale: u16,
        block_index: u32,
    ) -> Result<usize> {
        let start = (offset_hash & self.mask) as usize;

        for i in 0..self.entries.len() {
            let index = (start + i) & self.mask as usize;
            let entry = &mut self.entries[index];

            if entry.is_empty() || entry.is_deleted() {
                *entry = HashEntry {
                    name_a: a,
                    name_b: b,
                    locale,
                    platform: 0,
                    block_index,
                };
                return Ok(index);
            }
        }

        Err(Error::HashTableFull)
    }

    /// Tombstone the slot at `index`
    pub fn remove(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.mark_deleted();
        }
    }

    /// Serialize all entries to little-endian bytes, unencrypted
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.entries.len() * TABLE_ENTRY_SIZE);
        for entry in &self.entries {
            buffer.extend_from_slice(&entry.name_a.to_le_bytes());
            buffer.extend_from_slice(&entry.name_b.to_le_bytes());
            buffer.extend_from_slice(&entry.locale.to_le_bytes());
            buffer.extend_from_slice(&entry.platform.to_le_bytes());
            buffer.extend_from_slice(&entry.block_index.to_le_bytes());
        }
        buffer
    }

    /// Read and decrypt a hash table of `count` entries at `offset`
    pub fn read_from<R: Read + Seek>(reader: &mut R, offset: u64, count: usize) -> Result<Self> {
        let mut table = Self::new(count)?;

        reader.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; count * TABLE_ENTRY_SIZE];
        reader.read_exact(&mut buffer)?;

        crypto::decrypt(&mut buffer, HASH_TABLE_KEY);

        for (i, chunk) in buffer.chunks_exact(TABLE_ENTRY_SIZE).enumerate() {
            table.entries[i] = HashEntry {
                name_a: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                name_b: u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                locale: u16::from_le_bytes([chunk[8], chunk[9]]),
                platform: u16::from_le_bytes([chunk[10], chunk[11]]),
                block_index: u32::from_le_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]),
            };
        }

        Ok(table)
    }

    /// Encrypt and write the table at `offset`
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W, offset: u64) -> Result<()> {
        let mut buffer = self.to_bytes();
        crypto::encrypt(&mut buffer, HASH_TABLE_KEY);

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
    fn entry_state_transitions() {
        let mut entry = HashEntry::empty();
        assert!(entry.is_empty());
        assert!(!entry.is_deleted());
        assert!(!entry.is_occupied());

        entry.block_index = 3;
        assert!(entry.is_occupied());

        entry.mark_deleted();
        assert!(!entry.is_empty());
        assert!(entry.is_deleted());
        assert!(!entry.is_occupied());
    }

    #[test]
    fn size_must_be_power_of_two() {
        assert!(HashTable::new(0).is_err());
        assert!(HashTable::new(10).is_err());
        assert!(HashTable::new(16).is_ok());
    }

    #[test]
    fn insert_then_find() {
        let mut table = HashTable::new(16).unwrap();

        table.insert("unit.txt", 0, 0).unwrap();
        table.insert("war3map.j", 0, 1).unwrap();

        let idx = table.find("unit.txt", 0).unwrap();
        assert_eq!(table.get(idx).unwrap().block_index, 0);

        let idx = table.find("war3map.j", 0).unwrap();
        assert_eq!(table.get(idx).unwrap().block_index, 1);

        assert!(table.find("missing.txt", 0).is_none());
    }

    #[test]
    fn every_inserted_name_is_found() {
        let mut table = HashTable::new(32).unwrap();

        let names: Vec<String> = (0..16).map(|i| format!("data\\file{:03}.dat", i)).collect();
        for (i, name) in names.iter().enumerate() {
            table.insert(name, 0, i as u32).unwrap();
        }

        for (i, name) in names.iter().enumerate() {
            let idx = table.find(name, 0).unwrap();
            assert_eq!(table.get(idx).unwrap().block_index, i as u32);
        }
    }

    #[test]
    fn probe_chain_survives_tombstones() {
        let mut table = HashTable::new(8).unwrap();

        // Force three entries onto the same probe chain
        let offset = 5u32;
        let first = table.insert_raw(offset, 0xA1, 0xB1, 0, 1).unwrap();
        let second = table.insert_raw(offset, 0xA2, 0xB2, 0, 2).unwrap();
        let third = table.insert_raw(offset, 0xA3, 0xB3, 0, 3).unwrap();
        assert_eq!(first, 5);
        assert_eq!(second, 6);
        assert_eq!(third, 7);

        // Delete the middle entry; the third must still be reachable
        table.remove(second);
        assert!(table.probe(offset, 0xA2, 0xB2, 0).is_none());
        assert_eq!(table.probe(offset, 0xA3, 0xB3, 0), Some(third));

        // A new insert reuses the tombstone, and both remain resolvable
        let reused = table.insert_raw(offset, 0xA4, 0xB4, 0, 4).unwrap();
        assert_eq!(reused, second);
        assert_eq!(table.probe(offset, 0xA4, 0xB4, 0), Some(reused));
        assert_eq!(table.probe(offset, 0xA3, 0xB3, 0), Some(third));
    }

    #[test]
    fn full_table_rejects_inserts() {
        let mut table = HashTable::new(2).unwrap();
        table.insert("a.txt", 0, 0).unwrap();
        table.insert("b.txt", 0, 1).unwrap();

        assert!(matches!(
            table.insert("c.txt", 0, 2),
            Err(Error::HashTableFull)
        ));
    }

    #[test]
    fn locale_fallback_to_neutral() {
        let mut table = HashTable::new(16).unwrap();
        table.insert("config.txt", 0, 0).unwrap();
        table.insert("strings.txt", 0x409, 1).unwrap();

        // Exact locale match wins
        let idx = table.find("strings.txt", 0x409).unwrap();
        assert_eq!(table.get(idx).unwrap().block_index, 1);

        // A locale-specific request falls back to the neutral entry
        let idx = table.find("config.txt", 0x409).unwrap();
        assert_eq!(table.get(idx).unwrap().block_index, 0);

        // A neutral request does not see the locale-specific entry
        assert!(table.find("strings.txt", 0).is_none());
    }

    #[test]
    fn encrypted_round_trip() {
        let mut original = HashTable::new(8).unwrap();
        original.insert("one.txt", 0, 1).unwrap();
        original.insert("two.txt", 0, 2).unwrap();

        let mut buffer = Cursor::new(Vec::new());
        original.write_to(&mut buffer, 0).unwrap();

        // The serialized table must not be readable as plaintext
        let plain = original.to_bytes();
        assert_ne!(buffer.get_ref()[..], plain[..]);

        let read_back = HashTable::read_from(&mut buffer, 0, 8).unwrap();
        let idx = read_back.find("one.txt", 0).unwrap();
        assert_eq!(read_back.get(idx).unwrap().block_index, 1);
        let idx = read_back.find("two.txt", 0).unwrap();
        assert_eq!(read_back.get(idx).unwrap().block_index, 2);
    }
}
