//! Archive-level orchestration over a backing byte store
//!
//! An [`Archive`] owns its store, header, and tables exclusively. Read
//! queries take `&self` (the store sits behind a mutex); all mutation is
//! `&mut self`, so callers serialize writers by construction. File data
//! is append-only between flushes; space freed by removals is reclaimed
//! by [`Archive::compact_into`].

use crate::compression::method;
use crate::error::{Error, Result};
use crate::header::{self, Header};
use crate::listfile::{self, LISTFILE_NAME};
use crate::sector;
use crate::tables::{BlockTable, HashTable};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A backing byte store for an archive: a file or an in-memory buffer
pub trait Store: Read + Write + Seek + Send {
    /// Truncate or extend the store to `len` bytes
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl Store for std::fs::File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        std::fs::File::set_len(self, len)
    }
}

impl Store for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

/// Options for creating a new archive
#[derive(Debug, Clone)]
pub struct CreateOptions {
    hash_table_size: u32,
    sector_size_shift: u16,
    listfile: bool,
}

impl CreateOptions {
    /// Default options: 256 hash slots, 4 KiB sectors, maintained listfile
    pub fn new() -> Self {
        Self {
            hash_table_size: 256,
            sector_size_shift: 3,
            listfile: true,
        }
    }

    /// Set the hash table size; must be a power of two and bounds the
    /// number of files the archive can ever hold
    pub fn hash_table_size(mut self, size: u32) -> Self {
        self.hash_table_size = size;
        self
    }

    /// Set the sector size exponent; sector size is `512 << shift`
    pub fn sector_size_shift(mut self, shift: u16) -> Self {
        self.sector_size_shift = shift;
        self
    }

    /// Maintain an embedded `(listfile)` recording file names
    pub fn listfile(mut self, enabled: bool) -> Self {
        self.listfile = enabled;
        self
    }
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-file storage options
#[derive(Debug, Clone)]
pub struct FileOptions {
    compression: u8,
    encrypt: bool,
    fix_key: bool,
    sector_crc: bool,
    locale: u16,
}

impl FileOptions {
    /// Default options: zlib compression, no encryption, neutral locale
    pub fn new() -> Self {
        Self {
            compression: method::ZLIB,
            encrypt: false,
            fix_key: false,
            sector_crc: false,
            locale: 0,
        }
    }

    /// Set the compression method byte; zero stores the file raw
    pub fn compression(mut self, method_byte: u8) -> Self {
        self.compression = method_byte;
        self
    }

    /// Encrypt the file with a key derived from its name
    pub fn encrypt(mut self, enabled: bool) -> Self {
        self.encrypt = enabled;
        self
    }

    /// Additionally bind the encryption key to the file's position
    pub fn fix_key(mut self, enabled: bool) -> Self {
        self.fix_key = enabled;
        self
    }

    /// Append a CRC table covering all sectors
    pub fn sector_crc(mut self, enabled: bool) -> Self {
        self.sector_crc = enabled;
        self
    }

    /// Store the file under a specific locale code
    pub fn locale(mut self, locale: u16) -> Self {
        self.locale = locale;
        self
    }
}

impl Default for FileOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// An MPQ archive over an exclusive backing store
pub struct Archive {
    store: Mutex<Box<dyn Store>>,
    header: Header,
    archive_offset: u64,
    hash_table: HashTable,
    block_table: BlockTable,
    /// End of the file data region, relative to the header; tables are
    /// rewritten here on flush
    data_end: u64,
    /// Recovered file names in first-seen order
    known_names: Vec<String>,
    name_keys: HashSet<String>,
    maintain_listfile: bool,
    dirty: bool,
}

impl Archive {
    /// Open an existing archive from a backing store
    pub fn open(store: Box<dyn Store>) -> Result<Self> {
        let mut store = store;
        let (archive_offset, header) = header::find_header(&mut store)?;
        header.validate()?;

        let hash_table = HashTable::read_from(
            &mut store,
            archive_offset + header.hash_table_offset as u64,
            header.hash_table_count as usize,
        )?;
        let block_table = BlockTable::read_from(
            &mut store,
            archive_offset + header.block_table_offset as u64,
            header.block_table_count as usize,
        )?;

        let data_end = block_table
            .entries()
            .iter()
            .filter(|block| block.exists())
            .map(|block| block.file_pos as u64 + block.compressed_size as u64)
            .max()
            .unwrap_or(0)
            .max(header::HEADER_SIZE as u64);

        let mut archive = Self {
            store: Mutex::new(store),
            header,
            archive_offset,
            hash_table,
            block_table,
            data_end,
            known_names: Vec::new(),
            name_keys: HashSet::new(),
            maintain_listfile: false,
            dirty: false,
        };
        archive.load_listfile();
        Ok(archive)
    }

    /// Open an archive held in memory
    pub fn open_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open(Box::new(Cursor::new(bytes)))
    }

    /// Initialize an empty archive in a backing store
    pub fn create(store: Box<dyn Store>, options: &CreateOptions) -> Result<Self> {
        let hash_table = HashTable::new(options.hash_table_size as usize)?;

        let mut header = Header::new(options.sector_size_shift);
        header.hash_table_count = options.hash_table_size;

        let mut archive = Self {
            store: Mutex::new(store),
            header,
            archive_offset: 0,
            hash_table,
            block_table: BlockTable::new(0),
            data_end: header::HEADER_SIZE as u64,
            known_names: Vec::new(),
            name_keys: HashSet::new(),
            maintain_listfile: options.listfile,
            dirty: true,
        };
        archive.flush()?;
        Ok(archive)
    }

    /// Initialize an empty archive in memory
    pub fn create_in_memory(options: &CreateOptions) -> Result<Self> {
        Self::create(Box::new(Cursor::new(Vec::new())), options)
    }

    /// The archive header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Sector size in bytes
    pub fn sector_size(&self) -> usize {
        self.header.sector_size()
    }

    /// Number of live files, including pseudo-files
    pub fn file_count(&self) -> usize {
        self.block_table
            .entries()
            .iter()
            .filter(|block| block.exists())
            .count()
    }

    /// True if `name` is present under any locale
    pub fn contains(&self, name: &str) -> bool {
        !self.hash_table.find_all(name).is_empty()
    }

    /// Record names as known, e.g. from an external listfile; names not
    /// present in the archive are ignored.
    pub fn register_names<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            let name = name.as_ref();
            if !self.hash_table.find_all(name).is_empty() {
                self.register_name(name);
            }
        }
    }

    fn register_name(&mut self, name: &str) {
        if self.name_keys.insert(listfile::normalize_name(name)) {
            self.known_names.push(name.to_string());
        }
    }

    /// Try to load the embedded `(listfile)`, recovering file names
    fn load_listfile(&mut self) {
        if self.hash_table.find(LISTFILE_NAME, 0).is_none() {
            return;
        }
        self.maintain_listfile = true;

        match self.read_file(LISTFILE_NAME) {
            Ok(data) => {
                for name in listfile::parse_listfile(&data) {
                    self.register_name(&name);
                }
            }
            Err(e) => log::warn!("could not read (listfile): {}", e),
        }
    }

    /// Read a file's contents by name, neutral locale
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.read_file_locale(name, 0)
    }

    /// Read a file's contents by name and locale
    pub fn read_file_locale(&self, name: &str, locale: u16) -> Result<Vec<u8>> {
        let index = self
            .hash_table
            .find(name, locale)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let entry = self
            .hash_table
            .get(index)
            .ok_or_else(|| Error::corrupt("hash entry index out of range"))?;

        let block = *self
            .block_table
            .get(entry.block_index as usize)
            .ok_or_else(|| Error::corrupt("hash entry references an invalid block"))?;
        if !block.exists() {
            return Err(Error::NotFound(name.to_string()));
        }

        let mut store = self.store.lock();
        sector::read_file_data(
            &mut *store,
            self.archive_offset,
            self.header.sector_size(),
            &block,
            Some(name),
        )
    }

    /// Write a file from memory, replacing any existing entry of the
    /// same name and locale
    pub fn write_file(&mut self, name: &str, data: &[u8], options: &FileOptions) -> Result<()> {
        if data.len() as u64 > u32::MAX as u64 {
            return Err(Error::corrupt("file exceeds the 4 GiB format limit"));
        }

        if let Some(index) = self.hash_table.find_exact(name, options.locale) {
            self.remove_entry(index);
        }

        let block_index = self.block_table.allocate();
        let hash_index = self
            .hash_table
            .insert(name, options.locale, block_index as u32)?;

        let params = sector::WriteParams {
            data,
            sector_size: self.header.sector_size(),
            compression: options.compression,
            encrypt: options.encrypt,
            fix_key: options.fix_key,
            sector_crc: options.sector_crc,
            file_pos: self.data_end,
            key_name: name,
        };

        let written = {
            let mut store = self.store.lock();
            sector::write_file_data(&mut *store, self.archive_offset, &params)
        };

        match written {
            Ok(entry) => {
                if let Some(block) = self.block_table.get_mut(block_index) {
                    *block = entry;
                }
                self.data_end += entry.compressed_size as u64;
                self.register_name(name);
                self.dirty = true;
                Ok(())
            }
            Err(e) => {
                // Unlink the half-written file; the data region past
                // data_end is reused by the next write
                self.hash_table.remove(hash_index);
                Err(e)
            }
        }
    }

    /// Add a file from disk under `archived_name`, defaulting to the
    /// path's file name
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        archived_name: Option<&str>,
        options: &FileOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let name = match archived_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "path has no usable file name",
                    ))
                })?,
        };

        let data = std::fs::read(path)?;
        self.write_file(&name, &data, options)
    }

    /// Remove a file: its hash slot becomes a tombstone and its block is
    /// freed for compaction. The sector data stays until [`compact_into`].
    ///
    /// [`compact_into`]: Archive::compact_into
    pub fn remove_file(&mut self, name: &str) -> Result<()> {
        let index = self
            .hash_table
            .find(name, 0)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.remove_entry(index);
        Ok(())
    }

    fn remove_entry(&mut self, hash_index: usize) {
        if let Some(entry) = self.hash_table.get(hash_index) {
            let block_index = entry.block_index as usize;
            if let Some(block) = self.block_table.get_mut(block_index) {
                block.clear();
            }
        }
        self.hash_table.remove(hash_index);
        self.dirty = true;
    }

    /// Enumerate file names: embedded listfile names, then supplemental
    /// names, then placeholders for entries no name resolves
    pub fn list_files(&self, supplemental: &[String]) -> Vec<String> {
        listfile::enumerate(
            &self.hash_table,
            &self.block_table,
            &self.known_names,
            supplemental,
        )
    }

    /// Rewrite the embedded `(listfile)` from the current live names
    fn update_listfile(&mut self) -> Result<()> {
        let mut names: Vec<String> = self
            .known_names
            .clone()
            .into_iter()
            .filter(|name| !listfile::is_special_name(name))
            .filter(|name| !self.hash_table.find_all(name).is_empty())
            .collect();
        names.push(LISTFILE_NAME.to_string());

        let data = listfile::write_listfile(&names);
        self.write_file(LISTFILE_NAME, &data, &FileOptions::new())
    }

    /// Flush tables and header to the store, making it a valid archive
    pub fn flush(&mut self) -> Result<()> {
        if self.maintain_listfile {
            match self.update_listfile() {
                Ok(()) => {}
                Err(Error::HashTableFull) => {
                    log::warn!("hash table is full, skipping (listfile) update");
                }
                Err(e) => return Err(e),
            }
        }

        let hash_bytes = self.hash_table.len() as u64 * 16;
        let block_bytes = self.block_table.len() as u64 * 16;
        let hash_offset = self.data_end;
        let block_offset = hash_offset + hash_bytes;
        let archive_size = block_offset + block_bytes;
        if archive_size > u32::MAX as u64 {
            return Err(Error::corrupt("archive exceeds the 4 GiB format limit"));
        }

        let mut store = self.store.lock();
        self.hash_table
            .write_to(&mut *store, self.archive_offset + hash_offset)?;
        self.block_table
            .write_to(&mut *store, self.archive_offset + block_offset)?;

        self.header.hash_table_offset = hash_offset as u32;
        self.header.block_table_offset = block_offset as u32;
        self.header.block_table_count = self.block_table.len() as u32;
        self.header.archive_size = archive_size as u32;

        store.seek(SeekFrom::Start(self.archive_offset))?;
        self.header.write_to(&mut *store)?;

        store.set_len(self.archive_offset + archive_size)?;
        store.flush()?;
        drop(store);

        self.dirty = false;
        Ok(())
    }

    /// True if in-memory state has not been flushed to the store
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// First known name resolving to the given hash slot
    fn name_for_entry(&self, hash_index: usize) -> Option<String> {
        self.known_names
            .iter()
            .find(|name| self.hash_table.find_all(name).contains(&hash_index))
            .cloned()
    }

    /// Rewrite this archive into `store`, dropping deleted and orphaned
    /// blocks and packing the survivors contiguously.
    ///
    /// The hash table is carried over verbatim apart from block-index
    /// remapping: tombstones stay, because probe chains cannot be rebuilt
    /// without the names behind them. Position-keyed (FIX_KEY) files are
    /// re-encrypted at their new position when their name is known, and
    /// fail compaction otherwise. `progress` is called between blocks
    /// with `(done, total)`; returning `false` cancels the compaction and
    /// leaves this archive untouched.
    pub fn compact_into(
        &self,
        store: Box<dyn Store>,
        mut progress: impl FnMut(usize, usize) -> bool,
    ) -> Result<Archive> {
        let mut out = store;

        let mut header = Header::new(self.header.sector_size_shift);
        header.hash_table_count = self.header.hash_table_count;
        out.seek(SeekFrom::Start(0))?;
        header.write_to(&mut out)?;

        // The maintained listfile is rebuilt on flush instead of copied
        let skip_index = if self.maintain_listfile {
            self.hash_table.find(LISTFILE_NAME, 0)
        } else {
            None
        };

        let mut refs: Vec<(usize, usize)> = self
            .hash_table
            .entries()
            .iter()
            .enumerate()
            .filter(|&(index, entry)| entry.is_occupied() && Some(index) != skip_index)
            .filter_map(|(index, entry)| {
                let block_index = entry.block_index as usize;
                let live = self
                    .block_table
                    .get(block_index)
                    .is_some_and(|block| block.exists());
                live.then_some((index, block_index))
            })
            .collect();
        refs.sort_by_key(|&(_, block_index)| {
            self.block_table
                .get(block_index)
                .map(|block| block.file_pos)
                .unwrap_or(0)
        });

        let total = refs.len();
        let mut new_blocks = BlockTable::new(0);
        let mut remap: HashMap<usize, u32> = HashMap::new();
        let mut data_end = header::HEADER_SIZE as u64;

        for (done, &(hash_index, block_index)) in refs.iter().enumerate() {
            if !progress(done, total) {
                return Err(Error::compaction("cancelled by caller"));
            }
            if remap.contains_key(&block_index) {
                // Another locale entry sharing this block
                continue;
            }

            let old = *self
                .block_table
                .get(block_index)
                .ok_or_else(|| Error::corrupt("block index out of range"))?;

            let entry = if old.uses_fix_key() && old.file_pos as u64 != data_end {
                // The key is bound to the old position; re-encrypt
                let name = self.name_for_entry(hash_index).ok_or_else(|| {
                    Error::compaction("cannot relocate a position-keyed file without its name")
                })?;
                log::debug!("re-encrypting {} at new position {:#x}", name, data_end);

                let data = {
                    let mut store = self.store.lock();
                    sector::read_file_data(
                        &mut *store,
                        self.archive_offset,
                        self.header.sector_size(),
                        &old,
                        Some(&name),
                    )?
                };
                let params = sector::WriteParams {
                    data: &data,
                    sector_size: self.header.sector_size(),
                    compression: if old.is_compressed() { method::ZLIB } else { 0 },
                    encrypt: true,
                    fix_key: true,
                    sector_crc: old.has_sector_crc(),
                    file_pos: data_end,
                    key_name: &name,
                };
                sector::write_file_data(&mut out, 0, &params)?
            } else {
                // Position-independent data moves as raw bytes
                let mut buffer = vec![0u8; old.compressed_size as usize];
                {
                    let mut store = self.store.lock();
                    store.seek(SeekFrom::Start(self.archive_offset + old.file_pos as u64))?;
                    store.read_exact(&mut buffer)?;
                }
                out.seek(SeekFrom::Start(data_end))?;
                out.write_all(&buffer)?;

                let mut moved = old;
                moved.file_pos = data_end as u32;
                moved
            };

            data_end += entry.compressed_size as u64;
            let new_index = new_blocks.push(entry);
            remap.insert(block_index, new_index as u32);
        }
        progress(total, total);

        let mut new_hash = self.hash_table.clone();
        for entry in new_hash.entries_mut() {
            if entry.is_occupied() {
                match remap.get(&(entry.block_index as usize)) {
                    Some(&new_index) => entry.block_index = new_index,
                    None => entry.mark_deleted(),
                }
            }
        }

        let mut compacted = Archive {
            store: Mutex::new(out),
            header,
            archive_offset: 0,
            hash_table: new_hash,
            block_table: new_blocks,
            data_end,
            known_names: self.known_names.clone(),
            name_keys: self.name_keys.clone(),
            maintain_listfile: self.maintain_listfile,
            dirty: true,
        };
        compacted.flush()?;
        Ok(compacted)
    }
}
