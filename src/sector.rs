//! Sector I/O engine: reads and writes file payloads sector by sector,
//! handling compression, encryption, and the trailing CRC table.
//!
//! Layout of a stored file, all offsets relative to the block position:
//! - compressed, multi-sector: sector offset table (`count + 1` u32s,
//!   last entry marks the end of sector data), sector payloads, then an
//!   optional CRC table (one u32 per sector).
//! - uncompressed, multi-sector: bare sectors at `i * sector_size`.
//! - single unit: one payload, optionally followed by one CRC.
//!
//! Compressed sector payloads start with a method byte unless the block
//! uses the IMPLODE flag, where the flag alone names the codec. A sector
//! that compression fails to shrink is stored raw; readers detect this
//! by comparing stored and expected sizes. CRCs cover the stored payload
//! after decryption, so a wrong key surfaces as a CRC mismatch.

use crate::compression::{self, method};
use crate::crypto;
use crate::error::{Error, Result};
use crate::tables::block_table::{block_flags, BlockEntry};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// Parameters for writing a file's sector data
pub(crate) struct WriteParams<'a> {
    /// Uncompressed file contents
    pub data: &'a [u8],
    /// Archive sector size in bytes
    pub sector_size: usize,
    /// Compression method byte; zero stores the file raw
    pub compression: u8,
    /// Encrypt the file data
    pub encrypt: bool,
    /// Adjust the encryption key by the block position
    pub fix_key: bool,
    /// Append a CRC table covering all sectors
    pub sector_crc: bool,
    /// Position the data will occupy, relative to the archive header
    pub file_pos: u64,
    /// Archive name of the file, for key derivation
    pub key_name: &'a str,
}

/// Derive the decryption key for a block, if it is encrypted.
///
/// Encrypted blocks whose name is unknown cannot be read; the key is
/// derived from the plain file name.
fn block_key(block: &BlockEntry, key_name: Option<&str>) -> Result<Option<u32>> {
    if !block.is_encrypted() {
        return Ok(None);
    }
    let name = key_name.ok_or_else(|| {
        Error::decryption("file is encrypted and its name is not known")
    })?;
    let mut key = crypto::file_key(name);
    if block.uses_fix_key() {
        key = crypto::adjust_key(key, block.file_pos, block.file_size);
    }
    Ok(Some(key))
}

/// Expected uncompressed size of sector `index`
fn expected_sector_size(index: usize, count: usize, sector_size: usize, file_size: usize) -> usize {
    if index + 1 < count {
        sector_size
    } else {
        file_size - (count - 1) * sector_size
    }
}

/// Decode one stored sector into its uncompressed form
fn decode_sector(block: &BlockEntry, stored: &[u8], expected: usize) -> Result<Vec<u8>> {
    if stored.len() > expected {
        return Err(Error::corrupt("sector larger than its uncompressed size"));
    }
    if stored.len() == expected {
        // Stored raw: compression did not shrink this sector
        return Ok(stored.to_vec());
    }
    if stored.is_empty() {
        // Sparse sector with no stored bytes decodes to zeros
        return Ok(vec![0u8; expected]);
    }

    if block.flags & block_flags::IMPLODE != 0 {
        compression::decompress(stored, method::PKWARE, expected)
    } else {
        compression::decompress(&stored[1..], stored[0], expected)
    }
}

/// Read and decode a file's contents.
///
/// `key_name` is the archive name used for key derivation when the block
/// is encrypted; pass `None` for anonymous blocks.
pub(crate) fn read_file_data<R: Read + Seek>(
    reader: &mut R,
    archive_offset: u64,
    sector_size: usize,
    block: &BlockEntry,
    key_name: Option<&str>,
) -> Result<Vec<u8>> {
    let file_size = block.file_size as usize;
    if file_size == 0 {
        return Ok(Vec::new());
    }

    let key = block_key(block, key_name)?;

    let mut raw = vec![0u8; block.compressed_size as usize];
    reader.seek(SeekFrom::Start(archive_offset + block.file_pos as u64))?;
    reader.read_exact(&mut raw)?;

    if block.is_single_unit() {
        return read_single_unit(block, raw, key);
    }

    let count = file_size.div_ceil(sector_size);

    if !block.is_compressed() {
        // Bare sectors at fixed positions, individually encrypted
        if raw.len() != file_size {
            return Err(Error::corrupt("stored size does not match file size"));
        }
        if let Some(key) = key {
            for (i, chunk) in raw.chunks_mut(sector_size).enumerate() {
                crypto::decrypt(chunk, key.wrapping_add(i as u32));
            }
        }
        return Ok(raw);
    }

    // Sector offset table precedes the sector data
    let table_len = (count + 1) * 4;
    if raw.len() < table_len {
        return Err(Error::corrupt("file data too small for its sector table"));
    }
    let mut table_bytes = raw[..table_len].to_vec();
    if let Some(key) = key {
        crypto::decrypt(&mut table_bytes, key.wrapping_sub(1));
    }
    let offsets: Vec<u32> = table_bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    // The first sector starts right after the table; anything else means
    // the table is damaged, or decrypted with the wrong key
    if offsets[0] as usize != table_len {
        return Err(if key.is_some() {
            Error::decryption("sector offset table does not decrypt with this key")
        } else {
            Error::corrupt("sector offset table does not start after itself")
        });
    }

    let data_end = offsets[count] as usize;
    let crc_len = if block.has_sector_crc() { count * 4 } else { 0 };
    if data_end + crc_len > raw.len() {
        return Err(Error::corrupt("sector offsets exceed stored size"));
    }

    let crcs: Option<Vec<u32>> = block.has_sector_crc().then(|| {
        raw[data_end..data_end + crc_len]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    });

    let mut output = Vec::with_capacity(file_size);
    for i in 0..count {
        let start = offsets[i] as usize;
        let end = offsets[i + 1] as usize;
        if start < table_len || start > end || end > data_end {
            return Err(Error::corrupt(format!("invalid offset for sector {}", i)));
        }

        let mut sector = raw[start..end].to_vec();
        if let Some(key) = key {
            crypto::decrypt(&mut sector, key.wrapping_add(i as u32));
        }
        if let Some(ref crcs) = crcs {
            if crc32fast::hash(&sector) != crcs[i] {
                return Err(Error::decryption(format!("CRC mismatch in sector {}", i)));
            }
        }

        let expected = expected_sector_size(i, count, sector_size, file_size);
        output.extend(decode_sector(block, &sector, expected)?);
    }

    if output.len() != file_size {
        return Err(Error::corrupt("decoded size does not match file size"));
    }
    Ok(output)
}

/// Read a file stored as a single unit
fn read_single_unit(block: &BlockEntry, raw: Vec<u8>, key: Option<u32>) -> Result<Vec<u8>> {
    let crc_len = if block.has_sector_crc() { 4 } else { 0 };
    if raw.len() < crc_len {
        return Err(Error::corrupt("file data too small for its CRC"));
    }

    let (payload_bytes, crc_bytes) = raw.split_at(raw.len() - crc_len);
    let mut payload = payload_bytes.to_vec();
    if let Some(key) = key {
        crypto::decrypt(&mut payload, key);
    }

    if crc_len == 4 {
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(&payload) != stored {
            return Err(Error::decryption("CRC mismatch in single-unit file"));
        }
    }

    decode_sector(block, &payload, block.file_size as usize)
}

/// Encode one sector, keeping it raw when compression does not shrink it.
/// Returns the stored bytes and whether they are compressed.
fn encode_sector(chunk: &[u8], method_byte: u8) -> Result<(Vec<u8>, bool)> {
    if method_byte == 0 {
        return Ok((chunk.to_vec(), false));
    }

    let compressed = compression::compress(chunk, method_byte)?;
    if compressed.len() + 1 < chunk.len() {
        let mut stored = Vec::with_capacity(1 + compressed.len());
        stored.push(method_byte);
        stored.extend_from_slice(&compressed);
        Ok((stored, true))
    } else {
        log::debug!(
            "compression 0x{:02X} not beneficial for {} byte sector, storing raw",
            method_byte,
            chunk.len()
        );
        Ok((chunk.to_vec(), false))
    }
}

/// Encode and write a file's contents at `params.file_pos`, returning the
/// finished block entry.
pub(crate) fn write_file_data<W: Write + Seek>(
    writer: &mut W,
    archive_offset: u64,
    params: &WriteParams<'_>,
) -> Result<BlockEntry> {
    if params.file_pos > u32::MAX as u64 {
        return Err(Error::corrupt("archive exceeds the 4 GiB format limit"));
    }

    let data = params.data;
    let mut flags = block_flags::EXISTS;

    let mut entry = BlockEntry {
        file_pos: params.file_pos as u32,
        compressed_size: 0,
        file_size: data.len() as u32,
        flags,
    };

    if data.is_empty() {
        entry.flags |= block_flags::SINGLE_UNIT;
        return Ok(entry);
    }

    let base_key = if params.encrypt {
        flags |= block_flags::ENCRYPTED;
        let mut key = crypto::file_key(params.key_name);
        if params.fix_key {
            flags |= block_flags::FIX_KEY;
            key = crypto::adjust_key(key, params.file_pos as u32, data.len() as u32);
        }
        Some(key)
    } else {
        None
    };

    writer.seek(SeekFrom::Start(archive_offset + params.file_pos))?;

    if data.len() <= params.sector_size {
        // Single unit
        flags |= block_flags::SINGLE_UNIT;

        let (mut payload, was_compressed) = encode_sector(data, params.compression)?;
        if was_compressed {
            flags |= block_flags::COMPRESS;
        }

        let crc = params.sector_crc.then(|| {
            flags |= block_flags::SECTOR_CRC;
            crc32fast::hash(&payload)
        });
        if let Some(key) = base_key {
            crypto::encrypt(&mut payload, key);
        }

        writer.write_all(&payload)?;
        let mut total = payload.len();
        if let Some(crc) = crc {
            writer.write_u32::<LittleEndian>(crc)?;
            total += 4;
        }

        entry.compressed_size = total as u32;
        entry.flags = flags;
        return Ok(entry);
    }

    let count = data.len().div_ceil(params.sector_size);

    if params.compression == 0 {
        // Bare sectors; no offset table, so no room for a CRC table either
        if params.sector_crc {
            log::debug!("sector CRCs require a sector offset table, skipping for raw file");
        }
        if let Some(key) = base_key {
            for (i, chunk) in data.chunks(params.sector_size).enumerate() {
                let mut sector = chunk.to_vec();
                crypto::encrypt(&mut sector, key.wrapping_add(i as u32));
                writer.write_all(&sector)?;
            }
        } else {
            writer.write_all(data)?;
        }

        entry.compressed_size = data.len() as u32;
        entry.flags = flags;
        return Ok(entry);
    }

    // Compressed, sectored: offset table + payloads + optional CRC table
    flags |= block_flags::COMPRESS;
    if params.sector_crc {
        flags |= block_flags::SECTOR_CRC;
    }

    let table_len = (count + 1) * 4;
    let mut sectors = Vec::with_capacity(count);
    let mut crcs = Vec::with_capacity(if params.sector_crc { count } else { 0 });

    for chunk in data.chunks(params.sector_size) {
        let (stored, _) = encode_sector(chunk, params.compression)?;
        if params.sector_crc {
            crcs.push(crc32fast::hash(&stored));
        }
        sectors.push(stored);
    }

    let mut offsets = Vec::with_capacity(count + 1);
    let mut running = table_len as u32;
    offsets.push(running);
    for sector in &sectors {
        running += sector.len() as u32;
        offsets.push(running);
    }

    let mut table_bytes = Vec::with_capacity(table_len);
    for offset in &offsets {
        table_bytes.write_u32::<LittleEndian>(*offset)?;
    }

    if let Some(key) = base_key {
        crypto::encrypt(&mut table_bytes, key.wrapping_sub(1));
        for (i, sector) in sectors.iter_mut().enumerate() {
            crypto::encrypt(sector, key.wrapping_add(i as u32));
        }
    }

    writer.write_all(&table_bytes)?;
    for sector in &sectors {
        writer.write_all(sector)?;
    }
    let mut total = running as usize;
    for crc in &crcs {
        writer.write_u32::<LittleEndian>(*crc)?;
        total += 4;
    }

    entry.compressed_size = total as u32;
    entry.flags = flags;
    Ok(entry)
}
