//! The MPQ hash family used for table lookups and key derivation

use super::table::STORM_CRYPT_TABLE;

/// Hash types used by MPQ archives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// Starting index into the hash table
    TableOffset = 0,
    /// First verification hash stored in a hash entry
    NameA = 1,
    /// Second verification hash stored in a hash entry
    NameB = 2,
    /// Encryption key derivation for file contents
    FileKey = 3,
}

/// Normalize a name byte the way the format expects: forward slashes
/// become backslashes, ASCII letters are uppercased.
#[inline]
fn normalize(b: u8) -> u8 {
    match b {
        b'/' => b'\\',
        b'a'..=b'z' => b - 32,
        other => other,
    }
}

/// Calculate a hash of `input` for the given hash type.
///
/// The hash is case-insensitive and treats `/` and `\` as the same
/// separator, so `hash_string("a/B.txt", t) == hash_string("A\\b.TXT", t)`.
pub fn hash_string(input: &str, hash_type: HashType) -> u32 {
    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for &b in input.as_bytes() {
        let ch = normalize(b);
        let index = (hash_type as usize) * 0x100 + ch as usize;

        seed1 = STORM_CRYPT_TABLE[index] ^ seed1.wrapping_add(seed2);
        seed2 = (ch as u32)
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Compute the three lookup hashes for a full archive path:
/// `(TableOffset, NameA, NameB)`.
///
/// Unlike key derivation, lookup hashes cover the whole path including
/// directory components.
pub fn file_hashes(name: &str) -> (u32, u32, u32) {
    (
        hash_string(name, HashType::TableOffset),
        hash_string(name, HashType::NameA),
        hash_string(name, HashType::NameB),
    )
}

/// Derive the base encryption key for a file.
///
/// Keys are derived from the plain file name only, the part after the
/// last path separator.
pub fn file_key(name: &str) -> u32 {
    let plain = name
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(name);
    hash_string(plain, HashType::FileKey)
}

/// Apply the FIX_KEY adjustment: the base key is offset by the block's
/// position within the archive and mixed with the uncompressed size.
pub fn adjust_key(base_key: u32, block_offset: u32, file_size: u32) -> u32 {
    base_key.wrapping_add(block_offset) ^ file_size
}
