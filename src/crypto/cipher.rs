//! The symmetric stream cipher applied to sector data and tables

use super::table::STORM_CRYPT_TABLE;

/// Encrypt a buffer in place.
///
/// The cipher operates on little-endian 32-bit words; a trailing partial
/// word is left untouched. A key of zero leaves the data unchanged.
pub fn encrypt(data: &mut [u8], mut key: u32) {
    if key == 0 {
        return;
    }

    let mut seed: u32 = 0xEEEE_EEEE;

    for chunk in data.chunks_exact_mut(4) {
        seed = seed.wrapping_add(STORM_CRYPT_TABLE[0x400 + (key & 0xFF) as usize]);

        let plain = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let cipher = plain ^ key.wrapping_add(seed);
        chunk.copy_from_slice(&cipher.to_le_bytes());

        key = ((!key) << 0x15).wrapping_add(0x1111_1111) | (key >> 0x0B);
        seed = plain
            .wrapping_add(seed)
            .wrapping_add(seed << 5)
            .wrapping_add(3);
    }
}

/// Decrypt a buffer in place.
///
/// Inverse of [`encrypt`] for the same key.
pub fn decrypt(data: &mut [u8], mut key: u32) {
    if key == 0 {
        return;
    }

    let mut seed: u32 = 0xEEEE_EEEE;

    for chunk in data.chunks_exact_mut(4) {
        seed = seed.wrapping_add(STORM_CRYPT_TABLE[0x400 + (key & 0xFF) as usize]);

        let cipher = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let plain = cipher ^ key.wrapping_add(seed);
        chunk.copy_from_slice(&plain.to_le_bytes());

        key = ((!key) << 0x15).wrapping_add(0x1111_1111) | (key >> 0x0B);
        seed = plain
            .wrapping_add(seed)
            .wrapping_add(seed << 5)
            .wrapping_add(3);
    }
}
