//! LZMA codec via the pure-Rust lzma-rs implementation

use crate::{Error, Result};
use std::io::Cursor;

/// Compress data with LZMA
pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut compressed = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(data), &mut compressed)
        .map_err(|e| Error::codec(format!("LZMA compression failed: {}", e)))?;
    Ok(compressed)
}

/// Decompress data with LZMA, validating the decompressed length
pub(crate) fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(expected_size);
    lzma_rs::lzma_decompress(&mut Cursor::new(data), &mut decompressed)
        .map_err(|e| Error::codec(format!("LZMA decompression failed: {:?}", e)))?;

    if decompressed.len() != expected_size {
        return Err(Error::codec(format!(
            "LZMA size mismatch: expected {} bytes, got {}",
            expected_size,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let original = b"The quick brown fox jumps over the lazy dog, repeatedly and at length.";

        let compressed = compress(original).expect("compress");
        let decompressed = decompress(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn malformed_stream_is_rejected() {
        assert!(decompress(&[0u8; 4], 16).is_err());
    }
}
