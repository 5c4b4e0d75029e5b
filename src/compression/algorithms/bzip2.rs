//! bzip2 codec

use crate::{Error, Result};
use bzip2::{read::BzDecoder, write::BzEncoder, Compression};
use std::io::{Read, Write};

/// Compress data with bzip2
pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| Error::codec(format!("bzip2 compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::codec(format!("bzip2 compression failed: {}", e)))
}

/// Decompress data with bzip2, validating the decompressed length
pub(crate) fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let decompressed = decompress_unbounded(data)?;

    if decompressed.len() != expected_size {
        return Err(Error::codec(format!(
            "bzip2 size mismatch: expected {} bytes, got {}",
            expected_size,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

/// Decompress without a length check
pub(crate) fn decompress_unbounded(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::codec(format!("bzip2 decompression failed: {}", e)))?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let original = b"B".repeat(1000);

        let compressed = compress(&original).expect("compress");
        assert!(compressed.len() < original.len());

        let decompressed = decompress(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn malformed_stream_is_rejected() {
        assert!(decompress(b"not a bzip2 stream", 16).is_err());
    }
}
