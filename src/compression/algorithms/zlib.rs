//! zlib deflate codec

use crate::{Error, Result};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::io::{Read, Write};

/// Compress data with zlib
pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| Error::codec(format!("zlib compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::codec(format!("zlib compression failed: {}", e)))
}

/// Decompress data with zlib, validating the decompressed length
pub(crate) fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let decompressed = decompress_unbounded(data)?;

    if decompressed.len() != expected_size {
        return Err(Error::codec(format!(
            "zlib size mismatch: expected {} bytes, got {}",
            expected_size,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

/// Decompress without a length check, for intermediate stages of
/// combined methods where the stage size is not recorded.
pub(crate) fn decompress_unbounded(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::codec(format!("zlib decompression failed: {}", e)))?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let original = b"This is test data for zlib compression. It repeats: test data test data.";

        let compressed = compress(original).expect("compress");
        assert!(compressed.len() < original.len());

        let decompressed = decompress(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn malformed_stream_is_rejected() {
        assert!(decompress(b"\xFF\xFF\xFF\xFF", 16).is_err());
    }
}
