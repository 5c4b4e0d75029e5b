//! Per-sector compression: method-byte constants and the unified
//! compress/decompress entry points.

pub mod algorithms;

use crate::{Error, Result};

/// Compression method bytes, as stored in front of compressed sector data
pub mod method {
    /// Huffman coding (audio data, unsupported)
    pub const HUFFMAN: u8 = 0x01;
    /// zlib deflate
    pub const ZLIB: u8 = 0x02;
    /// PKWARE Data Compression Library implode (unsupported)
    pub const PKWARE: u8 = 0x08;
    /// bzip2
    pub const BZIP2: u8 = 0x10;
    /// LZMA; overlaps ZLIB|BZIP2 bit-wise, so it is matched exactly
    pub const LZMA: u8 = 0x12;
    /// Sparse/RLE
    pub const SPARSE: u8 = 0x20;
    /// IMA ADPCM mono (legacy audio codec, unsupported)
    pub const ADPCM_MONO: u8 = 0x40;
    /// IMA ADPCM stereo (legacy audio codec, unsupported)
    pub const ADPCM_STEREO: u8 = 0x80;
}

/// Compress data using the given method byte.
///
/// A method of zero is a pass-through. For combined methods, sparse is
/// applied before the entropy coder.
pub fn compress(data: &[u8], method_byte: u8) -> Result<Vec<u8>> {
    match method_byte {
        0 => Ok(data.to_vec()),
        method::ZLIB => algorithms::zlib::compress(data),
        method::BZIP2 => algorithms::bzip2::compress(data),
        method::LZMA => algorithms::lzma::compress(data),
        method::SPARSE => algorithms::sparse::compress(data),
        m if m == method::SPARSE | method::ZLIB => {
            let sparse = algorithms::sparse::compress(data)?;
            algorithms::zlib::compress(&sparse)
        }
        m if m == method::SPARSE | method::BZIP2 => {
            let sparse = algorithms::sparse::compress(data)?;
            algorithms::bzip2::compress(&sparse)
        }
        method::PKWARE => Err(Error::codec(
            "PKWARE implode compression is not supported",
        )),
        m if m & (method::ADPCM_MONO | method::ADPCM_STEREO | method::HUFFMAN) != 0 => Err(
            Error::codec(format!("legacy audio codec 0x{:02X} is not supported", m)),
        ),
        m => Err(Error::codec(format!("unknown compression method 0x{:02X}", m))),
    }
}

/// Decompress data using the given method byte.
///
/// `expected_size` is the uncompressed length recorded in the block entry;
/// a mismatch is reported as a codec error.
pub fn decompress(data: &[u8], method_byte: u8, expected_size: usize) -> Result<Vec<u8>> {
    if method_byte == 0 {
        return Ok(data.to_vec());
    }
    if data.is_empty() {
        return Err(Error::codec("empty compressed data"));
    }

    log::debug!(
        "decompressing {} bytes to {} bytes with method 0x{:02X}",
        data.len(),
        expected_size,
        method_byte
    );

    match method_byte {
        method::ZLIB => algorithms::zlib::decompress(data, expected_size),
        method::BZIP2 => algorithms::bzip2::decompress(data, expected_size),
        method::LZMA => algorithms::lzma::decompress(data, expected_size),
        method::SPARSE => algorithms::sparse::decompress(data, expected_size),
        m if m == method::SPARSE | method::ZLIB => {
            let sparse = algorithms::zlib::decompress_unbounded(data)?;
            algorithms::sparse::decompress(&sparse, expected_size)
        }
        m if m == method::SPARSE | method::BZIP2 => {
            let sparse = algorithms::bzip2::decompress_unbounded(data)?;
            algorithms::sparse::decompress(&sparse, expected_size)
        }
        method::PKWARE => Err(Error::codec(
            "PKWARE implode decompression is not supported",
        )),
        m if m & (method::ADPCM_MONO | method::ADPCM_STEREO | method::HUFFMAN) != 0 => Err(
            Error::codec(format!("legacy audio codec 0x{:02X} is not supported", m)),
        ),
        m => Err(Error::codec(format!("unknown compression method 0x{:02X}", m))),
    }
}
