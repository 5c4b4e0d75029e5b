//! Sparse/RLE codec
//!
//! A control byte with the high bit set encodes a run of zeros; otherwise
//! it is a literal count followed by that many bytes. 0xFF ends the
//! stream, so zero runs are capped at 0x7E per control byte. Trailing
//! zeros may be omitted and are restored from the expected size.

use crate::{Error, Result};

const END_MARKER: u8 = 0xFF;
const MAX_ZERO_RUN: usize = 0x7E;
const MAX_LITERAL_RUN: usize = 0x7F;

/// Compress using sparse/RLE encoding
pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let zero_start = pos;
        while pos < data.len() && data[pos] == 0 {
            pos += 1;
        }

        let mut zero_count = pos - zero_start;
        while zero_count > 0 {
            let chunk = zero_count.min(MAX_ZERO_RUN);
            output.push(0x80 | (chunk as u8));
            zero_count -= chunk;
        }

        let data_start = pos;
        while pos < data.len() && data[pos] != 0 && (pos - data_start) < MAX_LITERAL_RUN {
            pos += 1;
        }

        let data_count = pos - data_start;
        if data_count > 0 {
            output.push(data_count as u8);
            output.extend_from_slice(&data[data_start..pos]);
        }
    }

    output.push(END_MARKER);

    Ok(output)
}

/// Decompress sparse/RLE encoded data
pub(crate) fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size);
    let mut pos = 0;

    while pos < data.len() && output.len() < expected_size {
        let control = data[pos];
        pos += 1;

        if control == END_MARKER {
            break;
        }

        if control & 0x80 != 0 {
            let count = (control & 0x7F) as usize;
            output.resize(output.len() + count, 0);
        } else {
            let count = control as usize;
            if pos + count > data.len() {
                return Err(Error::codec("sparse decompression: unexpected end of data"));
            }
            output.extend_from_slice(&data[pos..pos + count]);
            pos += count;
        }
    }

    if output.len() > expected_size {
        return Err(Error::codec(format!(
            "sparse size mismatch: expected {} bytes, got {}",
            expected_size,
            output.len()
        )));
    }

    // Restore an elided zero tail
    output.resize(expected_size, 0);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompress_known_stream() {
        let compressed = vec![
            5, b'H', b'e', b'l', b'l', b'o', // 5 literal bytes
            0x85, // 5 zeros
            5, b'W', b'o', b'r', b'l', b'd', // 5 literal bytes
            END_MARKER,
        ];

        let decompressed = decompress(&compressed, 15).expect("decompress");
        assert_eq!(decompressed, b"Hello\0\0\0\0\0World");
    }

    #[test]
    fn round_trip() {
        let original = b"Hello\0\0\0\0\0World\0\0\0!!!";

        let compressed = compress(original).expect("compress");
        let decompressed = decompress(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn all_zeros_compress_well() {
        let original = vec![0u8; 100];

        let compressed = compress(&original).expect("compress");
        assert!(compressed.len() < original.len());

        let decompressed = decompress(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn long_zero_run_is_not_confused_with_end_marker() {
        // A 127-byte zero run followed by data must survive; a naive
        // encoder would emit 0xFF as a run control byte here.
        let mut original = vec![0u8; 127];
        original.extend_from_slice(b"tail");

        let compressed = compress(&original).expect("compress");
        let decompressed = decompress(&compressed, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn truncated_literal_is_rejected() {
        // Literal control byte promising more data than present
        let compressed = vec![10, b'a', b'b'];
        assert!(decompress(&compressed, 10).is_err());
    }
}
