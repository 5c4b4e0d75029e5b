//! Round-trip tests across all supported compression methods

use proptest::prelude::*;
use stormpaq::compression::{compress, decompress, method};

fn assorted_inputs() -> Vec<Vec<u8>> {
    vec![
        b"Hello, World!".to_vec(),
        b"A".repeat(1000),
        vec![0u8; 100],
        (0u8..=255).collect(),
        b"Hello\0\0\0\0\0World".to_vec(),
    ]
}

#[test]
fn zlib_round_trip() {
    for original in assorted_inputs() {
        let compressed = compress(&original, method::ZLIB).expect("compress");
        let decompressed =
            decompress(&compressed, method::ZLIB, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }
}

#[test]
fn bzip2_round_trip() {
    for original in assorted_inputs() {
        let compressed = compress(&original, method::BZIP2).expect("compress");
        let decompressed =
            decompress(&compressed, method::BZIP2, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }
}

#[test]
fn lzma_round_trip() {
    for original in assorted_inputs() {
        let compressed = compress(&original, method::LZMA).expect("compress");
        let decompressed =
            decompress(&compressed, method::LZMA, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }
}

#[test]
fn sparse_round_trip() {
    for original in assorted_inputs() {
        let compressed = compress(&original, method::SPARSE).expect("compress");
        let decompressed =
            decompress(&compressed, method::SPARSE, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }
}

#[test]
fn combined_methods_round_trip() {
    let original = b"run\0\0\0\0\0\0\0\0of\0\0\0\0\0\0\0\0zeros".repeat(40);

    for m in [
        method::SPARSE | method::ZLIB,
        method::SPARSE | method::BZIP2,
    ] {
        let compressed = compress(&original, m).expect("compress");
        let decompressed = decompress(&compressed, m, original.len()).expect("decompress");
        assert_eq!(decompressed, original);
    }
}

proptest! {
    #[test]
    fn zlib_round_trips_arbitrary_data(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let compressed = compress(&data, method::ZLIB).unwrap();
        let back = decompress(&compressed, method::ZLIB, data.len()).unwrap();
        prop_assert_eq!(back, data);
    }

    #[test]
    fn sparse_round_trips_arbitrary_data(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let compressed = compress(&data, method::SPARSE).unwrap();
        let back = decompress(&compressed, method::SPARSE, data.len()).unwrap();
        prop_assert_eq!(back, data);
    }

    #[test]
    fn sparse_round_trips_zero_heavy_data(
        data in proptest::collection::vec(prop_oneof![9 => Just(0u8), 1 => any::<u8>()], 0..4096)
    ) {
        let compressed = compress(&data, method::SPARSE).unwrap();
        let back = decompress(&compressed, method::SPARSE, data.len()).unwrap();
        prop_assert_eq!(back, data);
    }
}
