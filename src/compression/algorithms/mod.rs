//! Compression algorithm implementations

pub(crate) mod bzip2;
pub(crate) mod lzma;
pub(crate) mod sparse;
pub(crate) mod zlib;
