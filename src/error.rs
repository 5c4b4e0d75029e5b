//! Error types for MPQ archive operations

use std::io;
use thiserror::Error;

/// Errors that can occur while reading or mutating an MPQ archive
#[derive(Error, Debug)]
pub enum Error {
    /// Backing store failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad signature, table sizes, or offsets outside archive bounds
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// No hash table entry for the requested name/locale
    #[error("file not found: {0}")]
    NotFound(String),

    /// CRC or key mismatch while decrypting sector data
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Malformed compressed stream or decompressed size mismatch
    #[error("compression error: {0}")]
    Codec(String),

    /// Compaction could not reclaim space or was cancelled
    #[error("compaction failed: {0}")]
    Compaction(String),

    /// No empty or deleted slot left in the hash table
    #[error("hash table is full")]
    HashTableFull,
}

impl Error {
    /// Create a corrupt-archive error
    pub(crate) fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::CorruptArchive(msg.into())
    }

    /// Create a codec error
    pub(crate) fn codec<S: Into<String>>(msg: S) -> Self {
        Error::Codec(msg.into())
    }

    /// Create a decryption error
    pub(crate) fn decryption<S: Into<String>>(msg: S) -> Self {
        Error::Decryption(msg.into())
    }

    /// Create a compaction error
    pub(crate) fn compaction<S: Into<String>>(msg: S) -> Self {
        Error::Compaction(msg.into())
    }
}

/// Result type for all archive operations
pub type Result<T> = std::result::Result<T, Error>;
