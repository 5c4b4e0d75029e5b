//! # stormpaq
//!
//! A safe Rust implementation of the MPQ (Mo'PaQ) archive format: the
//! hash-indexed directory, the block table, sector-level compression and
//! encryption, and transactional editing over a staged temporary copy.
//!
//! ## Example
//!
//! ```no_run
//! use stormpaq::{FileOptions, Session};
//!
//! # fn main() -> stormpaq::Result<()> {
//! let mut session = Session::open("patch.mpq")?;
//!
//! for name in session.list_files() {
//!     println!("{}", name);
//! }
//!
//! session.write_file("readme.txt", b"hello", &FileOptions::new())?;
//! session.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! Mutations never touch the original archive until [`Session::save`];
//! closing or dropping a session discards them. [`Archive`] offers the
//! same operations directly over a file or in-memory buffer when the
//! staging layer is not wanted.

#![warn(rust_2018_idioms, unreachable_pub)]

pub mod archive;
pub mod compression;
pub mod crypto;
pub mod error;
pub mod header;
pub mod listfile;
mod sector;
pub mod session;
pub mod tables;

pub use archive::{Archive, CreateOptions, FileOptions, Store};
pub use error::{Error, Result};
pub use session::Session;
pub use tables::block_table::block_flags;
