//! MPQ cryptography: the storm crypt table, the classic hash family,
//! and the symmetric stream cipher used for sectors and tables.

mod cipher;
mod hash;
mod table;

pub use cipher::{decrypt, encrypt};
pub use hash::{adjust_key, file_hashes, file_key, hash_string, HashType};
pub use table::{BLOCK_TABLE_KEY, HASH_TABLE_KEY, STORM_CRYPT_TABLE};
