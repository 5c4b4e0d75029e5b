//! The `(listfile)` pseudo-file and merged name enumeration
//!
//! The hash table stores no file names, so names are recovered from the
//! embedded `(listfile)` and from externally supplied lists. Enumeration
//! merges both against the raw hash table, reporting still-unresolved
//! entries as synthetic placeholders.

use crate::tables::{BlockTable, HashTable};
use std::collections::HashSet;

/// Name of the embedded listfile pseudo-file
pub const LISTFILE_NAME: &str = "(listfile)";

/// Parse a `(listfile)` into individual names.
///
/// One name per line; `;` and `#` start comments; surrounding whitespace
/// is trimmed; invalid UTF-8 is tolerated with lossy conversion.
pub fn parse_listfile(data: &[u8]) -> Vec<String> {
    let content = match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => {
            log::warn!("(listfile) contains invalid UTF-8, using lossy conversion");
            String::from_utf8_lossy(data).into_owned()
        }
    };

    let files: Vec<String> = content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                return None;
            }

            // Tolerate the filename;metadata variant
            let name = match line.find(';') {
                Some(pos) => line[..pos].trim(),
                None => line,
            };

            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect();

    log::debug!("parsed {} names from (listfile)", files.len());
    files
}

/// Serialize names into `(listfile)` content
pub fn write_listfile<S: AsRef<str>>(names: &[S]) -> Vec<u8> {
    let mut output = Vec::new();
    for name in names {
        output.extend_from_slice(name.as_ref().as_bytes());
        output.extend_from_slice(b"\r\n");
    }
    output
}

/// True for reserved pseudo-files like `(listfile)` and `(attributes)`
pub fn is_special_name(name: &str) -> bool {
    name.starts_with('(') && name.ends_with(')')
}

/// Normalized form of a name, used for deduplication: uppercase, with
/// forward slashes folded into backslashes.
pub(crate) fn normalize_name(name: &str) -> String {
    name.bytes()
        .map(|b| match b {
            b'/' => b'\\',
            b'a'..=b'z' => b - 32,
            other => other,
        } as char)
        .collect()
}

/// Merge known and supplemental names against the hash table.
///
/// Order is listfile-then-residual: names recovered from the embedded
/// listfile first (in listfile order), then supplemental names, then a
/// `File<block index>.unk` placeholder for every occupied hash entry no
/// name resolved. Duplicates are dropped on first-seen basis, special
/// pseudo-files are omitted.
pub(crate) fn enumerate(
    hash_table: &HashTable,
    block_table: &BlockTable,
    known: &[String],
    supplemental: &[String],
) -> Vec<String> {
    let mut output = Vec::new();
    let mut resolved = vec![false; hash_table.len()];
    let mut seen = HashSet::new();

    for name in known.iter().chain(supplemental.iter()) {
        if !seen.insert(normalize_name(name)) {
            continue;
        }

        // A name may match several entries (one per locale); mark them all
        let matches = hash_table.find_all(name);
        let mut fresh = false;
        for index in matches {
            if !resolved[index] {
                resolved[index] = true;
                fresh = true;
            }
        }

        if fresh && !is_special_name(name) {
            output.push(name.clone());
        }
    }

    // Residual entries the listfiles could not name
    for (index, entry) in hash_table.entries().iter().enumerate() {
        if !entry.is_occupied() || resolved[index] {
            continue;
        }
        let live = block_table
            .get(entry.block_index as usize)
            .is_some_and(|block| block.exists());
        if live {
            output.push(format!("File{:08}.unk", entry.block_index));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::block_table::{block_flags, BlockEntry};

    #[test]
    fn parse_simple_listfile() {
        let content = b"file1.txt\nfile2.dat\nfile3.bin";
        let files = parse_listfile(content);
        assert_eq!(files, ["file1.txt", "file2.dat", "file3.bin"]);
    }

    #[test]
    fn parse_listfile_with_comments_and_blanks() {
        let content = b"; header comment\nfile1.txt\n\n# another\nfile2.dat;metadata\n  file3.bin  \n";
        let files = parse_listfile(content);
        assert_eq!(files, ["file1.txt", "file2.dat", "file3.bin"]);
    }

    #[test]
    fn parse_empty_listfile() {
        assert!(parse_listfile(b"").is_empty());
        assert!(parse_listfile(b"; only\n# comments\n").is_empty());
    }

    #[test]
    fn listfile_round_trip() {
        let names = ["file1.txt", "dir\\file2.dat"];
        let data = write_listfile(&names);
        assert_eq!(data, b"file1.txt\r\ndir\\file2.dat\r\n");
        assert_eq!(parse_listfile(&data), names);
    }

    #[test]
    fn special_names() {
        assert!(is_special_name("(listfile)"));
        assert!(is_special_name("(attributes)"));
        assert!(!is_special_name("regular.txt"));
        assert!(!is_special_name("(odd.txt"));
    }

    fn live_block() -> BlockEntry {
        BlockEntry {
            file_pos: 32,
            compressed_size: 1,
            file_size: 1,
            flags: block_flags::EXISTS,
        }
    }

    #[test]
    fn enumerate_merges_and_deduplicates() {
        let mut hash_table = HashTable::new(16).unwrap();
        let mut block_table = BlockTable::new(0);

        for name in ["a.txt", "b.txt", "c.txt"] {
            let index = block_table.push(live_block()) as u32;
            hash_table.insert(name, 0, index).unwrap();
        }

        let known = vec!["a.txt".to_string(), "b.txt".to_string()];
        let supplemental = vec![
            "A.TXT".to_string(),   // duplicate of a.txt by hash
            "c.txt".to_string(),
            "ghost.txt".to_string(), // not in the archive
        ];

        let names = enumerate(&hash_table, &block_table, &known, &supplemental);
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn enumerate_reports_unresolved_entries_as_placeholders() {
        let mut hash_table = HashTable::new(16).unwrap();
        let mut block_table = BlockTable::new(0);

        let index = block_table.push(live_block()) as u32;
        hash_table.insert("known.txt", 0, index).unwrap();
        let anon = block_table.push(live_block()) as u32;
        hash_table.insert("forgotten.txt", 0, anon).unwrap();

        let known = vec!["known.txt".to_string()];
        let names = enumerate(&hash_table, &block_table, &known, &[]);
        assert_eq!(
            names,
            vec!["known.txt".to_string(), format!("File{:08}.unk", anon)]
        );
    }

    #[test]
    fn enumerate_hides_special_files() {
        let mut hash_table = HashTable::new(16).unwrap();
        let mut block_table = BlockTable::new(0);

        let index = block_table.push(live_block()) as u32;
        hash_table.insert("(listfile)", 0, index).unwrap();
        let other = block_table.push(live_block()) as u32;
        hash_table.insert("real.txt", 0, other).unwrap();

        let known = vec!["(listfile)".to_string(), "real.txt".to_string()];
        let names = enumerate(&hash_table, &block_table, &known, &[]);
        assert_eq!(names, ["real.txt"]);
    }
}
