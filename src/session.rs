//! Transactional archive sessions over a staged temporary copy
//!
//! A [`Session`] never touches the archive it was opened on: the source
//! is copied into a temporary file next to it, every mutation lands in
//! that staged copy, and only [`Session::save`] atomically replaces the
//! original. Dropping the session, with or without an error in between,
//! removes the staged copy.

use crate::archive::{Archive, CreateOptions, FileOptions};
use crate::error::{Error, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};

/// A transactional editing session for an archive on disk
pub struct Session {
    original: PathBuf,
    staged: TempPath,
    archive: Archive,
}

/// The directory a staging file for `path` should live in; staying on
/// the same filesystem keeps the final rename atomic.
fn staging_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

impl Session {
    /// Open an archive for editing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_listfile(path, &[] as &[&str])
    }

    /// Open an archive for editing, supplying external listfile names to
    /// recover files the embedded listfile does not cover
    pub fn open_with_listfile<P: AsRef<Path>, S: AsRef<str>>(
        path: P,
        names: &[S],
    ) -> Result<Self> {
        let path = path.as_ref();

        let mut temp = NamedTempFile::new_in(staging_dir(path))?;
        let mut source = File::open(path)?;
        io::copy(&mut source, temp.as_file_mut())?;

        let (file, staged) = temp.into_parts();
        let mut archive = Archive::open(Box::new(file))?;
        archive.register_names(names);

        Ok(Self {
            original: path.to_path_buf(),
            staged,
            archive,
        })
    }

    /// Create a new archive; the target path is only written on `save`
    pub fn create<P: AsRef<Path>>(path: P, options: &CreateOptions) -> Result<Self> {
        let path = path.as_ref();

        let temp = NamedTempFile::new_in(staging_dir(path))?;
        let (file, staged) = temp.into_parts();
        let archive = Archive::create(Box::new(file), options)?;

        Ok(Self {
            original: path.to_path_buf(),
            staged,
            archive,
        })
    }

    /// Path of the archive this session edits
    pub fn path(&self) -> &Path {
        &self.original
    }

    /// True if `name` is present under any locale
    pub fn contains(&self, name: &str) -> bool {
        self.archive.contains(name)
    }

    /// Enumerate file names; see [`Archive::list_files`]
    pub fn list_files(&self) -> Vec<String> {
        self.archive.list_files(&[])
    }

    /// Read a file's contents by name
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.archive.read_file(name)
    }

    /// Read a file's contents by name and locale
    pub fn read_file_locale(&self, name: &str, locale: u16) -> Result<Vec<u8>> {
        self.archive.read_file_locale(name, locale)
    }

    /// Write a file from memory into the staged copy
    pub fn write_file(&mut self, name: &str, data: &[u8], options: &FileOptions) -> Result<()> {
        self.archive.write_file(name, data, options)
    }

    /// Add a file from disk into the staged copy
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        archived_name: Option<&str>,
        options: &FileOptions,
    ) -> Result<()> {
        self.archive.add_file(path, archived_name, options)
    }

    /// Remove a file from the staged copy
    pub fn remove_file(&mut self, name: &str) -> Result<()> {
        self.archive.remove_file(name)
    }

    /// Compact the staged copy, reclaiming space from deleted and
    /// orphaned blocks
    pub fn compact(&mut self) -> Result<()> {
        self.compact_with_progress(|_, _| true)
    }

    /// Compact with a progress callback, called between blocks with
    /// `(done, total)`. Returning `false` cancels the compaction and
    /// leaves the session in its prior state.
    pub fn compact_with_progress(
        &mut self,
        progress: impl FnMut(usize, usize) -> bool,
    ) -> Result<()> {
        let temp = NamedTempFile::new_in(staging_dir(&self.original))?;
        let (file, staged) = temp.into_parts();

        let compacted = self.archive.compact_into(Box::new(file), progress)?;

        // Swap in the compacted staging file; the old one is removed
        self.archive = compacted;
        self.staged = staged;
        Ok(())
    }

    /// Flush the staged copy and atomically replace the original archive
    /// with it, ending the session. A failure leaves the original
    /// untouched.
    pub fn save(mut self) -> Result<()> {
        self.archive.flush()?;

        let Session {
            original,
            staged,
            archive,
        } = self;
        // Close the staged file handle before the rename
        drop(archive);

        staged.persist(&original).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Discard all staged changes, ending the session. The original
    /// archive is untouched; dropping the session has the same effect.
    pub fn close(self) {}
}
