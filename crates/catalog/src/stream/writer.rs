//! Serializes a depth-first walk of the source tree into the master index.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::{
    ContainerKind, FileKind, END_MARKER, MAX_NESTING_DEPTH, RECORD_CONTAINER, RECORD_FILE,
    RECORD_HEADER_LEN,
};
use crate::codec;
use crate::error::{CatalogError, Result};

/// Value of the parent-offset field for records at the top level.
const NO_PARENT_OFFSET: u32 = u32::MAX;

/// Appends tree records to an on-disk stream.
///
/// Callers must balance every [`container_begin`](Self::container_begin) with
/// a [`container_end`](Self::container_end) before [`close`](Self::close).
/// The stream carries at most one top-level container; the reader stops at
/// the marker closing it, so appending further records there is an error
/// rather than silently unreadable data.
/// The failure state is sticky: after the first error, all further calls are
/// no-ops and `close` reports that error.
pub struct TreeWriter {
    target: BufWriter<File>,
    /// Byte offset of the next record.
    fpos: u32,
    /// Offsets of the currently open container records.
    open_containers: Vec<u32>,
    /// Set once a top-level container has been closed; the stream accepts
    /// nothing after that.
    root_closed: bool,
    error: Option<CatalogError>,
}

impl TreeWriter {
    /// Creates the target file, truncating any previous content.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| CatalogError::BadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            target: BufWriter::new(file),
            fpos: 0,
            open_containers: Vec::with_capacity(MAX_NESTING_DEPTH),
            root_closed: false,
            error: None,
        })
    }

    /// Returns true if no failure occurred so far.
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    /// Opens a container record; its children follow until
    /// [`container_end`](Self::container_end).
    pub fn container_begin(&mut self, kind: ContainerKind, name: &str, size: u32) {
        if self.error.is_some() {
            return;
        }
        if self.root_closed {
            self.error = Some(CatalogError::BadData(
                "record after top-level container closed",
            ));
            return;
        }
        if self.open_containers.len() >= MAX_NESTING_DEPTH {
            self.error = Some(CatalogError::BadData("container nesting too deep"));
            return;
        }
        debug!(name, size, "container begin");
        self.open_containers.push(self.fpos);
        self.add_entry(RECORD_CONTAINER, kind as u8, name, size);
    }

    /// Appends a leaf-file record. `name` may contain `/` separators when the
    /// file lives inside an archive.
    pub fn add_file(&mut self, kind: FileKind, name: &str, size: u32) {
        if self.error.is_some() {
            return;
        }
        if self.root_closed {
            self.error = Some(CatalogError::BadData(
                "record after top-level container closed",
            ));
            return;
        }
        self.add_entry(RECORD_FILE, kind as u8, name, size);
    }

    /// Closes the innermost open container.
    pub fn container_end(&mut self) {
        if self.error.is_some() {
            return;
        }
        if self.open_containers.pop().is_none() {
            self.error = Some(CatalogError::BadData("container end without begin"));
            return;
        }
        if self.open_containers.is_empty() {
            self.root_closed = true;
        }
        if let Err(error) = codec::write_u8(&mut self.target, END_MARKER) {
            self.error = Some(CatalogError::Write(error));
            return;
        }
        self.fpos += 1;
    }

    /// Flushes and finalizes the stream. Reports the first sticky error, or a
    /// write error if containers are still open.
    pub fn close(mut self) -> Result<()> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if !self.open_containers.is_empty() {
            return Err(CatalogError::Write(std::io::Error::other(
                "unbalanced containers at close",
            )));
        }
        self.target.flush().map_err(CatalogError::Write)
    }

    fn add_entry(&mut self, record_kind: u8, subtype: u8, name: &str, size: u32) {
        let name = name.as_bytes();
        if name.len() > codec::MAX_STR_LEN {
            self.error = Some(CatalogError::Overflow("entry name longer than 255 bytes"));
            return;
        }
        // The parent offset is written for format compatibility only; the
        // reader reconstructs structure from nesting and never consults it.
        let parent = self
            .open_containers
            .last()
            .copied()
            .unwrap_or(NO_PARENT_OFFSET);
        let record_len = (RECORD_HEADER_LEN + name.len()) as u16;
        let result = codec::write_u8(&mut self.target, record_kind)
            .and_then(|_| codec::write_u16(&mut self.target, record_len))
            .and_then(|_| codec::write_u32(&mut self.target, parent))
            .and_then(|_| codec::write_u8(&mut self.target, subtype))
            .and_then(|_| codec::write_u32(&mut self.target, size))
            .and_then(|_| codec::write_str(&mut self.target, name));
        match result {
            Ok(()) => self.fpos += u32::from(record_len),
            Err(error) => self.error = Some(CatalogError::Write(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_stream_closes_cleanly() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("master.idx");
        let mut writer = TreeWriter::create(&path).unwrap();
        writer.container_begin(ContainerKind::Dir, "games", 0);
        writer.add_file(FileKind::Media, "pacman.tap", 1234);
        writer.container_end();
        writer.close().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn unbalanced_close_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = TreeWriter::create(&dir.path().join("master.idx")).unwrap();
        writer.container_begin(ContainerKind::Dir, "games", 0);
        assert!(matches!(writer.close(), Err(CatalogError::Write(_))));
    }

    #[test]
    fn stray_container_end_is_sticky() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = TreeWriter::create(&dir.path().join("master.idx")).unwrap();
        writer.container_end();
        assert!(!writer.ok());
        // Further calls are no-ops; close reports the original failure.
        writer.add_file(FileKind::Media, "late.tap", 1);
        assert!(matches!(writer.close(), Err(CatalogError::BadData(_))));
    }

    #[test]
    fn records_after_top_level_container_close_fail() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = TreeWriter::create(&dir.path().join("master.idx")).unwrap();
        writer.container_begin(ContainerKind::Dir, "A", 0);
        writer.add_file(FileKind::Media, "f1.tap", 1);
        writer.container_end();
        // The reader stops at the marker closing the top-level container;
        // anything appended past it would never be read back.
        writer.container_begin(ContainerKind::Dir, "B", 0);
        assert!(!writer.ok());
        assert!(matches!(writer.close(), Err(CatalogError::BadData(_))));
    }

    #[test]
    fn nesting_deeper_than_max_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = TreeWriter::create(&dir.path().join("master.idx")).unwrap();
        for i in 0..=MAX_NESTING_DEPTH {
            writer.container_begin(ContainerKind::Dir, &format!("d{i}"), 0);
        }
        assert!(!writer.ok());
    }

    #[test]
    fn overlong_name_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = TreeWriter::create(&dir.path().join("master.idx")).unwrap();
        writer.container_begin(ContainerKind::Dir, "d", 0);
        writer.add_file(FileKind::Media, &"x".repeat(256), 1);
        assert!(matches!(writer.close(), Err(CatalogError::Overflow(_))));
    }
}
