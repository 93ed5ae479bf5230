//! Re-parses the master index into depth-first tree-walk events.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::{
    ContainerKind, EntryKind, FileKind, END_MARKER, MAX_NESTING_DEPTH, RECORD_CONTAINER,
    RECORD_FILE, RECORD_HEADER_LEN,
};
use crate::codec;
use crate::error::{CatalogError, Result};

/// One node on the reader's container stack.
#[derive(Debug)]
struct NodeRecord {
    kind: EntryKind,
    name: String,
    size: u32,
}

/// A transient view of the current entry, valid until the next call to
/// [`TreeReader::next_entry`]. The view exposes the whole ancestor chain, so
/// parent names and the full path are available without any lookaside state.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    chain: &'a [NodeRecord],
}

impl<'a> EntryView<'a> {
    fn node(&self) -> &'a NodeRecord {
        // The reader never hands out a view of an empty chain.
        &self.chain[self.chain.len() - 1]
    }

    pub fn kind(&self) -> EntryKind {
        self.node().kind
    }

    pub fn is_container(&self) -> bool {
        self.node().kind.is_container()
    }

    pub fn is_file(&self) -> bool {
        self.node().kind == EntryKind::File
    }

    /// Number of ancestors; zero for top-level entries.
    pub fn depth(&self) -> usize {
        self.chain.len() - 1
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn size(&self) -> u32 {
        self.node().size
    }

    /// Name of the `n`-th ancestor, from the top of the tree down.
    pub fn ancestor_name(&self, n: usize) -> Option<&'a str> {
        if n < self.depth() {
            Some(&self.chain[n].name)
        } else {
            None
        }
    }

    /// Full path from the tree root, with components joined by `/`.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (i, node) in self.chain.iter().enumerate() {
            if i > 0 {
                path.push('/');
            }
            path.push_str(&node.name);
        }
        path
    }
}

/// Streams the master index back as discrete depth-first entries.
///
/// Single-cursor semantics: each returned [`EntryView`] borrows the reader
/// and is invalidated by the next call.
pub struct TreeReader {
    input: BufReader<File>,
    stack: Vec<NodeRecord>,
    /// The top of the stack is a leaf file awaiting removal before the next
    /// record is read.
    pending_pop: bool,
    eof: bool,
    failed: bool,
}

impl TreeReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CatalogError::BadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            // Buffering speeds up index reads considerably; sizes beyond a
            // few hundred bytes make little difference on the target device.
            input: BufReader::with_capacity(256, file),
            stack: Vec::with_capacity(MAX_NESTING_DEPTH),
            pending_pop: false,
            eof: false,
            failed: false,
        })
    }

    /// Returns the next entry, `Ok(None)` at end of stream.
    ///
    /// After an error has been returned, subsequent calls yield `Ok(None)`.
    pub fn next_entry(&mut self) -> Result<Option<EntryView<'_>>> {
        if self.failed || self.eof {
            return Ok(None);
        }
        if self.pending_pop {
            self.stack.pop();
            self.pending_pop = false;
        }
        loop {
            let record_kind = match self.read_kind_byte()? {
                Some(byte) => byte,
                None => return Ok(None),
            };
            if record_kind == END_MARKER {
                if self.stack.pop().is_none() {
                    return self.fail(CatalogError::BadData("container end without begin"));
                }
                if self.stack.is_empty() {
                    self.eof = true;
                    return Ok(None);
                }
                continue;
            }
            return self.read_record(record_kind).map(Some);
        }
    }

    /// Reads the next record-kind byte. A clean EOF is only legitimate with
    /// no containers open.
    fn read_kind_byte(&mut self) -> Result<Option<u8>> {
        match codec::read_u8(&mut self.input) {
            Ok(byte) => Ok(Some(byte)),
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                if self.stack.is_empty() {
                    self.eof = true;
                    Ok(None)
                } else {
                    self.fail(CatalogError::PrematureEof)
                }
            }
            Err(error) => {
                self.failed = true;
                Err(CatalogError::Io(error))
            }
        }
    }

    fn read_record(&mut self, record_kind: u8) -> Result<EntryView<'_>> {
        let record_len = match codec::read_u16(&mut self.input) {
            Ok(len) => len as usize,
            Err(error) => return Err(self.fail_io(error)),
        };
        if record_len < RECORD_HEADER_LEN {
            return Err(self.fail_with(CatalogError::BadData("record too short")));
        }
        let mut payload = vec![0u8; record_len - 3];
        if let Err(error) = self.input.read_exact(&mut payload) {
            return Err(self.fail_io(error));
        }

        let mut cursor = payload.as_slice();
        // Legacy parent offset; structure comes from nesting alone.
        let _ = codec::read_u32(&mut cursor).map_err(|e| self.fail_io(e))?;
        let subtype = codec::read_u8(&mut cursor).map_err(|e| self.fail_io(e))?;
        let size = codec::read_u32(&mut cursor).map_err(|e| self.fail_io(e))?;
        let name = codec::read_str(&mut cursor).map_err(|e| self.fail_io(e))?;
        let name = String::from_utf8_lossy(&name).into_owned();

        let kind = match record_kind {
            RECORD_CONTAINER => match subtype & 7 {
                s if s == ContainerKind::Dir as u8 => EntryKind::Dir,
                s if s == ContainerKind::Archive as u8 => EntryKind::Archive,
                _ => return Err(self.fail_with(CatalogError::BadData("unknown container kind"))),
            },
            RECORD_FILE => match subtype & 7 {
                s if s == FileKind::Media as u8 => EntryKind::File,
                _ => return Err(self.fail_with(CatalogError::BadData("unknown file kind"))),
            },
            _ => return Err(self.fail_with(CatalogError::BadData("unknown record kind"))),
        };

        // Containers may nest MAX_NESTING_DEPTH deep; leaf files may sit one
        // level below the deepest container.
        let depth = self.stack.len();
        if depth > MAX_NESTING_DEPTH || (kind.is_container() && depth >= MAX_NESTING_DEPTH) {
            return Err(self.fail_with(CatalogError::BadData("container nesting too deep")));
        }
        self.stack.push(NodeRecord { kind, name, size });
        self.pending_pop = kind == EntryKind::File;
        Ok(EntryView { chain: &self.stack })
    }

    fn fail<T>(&mut self, error: CatalogError) -> Result<T> {
        self.failed = true;
        Err(error)
    }

    fn fail_with(&mut self, error: CatalogError) -> CatalogError {
        self.failed = true;
        error
    }

    fn fail_io(&mut self, error: io::Error) -> CatalogError {
        self.failed = true;
        if error.kind() == io::ErrorKind::UnexpectedEof {
            CatalogError::PrematureEof
        } else {
            CatalogError::Io(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::TreeWriter;
    use std::path::PathBuf;

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("master.idx");
        let mut writer = TreeWriter::create(&path).unwrap();
        writer.container_begin(ContainerKind::Dir, "games", 0);
        writer.add_file(FileKind::Media, "pacman.tap", 1234);
        writer.container_begin(ContainerKind::Archive, "compilation.zip", 9000);
        writer.add_file(FileKind::Media, "side_a/galaga.tap", 4321);
        writer.container_end();
        writer.container_end();
        writer.close().unwrap();
        path
    }

    #[test]
    fn roundtrip_preserves_order_kinds_names_sizes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_sample(dir.path());
        let mut reader = TreeReader::open(&path).unwrap();

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.kind(), EntryKind::Dir);
        assert_eq!(entry.name(), "games");
        assert_eq!(entry.depth(), 0);
        assert_eq!(entry.path(), "games");

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.kind(), EntryKind::File);
        assert_eq!(entry.name(), "pacman.tap");
        assert_eq!(entry.size(), 1234);
        assert_eq!(entry.depth(), 1);
        assert_eq!(entry.path(), "games/pacman.tap");

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.kind(), EntryKind::Archive);
        assert_eq!(entry.name(), "compilation.zip");
        assert_eq!(entry.size(), 9000);

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.kind(), EntryKind::File);
        assert_eq!(entry.name(), "side_a/galaga.tap");
        assert_eq!(entry.depth(), 2);
        assert_eq!(entry.ancestor_name(0), Some("games"));
        assert_eq!(entry.ancestor_name(1), Some("compilation.zip"));
        assert_eq!(entry.path(), "games/compilation.zip/side_a/galaga.tap");

        assert!(reader.next_entry().unwrap().is_none());
        // End of stream is stable.
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("master.idx");
        std::fs::write(&path, b"").unwrap();
        let mut reader = TreeReader::open(&path).unwrap();
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn truncated_stream_is_premature_eof() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_sample(dir.path());
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let mut reader = TreeReader::open(&path).unwrap();
        let mut last = Ok(());
        loop {
            match reader.next_entry() {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(error) => {
                    last = Err(error);
                    break;
                }
            }
        }
        assert!(matches!(last, Err(CatalogError::PrematureEof)));
    }

    #[test]
    fn stray_end_marker_is_bad_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("master.idx");
        std::fs::write(&path, [END_MARKER]).unwrap();
        let mut reader = TreeReader::open(&path).unwrap();
        assert!(matches!(
            reader.next_entry(),
            Err(CatalogError::BadData(_))
        ));
        // Sticky: later calls return end of stream.
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_bad_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            TreeReader::open(&dir.path().join("absent.idx")),
            Err(CatalogError::BadFile { .. })
        ));
    }
}
