//! The on-disk tree stream (the *master index*).
//!
//! A depth-first serialization of the media collection: a container record is
//! followed by its children's records and terminated by an end marker, so no
//! explicit parent references are needed. [`TreeWriter`] produces the stream
//! while an external scanner walks the device; [`TreeReader`] replays it as a
//! sequence of entries with parent linkage.

mod reader;
mod writer;

pub use reader::{EntryView, TreeReader};
pub use writer::TreeWriter;

/// Record kind byte for a leaf file.
pub(crate) const RECORD_FILE: u8 = 0;
/// Record kind byte for a container (directory or archive).
pub(crate) const RECORD_CONTAINER: u8 = 1;
/// Single-byte marker closing the innermost open container.
pub(crate) const END_MARKER: u8 = 0xFF;

/// Fixed portion of a record: kind, record length, parent offset, subtype,
/// size, and the name's length prefix.
pub(crate) const RECORD_HEADER_LEN: usize = 1 + 2 + 4 + 1 + 4 + 1;

/// Maximum container nesting depth, bounding every stack and recursion in
/// the crate.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Subtype of a container record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContainerKind {
    Dir = 0,
    Archive = 1,
}

/// Subtype of a leaf-file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileKind {
    Media = 0,
}

/// Kind of an entry replayed from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Archive,
    File,
}

impl EntryKind {
    pub fn is_container(self) -> bool {
        matches!(self, EntryKind::Dir | EntryKind::Archive)
    }
}
