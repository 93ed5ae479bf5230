//! Index and catalog storage engine for archival media collections.
//!
//! This crate provides the storage core behind a media browser running on a
//! capacity- and RAM-constrained device:
//! - A streaming on-disk tree format (the *master index*) holding a
//!   depth-first serialization of the media collection, including the
//!   contents of zip-style archives
//! - A compact, fixed-capacity in-memory index (the *memory index*) with
//!   packed 32-bit records, a shared prefix-compressed name heap, and two
//!   derived sort permutations (by path, by file name)
//! - A crash-aware, resumable delete transaction that keeps both index files
//!   and the real filesystem consistent
//!
//! The browsing UI, the directory/archive scanner, and archive decompression
//! are external collaborators; they consume this crate through [`TreeWriter`],
//! [`MemIndex`], and [`Catalog`].

pub mod catalog;
pub mod codec;
pub mod error;
pub mod index;
pub mod stream;

// Re-export main types
pub use catalog::{Catalog, CatalogConfig, PendingTransaction, PositionInParent};
pub use error::{CatalogError, LoadError, Result};
pub use index::{
    FileNameId, Handle, IndexArena, IndexLimits, MemIndex, MemIndexBuilder, MemIndexEntry,
    PathEntryId,
};
pub use stream::{ContainerKind, EntryKind, EntryView, FileKind, TreeReader, TreeWriter};
