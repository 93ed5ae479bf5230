//! The compact in-memory index (the *memory index*).
//!
//! A fixed-capacity, wholesale-rebuilt index over every entry of the media
//! collection: one packed 32-bit record per entry, a shared byte heap for
//! names and parent links, and two derived sort permutations. The index is
//! persisted to a single binary file that is a pure cache of the master
//! index stream.
//!
//! ## Module Structure
//!
//! - `arena` - explicitly owned fixed-capacity buffers and their limits
//! - `builder` - incremental population from tree-stream entries
//! - `entry` - lazy decoding view over one packed record
//! - `mem_index` - the index itself: add, sort, store, load
//! - `size` - the 13-bit lossy size-class encoding
//! - `types` - handle and permutation-id newtypes

mod arena;
mod builder;
mod entry;
mod mem_index;
mod size;
mod types;

pub use arena::{IndexArena, IndexLimits};
pub use builder::MemIndexBuilder;
pub use entry::MemIndexEntry;
pub use mem_index::MemIndex;
pub use types::{FileNameId, Handle, PathEntryId};

pub(crate) use size::{encode_bi_size, format_size_class};
