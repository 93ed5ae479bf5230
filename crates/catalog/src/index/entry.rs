//! A lightweight decoding view over one packed index record.
//!
//! All accessors decode lazily from the packed word and the shared heap.
//! Name and path reconstruction walk the shared-prefix chain iteratively
//! with explicit bounded stacks; nesting depth is capped everywhere by
//! [`MAX_NESTING_DEPTH`], so no recursion is needed.

use super::mem_index::{HEAP_NAME_SUFFIX, HEAP_PREFIX_LEN, KIND_ARCHIVE, KIND_DIR, OFFSET_MASK};
use super::types::Handle;
use super::{format_size_class, MemIndex};
use crate::codec;
use crate::stream::MAX_NESTING_DEPTH;

/// A view bound to one index and one handle.
#[derive(Clone, Copy)]
pub struct MemIndexEntry<'a> {
    index: &'a MemIndex,
    handle: Handle,
}

impl<'a> MemIndexEntry<'a> {
    pub(crate) fn new(index: &'a MemIndex, handle: Handle) -> Self {
        Self { index, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    fn packed(&self) -> u32 {
        self.index.arena.entries[self.handle.index()]
    }

    /// The heap record for this entry. Later records follow in the slice;
    /// every field is length-delimited, so reads stay within the record.
    fn heap_record(&self) -> &'a [u8] {
        let offset = (self.packed() & OFFSET_MASK) as usize;
        &self.index.arena.data[offset..self.index.data_size as usize]
    }

    fn kind(&self) -> u32 {
        (self.packed() >> 30) & 3
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == KIND_DIR
    }

    pub fn is_archive(&self) -> bool {
        self.kind() == KIND_ARCHIVE
    }

    pub fn is_file(&self) -> bool {
        !self.is_container()
    }

    pub fn is_container(&self) -> bool {
        self.kind() <= KIND_ARCHIVE
    }

    pub fn parent_handle(&self) -> Option<Handle> {
        Handle::from_raw(codec::get_u16(self.heap_record()).unwrap_or(Handle::RAW_NONE))
    }

    pub fn parent(&self) -> Option<MemIndexEntry<'a>> {
        self.parent_handle()
            .map(|handle| MemIndexEntry::new(self.index, handle))
    }

    /// True for top-level entries (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_handle().is_none()
    }

    /// Number of ancestors; zero for top-level entries.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(entry) = current {
            depth += 1;
            if depth > MAX_NESTING_DEPTH {
                break;
            }
            current = entry.parent();
        }
        depth
    }

    /// True if `node` appears anywhere in this entry's ancestor chain.
    pub fn is_descendant_of(&self, node: Handle) -> bool {
        let mut current = *self;
        for _ in 0..=MAX_NESTING_DEPTH {
            match current.parent_handle() {
                Some(parent) if parent == node => return true,
                Some(parent) => current = MemIndexEntry::new(self.index, parent),
                None => return false,
            }
        }
        false
    }

    /// True if the entry lives inside an archive (any strict ancestor is an
    /// archive): it cannot be deleted or modified on its own.
    pub fn is_read_only(&self) -> bool {
        let mut current = self.parent();
        while let Some(entry) = current {
            if entry.is_archive() {
                return true;
            }
            current = entry.parent();
        }
        false
    }

    /// Length of the leading run this entry's name shares with its parent's
    /// simple name.
    pub fn shared_name_prefix_len(&self) -> u8 {
        self.heap_record()
            .get(HEAP_PREFIX_LEN)
            .copied()
            .unwrap_or(0)
    }

    /// The part of the simple name that is unique to this entry. The full
    /// name is the parent-shared prefix followed by this suffix.
    pub fn unique_name_suffix(&self) -> &'a str {
        self.heap_record()
            .get(HEAP_NAME_SUFFIX..)
            .and_then(codec::get_str)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }

    /// The intra-archive path fragment, empty for ordinary entries.
    pub fn archive_prefix(&self) -> &'a str {
        let suffix_len = {
            let record = self.heap_record();
            record
                .get(HEAP_NAME_SUFFIX..)
                .and_then(codec::get_str)
                .map_or(0, <[u8]>::len)
        };
        self.heap_record()
            .get(HEAP_NAME_SUFFIX + 1 + suffix_len..)
            .and_then(codec::get_str)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }

    /// Reconstructs the simple name through the shared-prefix chain.
    pub fn name(&self) -> String {
        let mut out = String::new();
        self.append_name(&mut out);
        out
    }

    fn append_name(&self, out: &mut String) {
        // Collect (ancestor, bytes-of-its-suffix) contributions from the
        // nearest ancestor outward, then emit them root-first.
        let mut parts = [(Handle::new(0), 0usize); MAX_NESTING_DEPTH + 1];
        let mut depth = 0;
        let mut want = usize::from(self.shared_name_prefix_len());
        let mut current = *self;
        while want > 0 && depth < parts.len() {
            let Some(parent) = current.parent() else {
                break;
            };
            current = parent;
            let from_ancestors = usize::from(current.shared_name_prefix_len()).min(want);
            parts[depth] = (current.handle, want - from_ancestors);
            depth += 1;
            want = from_ancestors;
        }
        for &(handle, take) in parts[..depth].iter().rev() {
            let suffix = MemIndexEntry::new(self.index, handle).unique_name_suffix();
            let mut take = take.min(suffix.len());
            while !suffix.is_char_boundary(take) {
                take -= 1;
            }
            out.push_str(&suffix[..take]);
        }
        out.push_str(self.unique_name_suffix());
    }

    /// Reconstructs the fully qualified path, with components joined by `/`
    /// and archive-path fragments spliced in.
    pub fn path(&self) -> String {
        let (chain, len) = self.ancestor_chain();
        let mut path = String::new();
        for (i, &handle) in chain[..len].iter().enumerate() {
            let entry = MemIndexEntry::new(self.index, handle);
            if i > 0 {
                path.push('/');
            }
            let prefix = entry.archive_prefix();
            if !prefix.is_empty() {
                path.push_str(prefix);
                path.push('/');
            }
            entry.append_name(&mut path);
        }
        path
    }

    /// Root-first chain of handles, including this entry.
    fn ancestor_chain(&self) -> ([Handle; MAX_NESTING_DEPTH + 1], usize) {
        let mut chain = [Handle::new(0); MAX_NESTING_DEPTH + 1];
        let mut len = 0;
        let mut current = Some(*self);
        while let Some(entry) = current {
            if len == chain.len() {
                break;
            }
            chain[len] = entry.handle;
            len += 1;
            current = entry.parent();
        }
        chain[..len].reverse();
        (chain, len)
    }

    /// Human-readable size, decoded from the lossy 13-bit size class.
    pub fn format_size(&self) -> String {
        format_size_class(((self.packed() >> 17) & 0x1FFF) as u16)
    }
}

impl std::fmt::Debug for MemIndexEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemIndexEntry")
            .field("handle", &self.handle)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexArena, IndexLimits};

    fn index_with_zip() -> MemIndex {
        let mut index = MemIndex::new(IndexArena::new(IndexLimits::default()));
        let root = index.add_dir(None, "media").unwrap();
        let zip = index.add_archive(Some(root), "pack.zip", 2048).unwrap();
        index.add_file(Some(zip), "inner/pack_1.tap", 1536).unwrap();
        index.add_file(Some(root), "loose.tap", 999).unwrap();
        index
    }

    #[test]
    fn kind_predicates() {
        let index = index_with_zip();
        assert!(index.entry(Handle::new(0)).is_dir());
        assert!(index.entry(Handle::new(0)).is_container());
        assert!(index.entry(Handle::new(1)).is_archive());
        assert!(index.entry(Handle::new(2)).is_file());
        assert!(!index.entry(Handle::new(2)).is_container());
    }

    #[test]
    fn read_only_inside_archives() {
        let index = index_with_zip();
        assert!(!index.entry(Handle::new(0)).is_read_only());
        // The archive itself is a real file on storage, not read-only.
        assert!(!index.entry(Handle::new(1)).is_read_only());
        assert!(index.entry(Handle::new(2)).is_read_only());
        assert!(!index.entry(Handle::new(3)).is_read_only());
    }

    #[test]
    fn descendant_tests() {
        let index = index_with_zip();
        let root = Handle::new(0);
        let member = index.entry(Handle::new(2));
        assert!(member.is_descendant_of(root));
        assert!(member.is_descendant_of(Handle::new(1)));
        assert!(!index.entry(Handle::new(3)).is_descendant_of(Handle::new(1)));
    }

    #[test]
    fn depth_counts_ancestors() {
        let index = index_with_zip();
        assert_eq!(index.entry(Handle::new(0)).depth(), 0);
        assert_eq!(index.entry(Handle::new(2)).depth(), 2);
    }

    #[test]
    fn size_formatting() {
        let index = index_with_zip();
        assert_eq!(index.entry(Handle::new(2)).format_size(), "1.50 KiB");
        assert_eq!(index.entry(Handle::new(3)).format_size(), "999 B");
        // Directories encode size zero.
        assert_eq!(index.entry(Handle::new(0)).format_size(), "0 B");
    }

    #[test]
    fn name_is_stable_across_calls() {
        let index = index_with_zip();
        let entry = index.entry(Handle::new(2));
        let first = entry.path();
        assert_eq!(entry.path(), first);
        assert_eq!(first, "media/pack.zip/inner/pack_1.tap");
    }
}
