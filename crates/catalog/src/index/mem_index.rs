//! The compact index proper: packed records, the shared name heap, sort
//! permutation construction, and single-file persistence.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use super::arena::IndexArena;
use super::entry::MemIndexEntry;
use super::types::{FileNameId, Handle, PathEntryId};
use super::encode_bi_size;
use crate::codec;
use crate::error::{CatalogError, LoadError, Result};
use crate::stream::MAX_NESTING_DEPTH;

/// Version tag of the persisted memory index file.
const INDEX_MAGIC: u16 = 0x0101;

// Heap record layout: parent handle, shared-prefix length, unique name
// suffix (length-prefixed), archive-path prefix (length-prefixed).
pub(crate) const HEAP_PARENT: usize = 0;
pub(crate) const HEAP_PREFIX_LEN: usize = 2;
pub(crate) const HEAP_NAME_SUFFIX: usize = 3;

// Entry kinds in the top two bits of a packed record.
pub(crate) const KIND_DIR: u32 = 0;
pub(crate) const KIND_ARCHIVE: u32 = 1;
pub(crate) const KIND_FILE: u32 = 2;

/// Mask of the heap-offset field of a packed record.
pub(crate) const OFFSET_MASK: u32 = 0x0001_FFFF;

/// The in-memory index: a packed 32-bit record per entry (2 bits kind,
/// 13 bits size class, 17 bits heap offset), a shared byte heap for the
/// variable-length side data, and two sort permutations.
///
/// Always rebuilt wholesale from the master index stream, never mutated
/// entry-by-entry. Entries are appended in creation order; that position is
/// the entry's [`Handle`], so a parent's handle is always smaller than its
/// children's.
pub struct MemIndex {
    pub(crate) arena: IndexArena,
    pub(crate) count: u16,
    pub(crate) data_size: u32,
    pub(crate) file_count: u16,
}

impl MemIndex {
    pub fn new(arena: IndexArena) -> Self {
        Self {
            arena,
            count: 0,
            data_size: 0,
            file_count: 0,
        }
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        usize::from(self.count)
    }

    /// Number of leaf-file entries (valid after
    /// [`build_sort_indexes`](Self::build_sort_indexes)).
    pub fn file_count(&self) -> usize {
        usize::from(self.file_count)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Remaining byte budget in the name heap.
    pub fn remaining_capacity(&self) -> usize {
        self.arena.data_capacity() - self.data_size as usize
    }

    /// Forgets all entries without deallocating the arena.
    pub fn clear(&mut self) {
        self.count = 0;
        self.data_size = 0;
        self.file_count = 0;
    }

    /// Returns the decoding view for an entry.
    ///
    /// # Panics
    /// Panics if `handle` is out of range.
    pub fn entry(&self, handle: Handle) -> MemIndexEntry<'_> {
        assert!(handle.index() < self.count());
        MemIndexEntry::new(self, handle)
    }

    /// Resolves a position in the path-sorted permutation to a handle.
    pub fn entry_by_path(&self, id: PathEntryId) -> Handle {
        assert!(usize::from(id.value()) < self.count());
        Handle::new(self.arena.by_path[usize::from(id.value())])
    }

    /// Resolves a position in the name-sorted file permutation to a handle.
    pub fn file_by_name(&self, id: FileNameId) -> Handle {
        assert!(usize::from(id.value()) < self.file_count());
        Handle::new(self.arena.by_name[usize::from(id.value())])
    }

    /// Returns the fully qualified path for an entry.
    pub fn path(&self, handle: Handle) -> String {
        self.entry(handle).path()
    }

    pub fn add_dir(&mut self, parent: Option<Handle>, name: &str) -> Result<Handle> {
        self.add_entry(KIND_DIR, parent, name, 0)
    }

    pub fn add_archive(&mut self, parent: Option<Handle>, name: &str, size: u32) -> Result<Handle> {
        self.add_entry(KIND_ARCHIVE, parent, name, size)
    }

    pub fn add_file(&mut self, parent: Option<Handle>, name: &str, size: u32) -> Result<Handle> {
        self.add_entry(KIND_FILE, parent, name, size)
    }

    /// Appends one entry, leaving all prior state untouched on failure.
    ///
    /// A name containing `/` is an intra-archive path: it is split into an
    /// archive-relative prefix and a leaf name. The leaf is stored as a
    /// suffix relative to the longest common prefix with the parent's simple
    /// name; archive members commonly share a name stem with their enclosing
    /// archive, so this saves considerable heap space. Pure space
    /// optimization, no effect on lookup semantics.
    fn add_entry(
        &mut self,
        kind: u32,
        parent: Option<Handle>,
        name: &str,
        size: u32,
    ) -> Result<Handle> {
        if self.count() == self.arena.entry_capacity() {
            return Err(CatalogError::Overflow("entry capacity reached"));
        }
        let depth = match parent {
            Some(p) => {
                if p.index() >= self.count() {
                    return Err(CatalogError::BadData("parent handle out of range"));
                }
                self.entry(p).depth() + 1
            }
            None => 0,
        };
        if depth > MAX_NESTING_DEPTH || (kind != KIND_FILE && depth >= MAX_NESTING_DEPTH) {
            return Err(CatalogError::Overflow("container nesting too deep"));
        }

        let (prefix, leaf) = match memchr::memrchr(b'/', name.as_bytes()) {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("", name),
        };
        if leaf.len() > codec::MAX_STR_LEN || prefix.len() > codec::MAX_STR_LEN {
            return Err(CatalogError::Overflow("entry name longer than 255 bytes"));
        }

        let parent_name = match parent {
            Some(p) => self.entry(p).name(),
            None => String::new(),
        };
        let mut shared = common_prefix_len(parent_name.as_bytes(), leaf.as_bytes());
        while !leaf.is_char_boundary(shared) {
            shared -= 1;
        }
        let suffix = &leaf[shared..];

        let record_size = HEAP_NAME_SUFFIX + 1 + suffix.len() + 1 + prefix.len();
        if self.data_size as usize + record_size > self.arena.data_capacity() {
            return Err(CatalogError::Overflow("name heap budget exceeded"));
        }

        let offset = self.data_size as usize;
        let data = &mut self.arena.data;
        codec::put_u16(&mut data[offset + HEAP_PARENT..], Handle::to_raw(parent));
        data[offset + HEAP_PREFIX_LEN] = shared as u8;
        let mut cursor = offset + HEAP_NAME_SUFFIX;
        codec::put_str(&mut data[cursor..], suffix.as_bytes());
        cursor += 1 + suffix.len();
        codec::put_str(&mut data[cursor..], prefix.as_bytes());
        cursor += 1 + prefix.len();
        debug_assert_eq!(cursor, offset + record_size);

        let idx = self.count;
        self.arena.entries[usize::from(idx)] = (kind << 30)
            | (u32::from(encode_bi_size(size)) << 17)
            | (self.data_size & OFFSET_MASK);
        self.count += 1;
        self.data_size += record_size as u32;
        Ok(Handle::new(idx))
    }

    /// Rebuilds both sort permutations. Must be called after the last add
    /// and before any permutation lookup.
    pub fn build_sort_indexes(&mut self) {
        let count = self.count();

        debug!(count, "building path sort index");
        let mut by_path = std::mem::take(&mut self.arena.by_path);
        for (i, slot) in by_path[..count].iter_mut().enumerate() {
            *slot = i as u16;
        }
        by_path[..count]
            .sort_unstable_by(|&a, &b| self.compare_paths(Handle::new(a), Handle::new(b)));
        self.arena.by_path = by_path;

        debug!("building file name sort index");
        let mut by_name = std::mem::take(&mut self.arena.by_name);
        let mut file_count = 0usize;
        for i in 0..count {
            if self.entry(Handle::new(i as u16)).is_file() {
                by_name[file_count] = i as u16;
                file_count += 1;
            }
        }
        by_name[..file_count].sort_unstable_by(|&a, &b| {
            self.entry(Handle::new(a))
                .name()
                .cmp(&self.entry(Handle::new(b)).name())
                .then(a.cmp(&b))
        });
        self.arena.by_name = by_name;
        self.file_count = file_count as u16;
    }

    /// Compares two entries by full path, ignoring case.
    ///
    /// Expands both ancestor-handle chains and rejects the common prefix
    /// with integer comparisons; only the first differing component is
    /// materialized and compared as a string. A chain that is a strict
    /// prefix of the other sorts first, which keeps every container
    /// immediately ahead of the contiguous block of its descendants.
    fn compare_paths(&self, a: Handle, b: Handle) -> Ordering {
        let (ah, alen) = self.expand_handle_chain(a);
        let (bh, blen) = self.expand_handle_chain(b);
        let common = alen.min(blen);
        for i in 0..common {
            if ah[i] != bh[i] {
                // Different component, so the names differ too: names are
                // unique per directory. Handles break ties between names
                // that only differ in case.
                let an = self.entry(ah[i]).name().to_lowercase();
                let bn = self.entry(bh[i]).name().to_lowercase();
                return an.cmp(&bn).then(ah[i].cmp(&bh[i]));
            }
        }
        alen.cmp(&blen)
    }

    /// Expands the root-first chain of handles for an entry, including the
    /// entry itself.
    fn expand_handle_chain(&self, handle: Handle) -> ([Handle; MAX_NESTING_DEPTH + 1], usize) {
        let mut chain = [Handle::new(0); MAX_NESTING_DEPTH + 1];
        let mut len = 0;
        let mut current = Some(handle);
        while let Some(h) = current {
            if len == chain.len() {
                break;
            }
            chain[len] = h;
            len += 1;
            current = self.entry(h).parent_handle();
        }
        chain[..len].reverse();
        (chain, len)
    }

    /// Persists the index to a single binary file.
    pub fn store(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| CatalogError::BadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut w = BufWriter::new(file);
        let count = self.count();
        codec::write_u16(&mut w, INDEX_MAGIC)?;
        codec::write_u16(&mut w, self.count)?;
        for &entry in &self.arena.entries[..count] {
            codec::write_u32(&mut w, entry)?;
        }
        codec::write_u32(&mut w, self.data_size)?;
        w.write_all(&self.arena.data[..self.data_size as usize])?;
        for &id in &self.arena.by_path[..count] {
            codec::write_u16(&mut w, id)?;
        }
        codec::write_u16(&mut w, self.file_count)?;
        for &id in &self.arena.by_name[..self.file_count()] {
            codec::write_u16(&mut w, id)?;
        }
        w.flush()?;
        debug!(count, path = %path.display(), "memory index stored");
        Ok(())
    }

    /// Loads a persisted index, replacing the current contents.
    ///
    /// A missing file leaves the index untouched; any other failure leaves
    /// it cleared, never half-loaded. The distinct outcomes let the caller
    /// decide whether to offer a rebuild.
    pub fn load(&mut self, path: &Path) -> std::result::Result<(), LoadError> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        self.clear();
        let result = self.load_body(&mut r);
        match &result {
            Ok(()) => info!(count = self.count, path = %path.display(), "memory index loaded"),
            Err(error) => {
                self.clear();
                tracing::warn!(path = %path.display(), %error, "memory index load failed");
            }
        }
        result
    }

    fn load_body<R: Read>(&mut self, r: &mut R) -> std::result::Result<(), LoadError> {
        let magic = codec::read_u16(r)?;
        if magic != INDEX_MAGIC {
            return Err(LoadError::UnsupportedVersion(magic));
        }
        let count = codec::read_u16(r)?;
        if usize::from(count) > self.arena.entry_capacity() {
            return Err(LoadError::Overflow("entry count exceeds arena"));
        }
        for slot in &mut self.arena.entries[..usize::from(count)] {
            *slot = codec::read_u32(r)?;
        }
        let data_size = codec::read_u32(r)?;
        if data_size as usize > self.arena.data_capacity() {
            return Err(LoadError::Overflow("heap size exceeds arena"));
        }
        r.read_exact(&mut self.arena.data[..data_size as usize])?;
        for slot in &mut self.arena.by_path[..usize::from(count)] {
            *slot = codec::read_u16(r)?;
        }
        let file_count = codec::read_u16(r)?;
        if file_count > count {
            return Err(LoadError::BadData("file count exceeds entry count"));
        }
        for slot in &mut self.arena.by_name[..usize::from(file_count)] {
            *slot = codec::read_u16(r)?;
        }
        self.count = count;
        self.data_size = data_size;
        self.file_count = file_count;
        self.validate()
    }

    /// Structural validation of loaded data, so that entry accessors can
    /// decode without bounds failures afterwards.
    fn validate(&self) -> std::result::Result<(), LoadError> {
        let data = &self.arena.data[..self.data_size as usize];
        for i in 0..self.count() {
            let packed = self.arena.entries[i];
            if (packed >> 30) & 3 > KIND_FILE {
                return Err(LoadError::BadData("unknown entry kind"));
            }
            let offset = (packed & OFFSET_MASK) as usize;
            let record = data
                .get(offset..)
                .ok_or(LoadError::BadData("heap offset out of bounds"))?;
            let parent_raw =
                codec::get_u16(record).ok_or(LoadError::BadData("heap record truncated"))?;
            if parent_raw != Handle::RAW_NONE && usize::from(parent_raw) >= i {
                return Err(LoadError::BadData("parent handle not smaller than child"));
            }
            let suffix = record
                .get(HEAP_NAME_SUFFIX..)
                .and_then(codec::get_str)
                .ok_or(LoadError::BadData("name suffix out of bounds"))?;
            let prefix = record
                .get(HEAP_NAME_SUFFIX + 1 + suffix.len()..)
                .and_then(codec::get_str)
                .ok_or(LoadError::BadData("archive prefix out of bounds"))?;
            if std::str::from_utf8(suffix).is_err() || std::str::from_utf8(prefix).is_err() {
                return Err(LoadError::BadData("name is not valid UTF-8"));
            }
        }
        for &id in &self.arena.by_path[..self.count()] {
            if usize::from(id) >= self.count() {
                return Err(LoadError::BadData("path permutation out of range"));
            }
        }
        for &id in &self.arena.by_name[..self.file_count()] {
            if usize::from(id) >= self.count() {
                return Err(LoadError::BadData("name permutation out of range"));
            }
        }
        Ok(())
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
