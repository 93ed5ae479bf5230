//! Explicitly owned fixed-capacity buffers backing the memory index.
//!
//! The original firmware tied the index to static buffers sized for one
//! device; here the arena is an owned value handed into [`MemIndex`], so
//! capacities are configurable and no process-wide state exists.

/// The packed record reserves 17 bits for the heap offset.
pub(crate) const MAX_DATA_CAPACITY: u32 = 1 << 17;

/// Capacity configuration for an [`IndexArena`].
#[derive(Debug, Clone, Copy)]
pub struct IndexLimits {
    /// Maximum number of entries. Clamped to what a 16-bit handle (minus the
    /// "no parent" sentinel) can address.
    pub max_entries: u16,
    /// Byte budget for the shared name/parent heap. Clamped to the 17-bit
    /// offset space (128 KiB).
    pub data_capacity: u32,
}

impl Default for IndexLimits {
    /// Mirrors the original device budget: 5000 entries, 107 KiB of heap.
    fn default() -> Self {
        Self {
            max_entries: 5000,
            data_capacity: 107 * 1024,
        }
    }
}

/// Fixed-capacity backing store, allocated once.
#[derive(Debug)]
pub struct IndexArena {
    /// One packed record per entry.
    pub(crate) entries: Box<[u32]>,
    /// Shared variable-length heap: parent handles, shared-prefix lengths,
    /// name suffixes, archive-path prefixes.
    pub(crate) data: Box<[u8]>,
    /// Permutation of all entries sorted by case-insensitive path.
    pub(crate) by_path: Box<[u16]>,
    /// Permutation of leaf-file entries sorted by simple name.
    pub(crate) by_name: Box<[u16]>,
}

impl IndexArena {
    pub fn new(limits: IndexLimits) -> Self {
        let max_entries = usize::from(limits.max_entries.min(u16::MAX - 1));
        let data_capacity = limits.data_capacity.min(MAX_DATA_CAPACITY) as usize;
        Self {
            entries: vec![0; max_entries].into_boxed_slice(),
            data: vec![0; data_capacity].into_boxed_slice(),
            by_path: vec![0; max_entries].into_boxed_slice(),
            by_name: vec![0; max_entries].into_boxed_slice(),
        }
    }

    pub(crate) fn entry_capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn data_capacity(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        let arena = IndexArena::new(IndexLimits {
            max_entries: u16::MAX,
            data_capacity: u32::MAX,
        });
        assert_eq!(arena.entry_capacity(), usize::from(u16::MAX) - 1);
        assert_eq!(arena.data_capacity(), MAX_DATA_CAPACITY as usize);
    }

    #[test]
    fn default_limits_match_device_budget() {
        let limits = IndexLimits::default();
        assert_eq!(limits.max_entries, 5000);
        assert_eq!(limits.data_capacity, 107 * 1024);
    }
}
