//! Compact identifier types for the memory index.
//!
//! The same entry set is addressed through three coordinate spaces:
//! [`Handle`] (creation order, used for linkage and ancestor tests),
//! [`PathEntryId`] (position in the path-sorted permutation), and
//! [`FileNameId`] (position in the name-sorted permutation of leaf files).

/// Index into the entry array, in creation (scan) order.
///
/// Stable for the lifetime of one index build. A parent's handle is always
/// numerically smaller than any of its children's handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u16);

impl Handle {
    /// On-disk/heap sentinel for "no parent"; never a valid handle.
    pub(crate) const RAW_NONE: u16 = u16::MAX;

    pub(crate) fn new(value: u16) -> Self {
        Self(value)
    }

    /// Decodes the heap/file representation, mapping the sentinel to `None`.
    pub(crate) fn from_raw(raw: u16) -> Option<Self> {
        if raw == Self::RAW_NONE {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Encodes an optional handle into the heap/file representation.
    pub(crate) fn to_raw(value: Option<Self>) -> u16 {
        value.map_or(Self::RAW_NONE, |handle| handle.0)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Index into the permutation ordering all entries by case-insensitive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathEntryId(u16);

impl PathEntryId {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Index into the permutation ordering leaf files by simple name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileNameId(u16);

impl FileNameId {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}
