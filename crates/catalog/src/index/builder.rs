//! Incrementally populates the memory index from tree-stream entries.

use super::types::Handle;
use super::MemIndex;
use crate::error::Result;
use crate::stream::{EntryKind, EntryView, MAX_NESTING_DEPTH};

/// Consumes reader (or scanner) events in depth-first order and mirrors the
/// stream's nesting with a stack of container handles.
///
/// The index is always rebuilt wholesale: constructing a builder clears it.
pub struct MemIndexBuilder<'a> {
    index: &'a mut MemIndex,
    path: Vec<Handle>,
}

impl<'a> MemIndexBuilder<'a> {
    pub fn new(index: &'a mut MemIndex) -> Self {
        index.clear();
        Self {
            index,
            path: Vec::with_capacity(MAX_NESTING_DEPTH),
        }
    }

    /// Adds one stream entry. The stack is popped down to the entry's depth;
    /// the new stack top (if any) is the entry's parent.
    ///
    /// Capacity failures propagate without corrupting entries already added.
    pub fn add_entry(&mut self, entry: &EntryView<'_>) -> Result<()> {
        self.path.truncate(entry.depth());
        let parent = self.path.last().copied();
        let added = match entry.kind() {
            EntryKind::Dir => self.index.add_dir(parent, entry.name())?,
            EntryKind::Archive => self.index.add_archive(parent, entry.name(), entry.size())?,
            EntryKind::File => self.index.add_file(parent, entry.name(), entry.size())?,
        };
        if entry.is_container() {
            self.path.push(added);
        }
        Ok(())
    }

    /// Finalizes the build by constructing both sort permutations.
    pub fn finish(self) {
        self.index.build_sort_indexes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexArena, IndexLimits};
    use crate::stream::{ContainerKind, FileKind, TreeReader, TreeWriter};

    fn build_from_stream(limits: IndexLimits) -> (MemIndex, Result<()>) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("master.idx");
        let mut writer = TreeWriter::create(&path).unwrap();
        writer.container_begin(ContainerKind::Dir, "A", 0);
        writer.add_file(FileKind::Media, "f1.tap", 100);
        writer.container_begin(ContainerKind::Archive, "z1.zip", 500);
        writer.add_file(FileKind::Media, "m1.tap", 200);
        writer.container_end();
        writer.container_begin(ContainerKind::Dir, "B", 0);
        writer.add_file(FileKind::Media, "f2.tap", 300);
        writer.container_end();
        writer.container_end();
        writer.close().unwrap();

        let mut index = MemIndex::new(IndexArena::new(limits));
        let mut reader = TreeReader::open(&path).unwrap();
        let mut builder = MemIndexBuilder::new(&mut index);
        let mut result = Ok(());
        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    if let Err(error) = builder.add_entry(&entry) {
                        result = Err(error);
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        if result.is_ok() {
            builder.finish();
        }
        (index, result)
    }

    #[test]
    fn builds_parent_linkage_from_nesting() {
        let (index, result) = build_from_stream(IndexLimits::default());
        result.unwrap();
        assert_eq!(index.count(), 6);
        assert_eq!(index.path(Handle::new(1)), "A/f1.tap");
        assert_eq!(index.path(Handle::new(3)), "A/z1.zip/m1.tap");
        // Sibling container after popping back out of the archive.
        let b = index.entry(Handle::new(4));
        assert_eq!(b.parent_handle(), Some(Handle::new(0)));
        assert_eq!(index.path(Handle::new(5)), "A/B/f2.tap");
        assert_eq!(index.file_count(), 3);
    }

    #[test]
    fn capacity_failure_propagates_without_corruption() {
        let (index, result) = build_from_stream(IndexLimits {
            max_entries: 3,
            data_capacity: 1024,
        });
        assert!(result.is_err());
        assert_eq!(index.count(), 3);
        assert_eq!(index.path(Handle::new(2)), "A/z1.zip");
    }
}
