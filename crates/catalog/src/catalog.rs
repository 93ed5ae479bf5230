//! Orchestrates the two index files, the memory index, and the real
//! filesystem.
//!
//! The catalog owns the memory index for the process lifetime and is the
//! only mutation path. Its single multi-step mutation is the delete
//! transaction, which rewrites the master index, rebuilds the memory index,
//! removes the target from storage, and commits both files, in that order.
//! A transaction marker file records the in-flight operation so an
//! interrupted delete can be diagnosed and resumed after a restart.

use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use fnv::FnvHasher;
use tracing::{debug, info};

use crate::codec;
use crate::error::{CatalogError, LoadError, Result};
use crate::index::{Handle, MemIndex, MemIndexBuilder, MemIndexEntry, PathEntryId};
use crate::stream::{ContainerKind, EntryKind, FileKind, TreeReader, TreeWriter};

/// The authoritative on-disk tree stream.
pub const MASTER_INDEX: &str = "master.idx";
/// Filtered rewrite of the master index, in progress or resumable.
pub const MASTER_INDEX_TMP: &str = "master.idx.new";
/// Persisted memory index; a derived cache of the master index.
pub const MEM_INDEX: &str = "mem.idx";
/// Rebuilt memory index, in progress or resumable.
pub const MEM_INDEX_TMP: &str = "mem.idx.new";
/// Pending-operation record, present only during an in-flight delete.
pub const TRANSACTION_FILE: &str = "transaction";

/// Operation kind byte in the transaction marker.
const OP_DELETE: u8 = 0;

/// Phase bytes in the transaction marker.
const PHASE_STARTED: u8 = 0;
const PHASE_FILTERED: u8 = 1;

/// A decoded transaction marker left behind by an interrupted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Path of the entry the operation targeted, relative to the media root.
    pub target: String,
    /// Present once the filtered master index was written in full; holds
    /// the FNV-1a checksum of its content. The filter phase may only be
    /// skipped on resume when the temp file still matches this checksum.
    pub filter_checksum: Option<u64>,
}

/// Where an entry sits within its parent container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInParent {
    /// Path-order position of the parent container, or `None` for top-level
    /// entries (the virtual root is not a real entry and has no position).
    pub parent: Option<PathEntryId>,
    /// Zero-based index among the siblings that precede the entry in path
    /// order.
    pub position: usize,
}

/// Locations of the index files and the media tree they describe.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Root of the cataloged media collection; index paths are relative to
    /// this directory.
    pub media_root: PathBuf,
    /// Directory holding the index and transaction files.
    pub index_dir: PathBuf,
}

pub struct Catalog {
    cfg: CatalogConfig,
    index: MemIndex,
}

impl Catalog {
    /// Creates the catalog, ensuring the index directory exists.
    pub fn new(cfg: CatalogConfig, index: MemIndex) -> Result<Self> {
        fs::create_dir_all(&cfg.index_dir)?;
        Ok(Self { cfg, index })
    }

    pub fn index(&self) -> &MemIndex {
        &self.index
    }

    fn index_file(&self, name: &str) -> PathBuf {
        self.cfg.index_dir.join(name)
    }

    /// Loads the persisted memory index. `DoesNotExist` means no index has
    /// been built yet; other errors mean the cache is unusable and the
    /// caller should offer a rebuild from the master index.
    pub fn load_index(&mut self) -> std::result::Result<(), LoadError> {
        self.index.load(&self.index_file(MEM_INDEX))
    }

    /// Rebuilds the memory index from the master index stream and persists
    /// it. Used after a fresh scan and when the cache is lost or corrupt.
    pub fn rebuild_from_master(&mut self) -> Result<()> {
        let master = self.index_file(MASTER_INDEX);
        let mut reader = TreeReader::open(&master)?;
        let mut builder = MemIndexBuilder::new(&mut self.index);
        while let Some(entry) = reader.next_entry()? {
            builder.add_entry(&entry)?;
        }
        builder.finish();
        self.index.store(&self.index_file(MEM_INDEX))?;
        info!(count = self.index.count(), "memory index rebuilt from master index");
        Ok(())
    }

    /// Returns the entry at a path-order position.
    pub fn resolve(&self, id: PathEntryId) -> MemIndexEntry<'_> {
        self.index.entry(self.index.entry_by_path(id))
    }

    /// Determines the parent container of the given entry and the index
    /// under which the entry appears within it.
    ///
    /// Scans backward through the path-order permutation, counting siblings,
    /// until the parent itself is found; the path-sort contiguity invariant
    /// guarantees the parent is the nearest non-descendant predecessor.
    pub fn position_in_parent(&self, id: PathEntryId) -> PositionInParent {
        let parent_handle = self.resolve(id).parent_handle();
        let mut position = 0;
        let mut current = id.value();
        while current > 0 {
            current -= 1;
            let prior = PathEntryId::new(current);
            let handle = self.index.entry_by_path(prior);
            match parent_handle {
                Some(parent) => {
                    if handle == parent {
                        return PositionInParent {
                            parent: Some(prior),
                            position,
                        };
                    }
                    if self.index.entry(handle).parent_handle() == Some(parent) {
                        position += 1;
                    }
                }
                None => {
                    if self.index.entry(handle).is_root() {
                        position += 1;
                    }
                }
            }
        }
        PositionInParent {
            parent: None,
            position,
        }
    }

    /// Iterates the direct children of a container, in path order.
    pub fn children(&self, id: PathEntryId) -> ChildIter<'_> {
        ChildIter {
            index: &self.index,
            node: self.index.entry_by_path(id),
            next: usize::from(id.value()) + 1,
        }
    }

    /// Decodes a leftover transaction marker, if any.
    pub fn pending_transaction(&self) -> Result<Option<PendingTransaction>> {
        let mut file = match File::open(self.index_file(TRANSACTION_FILE)) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(CatalogError::Io(error)),
        };
        let op = codec::read_u8(&mut file).map_err(eof_to_bad_marker)?;
        if op != OP_DELETE {
            return Err(CatalogError::BadData("unknown transaction kind"));
        }
        let target = codec::read_str(&mut file).map_err(eof_to_bad_marker)?;
        let target = String::from_utf8(target)
            .map_err(|_| CatalogError::BadData("transaction path is not valid UTF-8"))?;
        let phase = codec::read_u8(&mut file).map_err(eof_to_bad_marker)?;
        let filter_checksum = match phase {
            PHASE_STARTED => None,
            PHASE_FILTERED => Some(codec::read_u64(&mut file).map_err(eof_to_bad_marker)?),
            _ => return Err(CatalogError::BadData("unknown transaction phase")),
        };
        Ok(Some(PendingTransaction {
            target,
            filter_checksum,
        }))
    }

    /// Deletes the file or directory at the given path-order position,
    /// keeping the master index, the memory index, and storage consistent.
    ///
    /// On failure the state reached so far, including the temp files and the
    /// transaction marker, is left in place so that a subsequent call for
    /// the same target resumes where the transaction stopped.
    pub fn delete(&mut self, id: PathEntryId) -> Result<()> {
        let entry = self.resolve(id);
        if entry.is_read_only() {
            return Err(CatalogError::ReadOnly(entry.path()));
        }
        let target = entry.path();
        let target_is_file = entry.is_file();
        info!(target, "delete transaction started");

        // A marker already naming this target means a previous attempt is
        // being resumed; its recorded phase progress must survive.
        let prior = self
            .pending_transaction()?
            .filter(|pending| pending.target == target);
        if prior.is_none() {
            self.write_transaction_marker(&target, None)?;
        }

        let master = self.index_file(MASTER_INDEX);
        if master.exists() {
            self.filter_master_index(&target, target_is_file)?;
            let checksum = checksum_file(&self.index_file(MASTER_INDEX_TMP))?;
            self.write_transaction_marker(&target, Some(checksum))?;
        } else {
            // The old master index is already gone, which can only be
            // legitimate if the filter phase completed. The marker's
            // checksum guards against trusting a half-written temp file.
            let expected = prior
                .and_then(|pending| pending.filter_checksum)
                .ok_or(CatalogError::BadData(
                    "master index missing with no completed filter phase",
                ))?;
            let actual = checksum_file(&self.index_file(MASTER_INDEX_TMP))?;
            if actual != expected {
                return Err(CatalogError::BadData(
                    "filtered master index failed verification",
                ));
            }
            debug!(target, "filter phase verified; resuming");
        }

        self.rebuild_mem_index_tmp()?;

        // Only after both index rewrites succeed is real data touched.
        remove_recursively(&self.cfg.media_root.join(&target))?;

        self.commit(MASTER_INDEX_TMP, MASTER_INDEX)?;
        self.commit(MEM_INDEX_TMP, MEM_INDEX)?;
        fs::remove_file(self.index_file(TRANSACTION_FILE))?;
        info!(target, "delete transaction committed");
        Ok(())
    }

    /// Step 1: record intent before any mutation. Rewritten with the
    /// filtered file's checksum once the filter phase is durable.
    fn write_transaction_marker(&self, target: &str, filter_checksum: Option<u64>) -> Result<()> {
        if target.len() > codec::MAX_STR_LEN {
            return Err(CatalogError::Overflow("target path longer than 255 bytes"));
        }
        let path = self.index_file(TRANSACTION_FILE);
        let result = (|| -> io::Result<()> {
            let mut file = BufWriter::new(File::create(&path)?);
            codec::write_u8(&mut file, OP_DELETE)?;
            codec::write_str(&mut file, target.as_bytes())?;
            match filter_checksum {
                None => codec::write_u8(&mut file, PHASE_STARTED)?,
                Some(checksum) => {
                    codec::write_u8(&mut file, PHASE_FILTERED)?;
                    codec::write_u64(&mut file, checksum)?;
                }
            }
            file.flush()
        })();
        if let Err(error) = result {
            // Abort before touching any index; a half-written marker must
            // not survive.
            let _ = fs::remove_file(&path);
            return Err(CatalogError::Write(error));
        }
        Ok(())
    }

    /// Step 2: stream the master index into a filtered temp copy without the
    /// target's records.
    fn filter_master_index(&self, target: &str, target_is_file: bool) -> Result<()> {
        let master = self.index_file(MASTER_INDEX);
        let master_tmp = self.index_file(MASTER_INDEX_TMP);
        remove_if_exists(&master_tmp)?;
        let mut reader = TreeReader::open(&master)?;
        let mut writer = TreeWriter::create(&master_tmp)?;
        let mut depth = 0usize;
        let mut deletion_depth: Option<usize> = None;
        while let Some(entry) = reader.next_entry()? {
            while entry.depth() < depth {
                writer.container_end();
                depth -= 1;
            }
            if let Some(limit) = deletion_depth {
                if entry.depth() > limit {
                    // Inside the container being deleted.
                    continue;
                }
                // Out of the deleted subtree; back to pass-through.
                deletion_depth = None;
            }
            depth = entry.depth();
            if entry.path() == target {
                if target_is_file {
                    debug!(name = entry.name(), "dropping file record");
                } else {
                    deletion_depth = Some(entry.depth());
                }
                continue;
            }
            match entry.kind() {
                EntryKind::Dir => {
                    writer.container_begin(ContainerKind::Dir, entry.name(), 0);
                    depth += 1;
                }
                EntryKind::Archive => {
                    writer.container_begin(ContainerKind::Archive, entry.name(), entry.size());
                    depth += 1;
                }
                EntryKind::File => writer.add_file(FileKind::Media, entry.name(), entry.size()),
            }
        }
        while depth > 0 {
            writer.container_end();
            depth -= 1;
        }
        writer.close()
    }

    /// Step 3: rebuild the memory index from the filtered stream and persist
    /// it to the temp cache file.
    fn rebuild_mem_index_tmp(&mut self) -> Result<()> {
        let master_tmp = self.index_file(MASTER_INDEX_TMP);
        let mem_tmp = self.index_file(MEM_INDEX_TMP);
        remove_if_exists(&mem_tmp)?;
        let mut reader = TreeReader::open(&master_tmp)?;
        let mut builder = MemIndexBuilder::new(&mut self.index);
        while let Some(entry) = reader.next_entry()? {
            builder.add_entry(&entry)?;
        }
        builder.finish();
        self.index.store(&mem_tmp)
    }

    /// Step 5: replace a committed file with its rewritten temp copy.
    fn commit(&self, tmp_name: &str, final_name: &str) -> Result<()> {
        let tmp = self.index_file(tmp_name);
        let target = self.index_file(final_name);
        remove_if_exists(&target)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

/// Iterates the direct children of a container by scanning forward through
/// the path-order permutation. Stops at the first entry that is not a
/// descendant at all: the contiguity invariant guarantees nothing further
/// can be a child.
pub struct ChildIter<'a> {
    index: &'a MemIndex,
    node: Handle,
    next: usize,
}

impl Iterator for ChildIter<'_> {
    type Item = PathEntryId;

    fn next(&mut self) -> Option<PathEntryId> {
        while self.next < self.index.count() {
            let id = PathEntryId::new(self.next as u16);
            self.next += 1;
            let entry = self.index.entry(self.index.entry_by_path(id));
            if entry.parent_handle() == Some(self.node) {
                return Some(id);
            }
            if !entry.is_descendant_of(self.node) {
                self.next = self.index.count();
                return None;
            }
        }
        None
    }
}

/// FNV-1a content checksum, recorded in the transaction marker so a resume
/// never trusts a half-written temp file.
fn checksum_file(path: &Path) -> Result<u64> {
    let mut file = File::open(path).map_err(|source| CatalogError::BadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = FnvHasher::default();
    let mut buf = [0u8; 512];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.write(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Recursive removal; a missing target counts as success.
fn remove_recursively(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(CatalogError::Io(error)),
        Ok(meta) if meta.is_dir() => {
            debug!(path = %path.display(), "removing directory tree");
            fs::remove_dir_all(path).map_err(CatalogError::Io)
        }
        Ok(_) => {
            debug!(path = %path.display(), "removing file");
            fs::remove_file(path).map_err(CatalogError::Io)
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other.map_err(CatalogError::Io),
    }
}

fn eof_to_bad_marker(error: io::Error) -> CatalogError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        CatalogError::BadData("truncated transaction marker")
    } else {
        CatalogError::Io(error)
    }
}
