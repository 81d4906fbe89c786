//! Segmented append-only byte storage (spec.md §4.2).
//!
//! Two independent arenas use this: block storage and revert storage. Each
//! is a directory of monotonically-numbered files, `<prefix><00000>.bin`,
//! sealed once a write would push them past [`MAX_SEGMENT_SIZE`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thunderbolt_core::model::Pointer;

use crate::error::{Result, StorageError};

/// A segment is sealed once its size would exceed this (spec.md §4.2).
pub const MAX_SEGMENT_SIZE: u64 = 128 * 1024 * 1024;

/// Frame magic for block-storage records.
pub const BLOCK_RECORD_MAGIC: u32 = 0x544c_4b42; // "TBLK" in little-endian bytes
/// Frame magic for revert-storage records.
pub const REVERT_RECORD_MAGIC: u32 = 0x5254_4256; // "VBTR"

/// Capability interface for an append-only, pointer-addressed byte store
/// (spec.md §9's "capability interfaces" redesign of the source's manager
/// hierarchy).
pub trait ContiguousStorage: Send {
    /// Appends `bytes` as one framed record, returning a pointer to it. The
    /// full record (magic+length+payload) is visible after return or none
    /// of it is.
    fn store(&mut self, bytes: &[u8]) -> Result<Pointer>;

    /// Reads back the payload previously written at `ptr`.
    fn retrieve(&self, ptr: Pointer) -> Result<Vec<u8>>;

    /// The highest segment id currently open for writing.
    fn latest_segment(&self) -> u32;

    /// Forces durability of everything written so far. Callers must call
    /// this before persisting a pointer into this store inside the
    /// metadata store (spec.md §4.2's fsync contract).
    fn sync(&mut self) -> Result<()>;
}

/// On-disk [`ContiguousStorage`] over plain files, one per segment.
pub struct FileSegmentStore {
    dir: PathBuf,
    prefix: &'static str,
    magic: u32,
    current_id: u32,
    current_file: File,
    current_size: u64,
}

impl FileSegmentStore {
    /// Opens (creating if necessary) the segment arena rooted at `dir`,
    /// resuming at `resume_segment` (typically the value persisted under
    /// the metadata store's `'l'` key).
    pub fn open(dir: impl AsRef<Path>, prefix: &'static str, magic: u32, resume_segment: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let path = segment_path(&dir, prefix, resume_segment);
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();
        Ok(Self { dir, prefix, magic, current_id: resume_segment, current_file: file, current_size })
    }

    fn roll_segment(&mut self) -> Result<()> {
        self.current_file.sync_all()?;
        self.current_id += 1;
        let path = segment_path(&self.dir, self.prefix, self.current_id);
        self.current_file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        self.current_size = 0;
        Ok(())
    }

    fn read_at(&self, segment: u32, offset: u64) -> Result<Vec<u8>> {
        let path = segment_path(&self.dir, self.prefix, segment);
        let mut file = File::open(&path).map_err(|_| StorageError::MissingSegment(segment))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let found_magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if found_magic != self.magic {
            return Err(StorageError::Corruption { expected: self.magic, found: found_magic });
        }
        let len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload)?;
        Ok(payload)
    }
}

fn segment_path(dir: &Path, prefix: &str, id: u32) -> PathBuf {
    dir.join(format!("{prefix}{id:05}.bin"))
}

impl ContiguousStorage for FileSegmentStore {
    fn store(&mut self, bytes: &[u8]) -> Result<Pointer> {
        let record_len = 8 + bytes.len() as u64;
        if self.current_size + record_len > MAX_SEGMENT_SIZE && self.current_size > 0 {
            self.roll_segment()?;
        }
        let ptr = Pointer { segment: self.current_id, offset: self.current_size };
        let mut frame = Vec::with_capacity(record_len as usize);
        frame.extend_from_slice(&self.magic.to_le_bytes());
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(bytes);
        self.current_file.write_all(&frame)?;
        self.current_size += record_len;
        Ok(ptr)
    }

    fn retrieve(&self, ptr: Pointer) -> Result<Vec<u8>> {
        self.read_at(ptr.segment, ptr.offset)
    }

    fn latest_segment(&self) -> u32 {
        self.current_id
    }

    fn sync(&mut self) -> Result<()> {
        self.current_file.sync_all().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_then_retrieve_round_trips() {
        let dir = tempdir().unwrap();
        let mut store = FileSegmentStore::open(dir.path(), "block", BLOCK_RECORD_MAGIC, 0).unwrap();
        let ptr = store.store(b"hello block").unwrap();
        assert_eq!(store.retrieve(ptr).unwrap(), b"hello block");
    }

    #[test]
    fn multiple_records_keep_distinct_pointers() {
        let dir = tempdir().unwrap();
        let mut store = FileSegmentStore::open(dir.path(), "block", BLOCK_RECORD_MAGIC, 0).unwrap();
        let p1 = store.store(b"first").unwrap();
        let p2 = store.store(b"second").unwrap();
        assert_ne!(p1, p2);
        assert_eq!(store.retrieve(p1).unwrap(), b"first");
        assert_eq!(store.retrieve(p2).unwrap(), b"second");
    }

    #[test]
    fn rollover_creates_a_new_segment_file() {
        let dir = tempdir().unwrap();
        let mut store = FileSegmentStore::open(dir.path(), "block", BLOCK_RECORD_MAGIC, 0).unwrap();
        // Force a rollover without actually writing 128MiB in a test.
        store.current_size = MAX_SEGMENT_SIZE;
        let ptr = store.store(b"rolled").unwrap();
        assert_eq!(ptr.segment, 1);
        assert_eq!(store.latest_segment(), 1);
        assert_eq!(store.retrieve(ptr).unwrap(), b"rolled");
    }

    #[test]
    fn wrong_magic_reports_corruption() {
        let dir = tempdir().unwrap();
        let mut store = FileSegmentStore::open(dir.path(), "block", BLOCK_RECORD_MAGIC, 0).unwrap();
        let _ = store.store(b"payload").unwrap();
        // A reader opened with a different arena's magic must reject it.
        let wrong = FileSegmentStore::open(dir.path(), "block", REVERT_RECORD_MAGIC, 0).unwrap();
        let err = wrong.retrieve(Pointer { segment: 0, offset: 0 }).unwrap_err();
        assert!(matches!(err, StorageError::Corruption { .. }));
    }

    #[test]
    fn resuming_at_a_segment_appends_rather_than_truncates() {
        let dir = tempdir().unwrap();
        let mut store = FileSegmentStore::open(dir.path(), "block", BLOCK_RECORD_MAGIC, 0).unwrap();
        let p1 = store.store(b"alpha").unwrap();
        drop(store);
        let mut reopened = FileSegmentStore::open(dir.path(), "block", BLOCK_RECORD_MAGIC, 0).unwrap();
        let p2 = reopened.store(b"beta").unwrap();
        assert_eq!(reopened.retrieve(p1).unwrap(), b"alpha");
        assert_eq!(reopened.retrieve(p2).unwrap(), b"beta");
    }
}
