//! Block storage: segmented byte arenas (C2) plus the metadata store (C3)
//! that indexes them, per spec.md §4.2/§4.3.

pub mod error;
pub mod keys;
pub mod meta;
pub mod segment;

pub use error::{Result, StorageError};
pub use meta::{Batch, MemMetadataStore, MetaView, MetadataStore, RocksMetadataStore};
pub use segment::{ContiguousStorage, FileSegmentStore, BLOCK_RECORD_MAGIC, MAX_SEGMENT_SIZE, REVERT_RECORD_MAGIC};

use std::path::Path;

/// Opens the on-disk layout of spec.md §6 rooted at `datadir`: `blocks/`,
/// `reverts/`, and `blocks/manifest/` for the metadata store.
pub struct DataDir {
    pub blocks: FileSegmentStore,
    pub reverts: FileSegmentStore,
    pub meta: std::sync::Arc<RocksMetadataStore>,
}

impl DataDir {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let meta = std::sync::Arc::new(RocksMetadataStore::open(root.join("blocks/manifest"))?);
        let view = MetaView::new(meta.clone());
        let block_segment = view.get_latest_segment(keys::BLOCKS_LATEST_SEGMENT_KEY)?;
        let revert_segment = view.get_latest_segment(keys::REVERTS_LATEST_SEGMENT_KEY)?;
        let blocks = FileSegmentStore::open(root.join("blocks"), "block", BLOCK_RECORD_MAGIC, block_segment)?;
        let reverts = FileSegmentStore::open(root.join("reverts"), "revert", REVERT_RECORD_MAGIC, revert_segment)?;
        Ok(Self { blocks, reverts, meta })
    }
}
