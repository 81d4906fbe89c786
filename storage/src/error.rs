use thiserror::Error;

/// Errors raised by the segmented store or the metadata store (spec.md §7
/// `StorageError`): non-recoverable at the call site, surfaced so the
/// coordinator can initiate shutdown.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record corrupted: expected magic {expected:#010x}, found {found:#010x}")]
    Corruption { expected: u32, found: u32 },

    #[error("segment {0} not found")]
    MissingSegment(u32),

    #[error("codec error: {0}")]
    Codec(#[from] thunderbolt_core::CodecError),

    #[error("key-value store error: {0}")]
    Backend(String),
}

pub type Result<T> = core::result::Result<T, StorageError>;
