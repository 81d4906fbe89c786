//! Typed chain errors (spec.md §4.4.5, §7).
//!
//! The coordinator decides what to do with each variant: `Orphan` is
//! retryable, `InvalidBlock`/`InvalidTransaction` mark the block permanently
//! bad, `StorageError` aborts the engine and triggers shutdown.

use thiserror::Error;
use thunderbolt_core::hash_to_hex;
use thunderbolt_core::Hash;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("orphan block: parent {parent} not found")]
    Orphan { parent: String },

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid transaction {txid}: {reason}")]
    InvalidTransaction { txid: String, reason: String },

    #[error(transparent)]
    StorageError(#[from] thunderbolt_storage::StorageError),

    #[error("codec error: {0}")]
    Codec(#[from] thunderbolt_core::CodecError),

    #[error("coinbase claims {claimed} units, only {allowed} allowed")]
    CoinbaseOverpay { claimed: u64, allowed: u64 },
}

impl ChainError {
    pub fn orphan(parent: &Hash) -> Self {
        Self::Orphan { parent: hash_to_hex(parent) }
    }

    pub fn invalid_tx(txid: &Hash, reason: impl Into<String>) -> Self {
        Self::InvalidTransaction { txid: hash_to_hex(txid), reason: reason.into() }
    }
}

pub type Result<T> = core::result::Result<T, ChainError>;
