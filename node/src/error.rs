//! Typed coordinator errors (spec.md §4.10, §7).
//!
//! These wrap every subsystem error the coordinator can observe; nothing
//! here implies a particular response (banning/orphaning/shutdown) — that
//! decision stays in [`crate::coordinator`], matching spec.md §7's
//! "components return typed errors to the coordinator; the coordinator
//! decides".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Storage(#[from] thunderbolt_storage::StorageError),

    #[error(transparent)]
    Chain(#[from] thunderbolt_chain::ChainError),

    #[error(transparent)]
    Protocol(#[from] thunderbolt_network::ProtocolError),

    #[error(transparent)]
    Wallet(#[from] thunderbolt_wallet::WalletError),

    #[error("fewer than the minimum required peers connected during bootstrap")]
    InsufficientPeers,

    #[error("the chain has no genesis block yet")]
    ChainNotBootstrapped,

    #[error("wallet is locked or has not been created yet")]
    WalletLocked,

    #[error("wallet.dat already exists; unlock it instead of creating a new one")]
    WalletAlreadyExists,

    #[error("the coordinator has shut down")]
    ShuttingDown,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, NodeError>;
