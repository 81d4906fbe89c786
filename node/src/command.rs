//! Requests external producers (the RPC surface, via [`crate::handle::NodeHandle`])
//! hand to the coordinator over a bounded channel, per spec.md §5's
//! "external producers hand transactions via a bounded queue" policy — the
//! mempool itself stays coordinator-owned.

use tokio::sync::oneshot;

use thunderbolt_core::{Hash, Transaction};

use crate::error::Result;

pub enum NodeCommand {
    /// Admit and, if accepted, relay a wallet-built transaction. The
    /// reply carries the admitted txid or the rejection reason.
    SubmitTransaction(Transaction, oneshot::Sender<Result<Hash>>),
}
