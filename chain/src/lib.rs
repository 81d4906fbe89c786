//! Chain engine and mempool (spec.md §4.4, §4.5): block acceptance,
//! contextual validation, reorgs, difficulty retargeting, and the
//! unconfirmed transaction pool built on top of `thunderbolt-storage`.

pub mod engine;
pub mod error;
pub mod genesis;
pub mod mempool;
pub mod orphan;
pub mod revert;
pub mod unlock;
pub mod utxo;
pub mod validate;

pub use engine::ChainEngine;
pub use error::{ChainError, Result};
pub use genesis::genesis_block;
pub use mempool::Mempool;
pub use orphan::OrphanPool;
