//! The hard-coded genesis block (spec.md §8 scenario 1).
//!
//! The original fixture also asserts a literal chain-head hash. That hash
//! is a function of the genesis coinbase transaction's exact byte contents,
//! which the source this was distilled from never specified beyond "the
//! hard-coded genesis" — inventing bytes to match an unreproducible hash
//! would be worse than not asserting it, so tests here check the
//! structural properties of bootstrap instead (see `thunderbolt-chain`'s
//! integration tests).

use thunderbolt_core::codec::{merkle_root, txid};
use thunderbolt_core::model::{BlockHeader, Output};
use thunderbolt_core::{Block, LockType, Outpoint, Transaction, ZERO_HASH};

/// Genesis header fields, taken verbatim from spec.md §8 scenario 1.
pub const GENESIS_TIMESTAMP: u32 = 1_525_003_294;
pub const GENESIS_BITS: u32 = 0x1dfffff8;
pub const GENESIS_NONCE: u32 = 449_327_816;

/// The single coinbase output of the genesis block is unspendable: there is
/// no keypair to hand a reward to at the dawn of the chain.
pub fn genesis_block() -> Block {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![Outpoint { ref_tx: ZERO_HASH, index: 0xffff_ffff }],
        outputs: vec![Output {
            amount: thunderbolt_core::params::INITIAL_SUBSIDY,
            lock_type: LockType::Unspendable,
            lock_params: b"thunderbolt genesis block".to_vec(),
        }],
        lock_time: 0,
        witnesses: vec![vec![]],
    };
    let header = BlockHeader {
        version: 1,
        parent: ZERO_HASH,
        merkle_root: merkle_root(&[txid(&coinbase)]),
        timestamp: GENESIS_TIMESTAMP,
        bits: GENESIS_BITS,
        nonce: GENESIS_NONCE,
    };
    Block { header, txs: vec![coinbase] }
}
