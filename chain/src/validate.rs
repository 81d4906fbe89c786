//! Non-contextual validity (spec.md §4.4.1 step 1, §4.5): everything a
//! block or transaction must satisfy on its own, without consulting the
//! UTXO set or chain state.

use thunderbolt_core::codec::{encode_block, hash_block_header, merkle_root, txid, Writer};
use thunderbolt_core::model::LockType;
use thunderbolt_core::params::{MAX_BLOCK_SIZE, MAX_MONEY};
use thunderbolt_core::pow::hash_meets_target;
use thunderbolt_core::{Block, Hash, Transaction};

use crate::error::ChainError;

pub fn check_transaction_non_contextual(tx: &Transaction) -> Result<(), ChainError> {
    let id = txid(tx);
    if tx.witnesses.len() != tx.inputs.len() {
        return Err(ChainError::invalid_tx(&id, "witness count does not match input count"));
    }
    if !tx.is_coinbase() && tx.inputs.is_empty() {
        return Err(ChainError::invalid_tx(&id, "non-coinbase transaction has no inputs"));
    }
    let mut sum: u64 = 0;
    for out in &tx.outputs {
        if out.amount > MAX_MONEY {
            return Err(ChainError::invalid_tx(&id, "output amount exceeds MAX_MONEY"));
        }
        sum = sum
            .checked_add(out.amount)
            .ok_or_else(|| ChainError::invalid_tx(&id, "output sum overflows"))?;
        if out.lock_type == LockType::Unspendable && out.lock_params.len() > 32 {
            return Err(ChainError::invalid_tx(&id, "unspendable lockParams longer than 32 bytes"));
        }
    }
    if sum > MAX_MONEY {
        return Err(ChainError::invalid_tx(&id, "output sum exceeds MAX_MONEY"));
    }
    Ok(())
}

pub fn check_block_non_contextual(block: &Block) -> Result<(), ChainError> {
    let mut w = Writer::new();
    encode_block(&mut w, block);
    if w.into_bytes().len() > MAX_BLOCK_SIZE {
        return Err(ChainError::InvalidBlock("serialized block exceeds MAX_BLOCK_SIZE".into()));
    }
    if block.txs.is_empty() || !block.txs[0].is_coinbase() {
        return Err(ChainError::InvalidBlock("block has no leading coinbase".into()));
    }
    for tx in block.txs.iter().skip(1) {
        if tx.is_coinbase() {
            return Err(ChainError::InvalidBlock("coinbase shape outside first position".into()));
        }
    }
    for tx in &block.txs {
        check_transaction_non_contextual(tx)?;
    }
    let hash = hash_block_header(&block.header);
    if !hash_meets_target(&hash, block.header.bits) {
        return Err(ChainError::InvalidBlock("header hash does not meet target".into()));
    }
    let ids: Vec<Hash> = block.txs.iter().map(txid).collect();
    if merkle_root(&ids) != block.header.merkle_root {
        return Err(ChainError::InvalidBlock("merkle root mismatch".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::genesis_block;
    use thunderbolt_core::model::{Output, Outpoint};

    #[test]
    fn genesis_block_passes_non_contextual_check() {
        assert!(check_block_non_contextual(&genesis_block()).is_ok());
    }

    #[test]
    fn block_without_leading_coinbase_is_rejected() {
        let mut block = genesis_block();
        block.txs[0].inputs[0].ref_tx = [9u8; 32];
        assert!(check_block_non_contextual(&block).is_err());
    }

    #[test]
    fn transaction_with_mismatched_witness_count_is_rejected() {
        let tx = Transaction {
            version: 1,
            inputs: vec![Outpoint { ref_tx: [1u8; 32], index: 0 }],
            outputs: vec![Output { amount: 1, lock_type: LockType::SingleSig, lock_params: vec![] }],
            lock_time: 0,
            witnesses: vec![],
        };
        assert!(check_transaction_non_contextual(&tx).is_err());
    }

    #[test]
    fn output_over_max_money_is_rejected() {
        let tx = Transaction {
            version: 1,
            inputs: vec![Outpoint { ref_tx: [0u8; 32], index: 0xffff_ffff }],
            outputs: vec![Output { amount: MAX_MONEY + 1, lock_type: LockType::SingleSig, lock_params: vec![] }],
            lock_time: 0,
            witnesses: vec![vec![]],
        };
        assert!(check_transaction_non_contextual(&tx).is_err());
    }
}
