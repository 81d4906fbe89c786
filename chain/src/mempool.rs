//! The unconfirmed transaction pool (spec.md §4.5).
//!
//! An in-memory `txid -> Transaction` map with a running byte-size
//! counter; eviction drops the lowest fee-rate entry first once the pool
//! grows past its byte budget. Not pinned by spec.md to a literal number,
//! [`DEFAULT_MEMPOOL_MAX_BYTES`] is a conservative default a node operator
//! can override.

use std::collections::HashMap;

use thunderbolt_core::codec::{encode_transaction, txid, Writer};
use thunderbolt_core::model::UtxoEntry;
use thunderbolt_core::{Hash, Transaction};
use thunderbolt_storage::{MetadataStore, MetaView};

use crate::error::{ChainError, Result};
use crate::unlock::check_unlock;
use crate::validate::check_transaction_non_contextual;

pub const DEFAULT_MEMPOOL_MAX_BYTES: usize = 64 * 1024 * 1024;

struct MempoolEntry {
    tx: Transaction,
    fee: u64,
    size: usize,
}

impl MempoolEntry {
    fn fee_rate(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.fee as f64 / self.size as f64
        }
    }
}

pub struct Mempool {
    entries: HashMap<Hash, MempoolEntry>,
    total_bytes: usize,
    max_bytes: usize,
}

impl Mempool {
    pub fn new(max_bytes: usize) -> Self {
        Self { entries: HashMap::new(), total_bytes: 0, max_bytes }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.entries.contains_key(id)
    }

    /// The pooled transaction for `id`, if any (serves `GetData` requests
    /// for unconfirmed transactions).
    pub fn get(&self, id: &Hash) -> Option<&Transaction> {
        self.entries.get(id).map(|e| &e.tx)
    }

    /// Validates `tx` against `meta`'s current UTXO set and, if it passes,
    /// admits it to the pool, evicting lower fee-rate entries if needed.
    pub fn admit(&mut self, tx: Transaction, meta: &MetaView<dyn MetadataStore>, tip_height: u64) -> Result<Hash> {
        check_transaction_non_contextual(&tx)?;
        let id = txid(&tx);
        if tx.is_coinbase() {
            return Err(ChainError::invalid_tx(&id, "coinbase transactions do not enter the mempool"));
        }
        if self.entries.contains_key(&id) {
            return Ok(id);
        }

        let mut input_sum: u64 = 0;
        for (input_idx, input) in tx.inputs.iter().enumerate() {
            let entry: UtxoEntry = meta
                .get_utxo(&input.ref_tx, input.index)?
                .ok_or_else(|| ChainError::invalid_tx(&id, "referenced output does not exist"))?;
            if entry.is_coinbase
                && tip_height + 1 < entry.block_height + thunderbolt_core::params::COINBASE_MATURITY
            {
                return Err(ChainError::invalid_tx(&id, "spends an immature coinbase output"));
            }
            let witness = tx
                .witnesses
                .get(input_idx)
                .ok_or_else(|| ChainError::invalid_tx(&id, "missing witness"))?;
            check_unlock(input, &entry.output, witness)
                .map_err(|e| ChainError::invalid_tx(&id, e.to_string()))?;
            input_sum = input_sum
                .checked_add(entry.output.amount)
                .ok_or_else(|| ChainError::invalid_tx(&id, "input sum overflows"))?;
        }
        let output_sum: u64 = tx.outputs.iter().map(|o| o.amount).sum();
        if output_sum > input_sum {
            return Err(ChainError::invalid_tx(&id, "outputs exceed inputs"));
        }
        let fee = input_sum - output_sum;

        let mut w = Writer::new();
        encode_transaction(&mut w, &tx);
        let size = w.into_bytes().len();

        self.total_bytes += size;
        self.entries.insert(id, MempoolEntry { tx, fee, size });
        self.evict_to_capacity();
        Ok(id)
    }

    /// Removes every mempool transaction that spends an input a newly
    /// connected block already consumed (they conflict and can never be
    /// included again in their current form).
    pub fn remove_conflicts(&mut self, confirmed: &[Transaction]) {
        let spent: std::collections::HashSet<(Hash, u32)> = confirmed
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| (i.ref_tx, i.index)))
            .collect();
        let conflicting: Vec<Hash> = self
            .entries
            .iter()
            .filter(|(_, e)| e.tx.inputs.iter().any(|i| spent.contains(&(i.ref_tx, i.index))))
            .map(|(id, _)| *id)
            .collect();
        for id in conflicting {
            self.remove(&id);
        }
    }

    pub fn remove(&mut self, id: &Hash) -> Option<Transaction> {
        let entry = self.entries.remove(id)?;
        self.total_bytes -= entry.size;
        Some(entry.tx)
    }

    /// The next candidate for inclusion in a block, highest fee-rate first.
    pub fn pick(&self) -> Option<&Transaction> {
        self.entries
            .values()
            .max_by(|a, b| a.fee_rate().partial_cmp(&b.fee_rate()).unwrap())
            .map(|e| &e.tx)
    }

    fn evict_to_capacity(&mut self) {
        while self.total_bytes > self.max_bytes {
            let worst = self
                .entries
                .iter()
                .min_by(|a, b| a.1.fee_rate().partial_cmp(&b.1.fee_rate()).unwrap())
                .map(|(id, _)| *id);
            match worst {
                Some(id) => {
                    self.remove(&id);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use thunderbolt_core::model::{LockType, Outpoint, Output};
    use thunderbolt_storage::{keys, MemMetadataStore};

    fn put_utxo(meta: &MetaView<dyn MetadataStore>, entry: &UtxoEntry) {
        let mut w = Writer::new();
        thunderbolt_core::codec::encode_utxo_entry(&mut w, entry);
        meta.inner().put(keys::utxo(&entry.txid, entry.index), w.into_bytes()).unwrap();
    }

    fn spendable_tx(ref_tx: Hash, amount: u64, fee: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![Outpoint { ref_tx, index: 0 }],
            outputs: vec![Output { amount: amount - fee, lock_type: LockType::Unspendable, lock_params: vec![] }],
            lock_time: 0,
            witnesses: vec![vec![]],
        }
    }

    #[test]
    fn rejects_transaction_with_unknown_input() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemMetadataStore::new());
        let meta = MetaView::new(store);
        let mut pool = Mempool::new(DEFAULT_MEMPOOL_MAX_BYTES);
        let tx = spendable_tx([1u8; 32], 100, 1);
        assert!(pool.admit(tx, &meta, 10).is_err());
    }

    #[test]
    fn remove_conflicts_drops_double_spends() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemMetadataStore::new());
        let meta = MetaView::new(store);
        let utxo = UtxoEntry {
            txid: [2u8; 32],
            index: 0,
            block_height: 1,
            version: 1,
            is_coinbase: false,
            output: Output { amount: 100, lock_type: LockType::Unspendable, lock_params: vec![] },
        };
        put_utxo(&meta, &utxo);
        // Unspendable can't actually be admitted (check_unlock always fails
        // for it); use it only to exercise remove_conflicts directly below.
        let mut pool = Mempool::new(DEFAULT_MEMPOOL_MAX_BYTES);
        let conflicting_tx = spendable_tx([2u8; 32], 100, 1);
        let id = thunderbolt_core::codec::txid(&conflicting_tx);
        pool.entries.insert(
            id,
            MempoolEntry {
                tx: conflicting_tx.clone(),
                fee: 1,
                size: 10,
            },
        );
        pool.total_bytes = 10;
        pool.remove_conflicts(&[conflicting_tx]);
        assert!(pool.is_empty());
    }
}
