//! A per-block overlay over the persisted UTXO set (spec.md §4.4.2's
//! "uniqueness/topological order" rule: an output created earlier in the
//! same block must be visible to a later transaction in that block, while
//! one consumed earlier must disappear).

use std::collections::{HashMap, HashSet};

use thunderbolt_storage::{MetadataStore, MetaView};
use thunderbolt_core::model::UtxoEntry;
use thunderbolt_core::Hash;

use crate::error::{ChainError, Result};

pub struct UtxoView<'a> {
    meta: &'a MetaView<dyn MetadataStore>,
    pending_new: HashMap<(Hash, u32), UtxoEntry>,
    pending_spent: HashSet<(Hash, u32)>,
    /// Entries resolved from the persisted store and consumed by this
    /// block; this, in block-input order, becomes the revert record.
    persisted_spent: Vec<UtxoEntry>,
}

impl<'a> UtxoView<'a> {
    pub fn new(meta: &'a MetaView<dyn MetadataStore>) -> Self {
        Self { meta, pending_new: HashMap::new(), pending_spent: HashSet::new(), persisted_spent: Vec::new() }
    }

    pub fn lookup(&self, txid: &Hash, index: u32) -> Result<Option<UtxoEntry>> {
        let key = (*txid, index);
        if self.pending_spent.contains(&key) {
            return Ok(None);
        }
        if let Some(entry) = self.pending_new.get(&key) {
            return Ok(Some(entry.clone()));
        }
        Ok(self.meta.get_utxo(txid, index)?)
    }

    /// Marks `(txid, index)` as consumed, returning the entry it pointed
    /// at. Fails if it was already spent or never existed.
    pub fn spend(&mut self, txid: &Hash, index: u32) -> Result<UtxoEntry> {
        let key = (*txid, index);
        if self.pending_spent.contains(&key) {
            return Err(ChainError::invalid_tx(txid, "input already spent earlier in this block"));
        }
        if let Some(entry) = self.pending_new.remove(&key) {
            self.pending_spent.insert(key);
            return Ok(entry);
        }
        let entry = self
            .meta
            .get_utxo(txid, index)?
            .ok_or_else(|| ChainError::invalid_tx(txid, "referenced output does not exist"))?;
        self.pending_spent.insert(key);
        self.persisted_spent.push(entry.clone());
        Ok(entry)
    }

    /// Registers a newly created output, visible to later lookups within
    /// the same block.
    pub fn create(&mut self, entry: UtxoEntry) {
        self.pending_new.insert(entry.key(), entry);
    }

    /// Consumes the view, returning (entries to delete from the persisted
    /// store, entries to add to it) for the caller to fold into one batch.
    pub fn into_parts(self) -> (Vec<UtxoEntry>, Vec<UtxoEntry>) {
        (self.persisted_spent, self.pending_new.into_values().collect())
    }
}
