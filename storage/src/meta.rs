//! Embedded ordered key-value store over the key schema of spec.md §4.3.
//!
//! [`MetadataStore`] is the low-level capability trait (raw bytes in, raw
//! bytes out, batched writes for atomicity); [`MetaView`] is the typed
//! facade every other crate actually calls, encoding/decoding through
//! `thunderbolt_core::codec`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use thunderbolt_core::codec::{
    decode_address_metadata, decode_block_metadata, decode_tx_metadata, decode_utxo_entry,
    encode_address_metadata, encode_block_metadata, encode_tx_metadata, encode_utxo_entry, Reader, Writer,
};
use thunderbolt_core::model::{BlockMetadata, NetworkAddressMetadata, TxMetadata, UtxoEntry};
use thunderbolt_core::Hash;

use crate::error::{Result, StorageError};
use crate::keys;

/// One write in a [`Batch`].
enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of writes applied atomically by [`MetadataStore::write_batch`],
/// giving the "atomic-per-block" guarantee spec.md §4.4.1 step 6 asks for.
#[derive(Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Capability interface for the embedded KV store (spec.md §9's
/// "capability interfaces" redesign note).
pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn write_batch(&self, batch: Batch) -> Result<()>;
    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut batch = Batch::new();
        batch.put(key, value);
        self.write_batch(batch)
    }

    fn delete(&self, key: Vec<u8>) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete(key);
        self.write_batch(batch)
    }
}

/// [`MetadataStore`] over `rocksdb`, used in production.
pub struct RocksMetadataStore {
    db: rocksdb::DB,
}

impl RocksMetadataStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = rocksdb::DB::open(&opts, path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

impl MetadataStore for RocksMetadataStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(key).map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        let mut wb = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => wb.put(k, v),
                BatchOp::Delete(k) => wb.delete(k),
            }
        }
        self.db.write(wb).map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (k, v) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            if !k.starts_with(prefix) {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}

/// In-memory [`MetadataStore`] backing unit tests that don't need real
/// persistence (spec.md §9's dependency-injection redesign note makes this
/// a drop-in substitute for [`RocksMetadataStore`]).
#[derive(Default)]
pub struct MemMetadataStore {
    map: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemMetadataStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.lock().unwrap();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Typed facade over a [`MetadataStore`], encoding/decoding every value
/// through the key schema of spec.md §4.3.
pub struct MetaView<S: MetadataStore + ?Sized> {
    store: std::sync::Arc<S>,
}

impl<S: MetadataStore + ?Sized> Clone for MetaView<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: MetadataStore + ?Sized> MetaView<S> {
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Option<BlockMetadata>> {
        self.decode_opt(self.store.get(&keys::block(hash))?, decode_block_metadata)
    }

    pub fn get_tx(&self, txid: &Hash) -> Result<Option<TxMetadata>> {
        self.decode_opt(self.store.get(&keys::tx(txid))?, decode_tx_metadata)
    }

    pub fn get_utxo(&self, txid: &Hash, index: u32) -> Result<Option<UtxoEntry>> {
        self.decode_opt(self.store.get(&keys::utxo(txid, index))?, decode_utxo_entry)
    }

    pub fn get_chain_head(&self) -> Result<Option<BlockMetadata>> {
        self.decode_opt(self.store.get(keys::CHAIN_HEAD_KEY)?, decode_block_metadata)
    }

    pub fn get_latest_segment(&self, arena_key: &[u8]) -> Result<u32> {
        match self.store.get(arena_key)? {
            Some(bytes) if bytes.len() == 4 => Ok(u32::from_le_bytes(bytes.try_into().unwrap())),
            _ => Ok(0),
        }
    }

    pub fn get_address(&self, raw_ip: &[u8; 16]) -> Result<Option<NetworkAddressMetadata>> {
        self.decode_opt(self.store.get(&keys::address(raw_ip))?, decode_address_metadata)
    }

    pub fn scan_addresses(&self) -> Result<Vec<NetworkAddressMetadata>> {
        let rows = self.store.scan_prefix(&[keys::ADDRESS_PREFIX])?;
        rows.into_iter()
            .map(|(_, v)| {
                let mut r = Reader::new(&v);
                decode_address_metadata(&mut r).map_err(StorageError::from)
            })
            .collect()
    }

    /// Every unspent output currently on record. Used by wallets/RPC to
    /// compute balances; there is no secondary index by address, so callers
    /// filter this scan themselves.
    pub fn scan_utxos(&self) -> Result<Vec<UtxoEntry>> {
        let rows = self.store.scan_prefix(&[keys::UTXO_PREFIX])?;
        rows.into_iter()
            .map(|(_, v)| {
                let mut r = Reader::new(&v);
                decode_utxo_entry(&mut r).map_err(StorageError::from)
            })
            .collect()
    }

    pub fn delete_address(&self, raw_ip: &[u8; 16]) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete(keys::address(raw_ip));
        self.store.write_batch(batch)
    }

    pub fn put_address(&self, meta: &NetworkAddressMetadata) -> Result<()> {
        let mut w = Writer::new();
        encode_address_metadata(&mut w, meta);
        self.store.put(keys::address(&meta.addr.ip), w.into_bytes())
    }

    fn decode_opt<T>(&self, bytes: Option<Vec<u8>>, decode: impl Fn(&mut Reader) -> thunderbolt_core::CodecResult<T>) -> Result<Option<T>> {
        match bytes {
            None => Ok(None),
            Some(b) => {
                let mut r = Reader::new(&b);
                Ok(Some(decode(&mut r)?))
            }
        }
    }
}

/// Builds the batch write for `put_block`, exposed separately from a
/// convenience `put_block` so the chain engine can fold it into the larger
/// atomic commit of spec.md §4.4.1 step 6 alongside UTXO/chain-head writes.
pub fn encode_block_put(batch: &mut Batch, hash: &Hash, meta: &BlockMetadata) {
    let mut w = Writer::new();
    encode_block_metadata(&mut w, meta);
    batch.put(keys::block(hash), w.into_bytes());
}

pub fn encode_tx_put(batch: &mut Batch, meta: &TxMetadata) {
    let mut w = Writer::new();
    encode_tx_metadata(&mut w, meta);
    batch.put(keys::tx(&meta.txid), w.into_bytes());
}

pub fn encode_utxo_put(batch: &mut Batch, entry: &UtxoEntry) {
    let mut w = Writer::new();
    encode_utxo_entry(&mut w, entry);
    batch.put(keys::utxo(&entry.txid, entry.index), w.into_bytes());
}

pub fn encode_utxo_delete(batch: &mut Batch, txid: &Hash, index: u32) {
    batch.delete(keys::utxo(txid, index));
}

pub fn encode_chain_head_put(batch: &mut Batch, meta: &BlockMetadata) {
    let mut w = Writer::new();
    encode_block_metadata(&mut w, meta);
    batch.put(keys::CHAIN_HEAD_KEY.to_vec(), w.into_bytes());
}

pub fn encode_latest_segment_put(batch: &mut Batch, arena_key: &[u8], segment: u32) {
    batch.put(arena_key.to_vec(), segment.to_le_bytes().to_vec());
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_core::model::{BlockHeader, BlockStatus, LockType, NetworkAddress, Output, Pointer};
    use thunderbolt_core::pow::U256;

    fn sample_header() -> BlockHeader {
        BlockHeader { version: 1, parent: [0u8; 32], merkle_root: [1u8; 32], timestamp: 1, bits: 0x1dffffff, nonce: 0 }
    }

    fn sample_meta() -> BlockMetadata {
        BlockMetadata {
            header: sample_header(),
            height: 1,
            tx_count: 1,
            status: BlockStatus::Connected,
            total_work: U256::from_u64(100),
            block_ptr: Pointer { segment: 0, offset: 0 },
            revert_ptr: Pointer { segment: 0, offset: 0 },
        }
    }

    #[test]
    fn put_then_get_block_round_trips() {
        let store = std::sync::Arc::new(MemMetadataStore::new());
        let view = MetaView::new(store);
        let hash = [9u8; 32];
        let meta = sample_meta();
        let mut batch = Batch::new();
        encode_block_put(&mut batch, &hash, &meta);
        view.inner().write_batch(batch).unwrap();
        assert_eq!(view.get_block(&hash).unwrap(), Some(meta));
    }

    #[test]
    fn batch_is_all_or_nothing_from_the_readers_perspective() {
        let store = std::sync::Arc::new(MemMetadataStore::new());
        let view = MetaView::new(store);
        let entry = UtxoEntry {
            txid: [3u8; 32],
            index: 0,
            block_height: 1,
            version: 1,
            is_coinbase: false,
            output: Output { amount: 5, lock_type: LockType::SingleSig, lock_params: vec![] },
        };
        let mut batch = Batch::new();
        encode_utxo_put(&mut batch, &entry);
        encode_chain_head_put(&mut batch, &sample_meta());
        view.inner().write_batch(batch).unwrap();
        assert!(view.get_utxo(&entry.txid, 0).unwrap().is_some());
        assert!(view.get_chain_head().unwrap().is_some());
    }

    #[test]
    fn utxo_delete_removes_entry() {
        let store = std::sync::Arc::new(MemMetadataStore::new());
        let view = MetaView::new(store);
        let entry = UtxoEntry {
            txid: [4u8; 32],
            index: 2,
            block_height: 1,
            version: 1,
            is_coinbase: false,
            output: Output { amount: 5, lock_type: LockType::SingleSig, lock_params: vec![] },
        };
        let mut batch = Batch::new();
        encode_utxo_put(&mut batch, &entry);
        view.inner().write_batch(batch).unwrap();
        assert!(view.get_utxo(&entry.txid, 2).unwrap().is_some());

        let mut del_batch = Batch::new();
        encode_utxo_delete(&mut del_batch, &entry.txid, 2);
        view.inner().write_batch(del_batch).unwrap();
        assert!(view.get_utxo(&entry.txid, 2).unwrap().is_none());
    }

    #[test]
    fn address_scan_returns_all_entries() {
        let store = std::sync::Arc::new(MemMetadataStore::new());
        let view = MetaView::new(store);
        let a1 = NetworkAddressMetadata::fresh(NetworkAddress::from_ipv4([1, 1, 1, 1], 9567, 0), 1000);
        let a2 = NetworkAddressMetadata::fresh(NetworkAddress::from_ipv4([2, 2, 2, 2], 9567, 0), 1000);
        view.put_address(&a1).unwrap();
        view.put_address(&a2).unwrap();
        let all = view.scan_addresses().unwrap();
        assert_eq!(all.len(), 2);
    }
}
