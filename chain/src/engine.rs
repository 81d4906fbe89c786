//! The chain engine (spec.md §4.4): block acceptance, contextual
//! validation, reorgs, and difficulty retargeting.

use std::sync::Arc;

use thunderbolt_core::codec::{decode_block, encode_block, hash_block_header, txid, Reader, Writer};
use thunderbolt_core::model::{BlockMetadata, BlockStatus, Pointer, UtxoEntry};
use thunderbolt_core::params::{COINBASE_MATURITY, RETARGET_INTERVAL, subsidy};
use thunderbolt_core::pow::{bits_to_target, retarget, work_for_target};
use thunderbolt_core::{Block, Hash};
use thunderbolt_storage::meta::{
    encode_block_put, encode_chain_head_put, encode_latest_segment_put, encode_tx_put, encode_utxo_delete,
    encode_utxo_put,
};
use thunderbolt_storage::{keys, Batch, ContiguousStorage, MetadataStore, MetaView};

use crate::error::{ChainError, Result};
use crate::genesis::genesis_block;
use crate::mempool::Mempool;
use crate::orphan::OrphanPool;
use crate::revert::{decode_revert_record, encode_revert_record, RevertRecord};
use crate::unlock::check_unlock;
use crate::utxo::UtxoView;
use crate::validate::{check_block_non_contextual, check_transaction_non_contextual};

/// Default orphan pool capacity; not pinned by spec.md, just bounded as it
/// asks (§4.4.1 step 2).
pub const DEFAULT_ORPHAN_CAPACITY: usize = 256;

/// Batches `encode_latest_segment_put` under `key` whenever `current` has
/// moved past the last segment this engine persisted (spec.md §4.2's
/// "persisted in the metadata store under a well-known key"), so a restart
/// resumes each arena's writer at the segment it actually rolled to rather
/// than always at 0.
fn record_segment_if_rolled(batch: &mut Batch, key: &'static [u8], tracked: &mut u32, current: u32) {
    if current != *tracked {
        *tracked = current;
        encode_latest_segment_put(batch, key, current);
    }
}

/// Owns the chain state: the persisted tip plus handles to the metadata
/// store and the two segmented byte arenas (§4.4's `(tip, utxo)` state
/// description; the UTXO half lives entirely in the metadata store).
pub struct ChainEngine {
    meta: MetaView<dyn MetadataStore>,
    blocks: Box<dyn ContiguousStorage>,
    reverts: Box<dyn ContiguousStorage>,
    tip: BlockMetadata,
    tip_hash: Hash,
    orphans: OrphanPool,
    last_block_segment: u32,
    last_revert_segment: u32,
}

impl ChainEngine {
    pub fn open(
        meta_store: Arc<dyn MetadataStore>,
        mut blocks: Box<dyn ContiguousStorage>,
        reverts: Box<dyn ContiguousStorage>,
    ) -> Result<Self> {
        let meta = MetaView::new(meta_store);
        let (tip, tip_hash) = match meta.get_chain_head()? {
            Some(head) => {
                let hash = hash_block_header(&head.header);
                (head, hash)
            }
            None => Self::bootstrap_genesis(&meta, blocks.as_mut())?,
        };
        let last_block_segment = blocks.latest_segment();
        let last_revert_segment = reverts.latest_segment();
        Ok(Self {
            meta,
            blocks,
            reverts,
            tip,
            tip_hash,
            orphans: OrphanPool::new(DEFAULT_ORPHAN_CAPACITY),
            last_block_segment,
            last_revert_segment,
        })
    }

    pub fn tip(&self) -> &BlockMetadata {
        &self.tip
    }

    pub fn tip_hash(&self) -> Hash {
        self.tip_hash
    }

    /// Looks up a block's metadata and decodes its stored bytes, for
    /// serving `GetData`/CLI `getBlock` reads. Returns `None` for a hash
    /// this node has never stored, regardless of main-chain membership.
    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        let Some(meta) = self.meta.get_block(hash)? else { return Ok(None) };
        let bytes = self.blocks.retrieve(meta.block_ptr)?;
        let mut r = Reader::new(&bytes);
        Ok(Some(decode_block(&mut r)?))
    }

    pub fn meta(&self) -> &MetaView<dyn MetadataStore> {
        &self.meta
    }

    /// Builds a sparse block locator from the current tip: the ten most
    /// recent hashes, then exponentially doubling steps back to genesis
    /// (spec.md §4.9's "sparse block locator").
    pub fn build_locator(&self) -> Result<Vec<Hash>> {
        let mut locator = Vec::new();
        let mut height = self.tip.height;
        let mut hash = self.tip_hash;
        let mut step: u64 = 1;
        loop {
            locator.push(hash);
            if height == 0 {
                break;
            }
            let back = step.min(height);
            let target_height = height - back;
            hash = self.ancestor_hash_at_height(hash, height, target_height)?;
            height = target_height;
            if locator.len() >= 10 {
                step = step.saturating_mul(2);
            }
        }
        Ok(locator)
    }

    /// Walks parent pointers from `(from_hash, from_height)` back to
    /// `target_height`.
    fn ancestor_hash_at_height(&self, from_hash: Hash, from_height: u64, target_height: u64) -> Result<Hash> {
        let mut hash = from_hash;
        let mut height = from_height;
        while height > target_height {
            let meta = self
                .meta
                .get_block(&hash)?
                .ok_or_else(|| ChainError::InvalidBlock("locator walk hit a missing ancestor".to_string()))?;
            hash = meta.header.parent;
            height -= 1;
        }
        Ok(hash)
    }

    fn bootstrap_genesis(
        meta: &MetaView<dyn MetadataStore>,
        blocks: &mut dyn ContiguousStorage,
    ) -> Result<(BlockMetadata, Hash)> {
        let genesis = genesis_block();
        let hash = hash_block_header(&genesis.header);
        let mut w = Writer::new();
        encode_block(&mut w, &genesis);
        let ptr = blocks.store(&w.into_bytes())?;
        blocks.sync()?;

        let total_work = work_for_target(bits_to_target(genesis.header.bits));
        let record = BlockMetadata {
            header: genesis.header,
            height: 0,
            tx_count: genesis.txs.len() as u32,
            status: BlockStatus::Connected,
            total_work,
            block_ptr: ptr,
            revert_ptr: Pointer::default(),
        };

        let mut batch = Batch::new();
        encode_block_put(&mut batch, &hash, &record);
        encode_chain_head_put(&mut batch, &record);
        encode_latest_segment_put(&mut batch, keys::BLOCKS_LATEST_SEGMENT_KEY, blocks.latest_segment());
        let coinbase = &genesis.txs[0];
        let coinbase_id = txid(coinbase);
        for (index, output) in coinbase.outputs.iter().enumerate() {
            let entry = UtxoEntry {
                txid: coinbase_id,
                index: index as u32,
                block_height: 0,
                version: coinbase.version,
                is_coinbase: true,
                output: output.clone(),
            };
            encode_utxo_put(&mut batch, &entry);
        }
        encode_tx_put(&mut batch, &thunderbolt_core::model::TxMetadata { txid: coinbase_id, block_ptr: ptr, position_in_block: 0 });
        meta.inner().write_batch(batch)?;
        Ok((record, hash))
    }

    /// Runs the acceptance pipeline of spec.md §4.4.1 against one block.
    pub fn accept(&mut self, block: Block) -> Result<()> {
        check_block_non_contextual(&block)?;
        let hash = hash_block_header(&block.header);
        if self.meta.get_block(&hash)?.is_some() {
            return Ok(());
        }

        let parent_hash = block.header.parent;
        let parent = match self.meta.get_block(&parent_hash)? {
            Some(p) => p,
            None => {
                self.orphans.insert(hash, block);
                return Err(ChainError::orphan(&parent_hash));
            }
        };
        if parent.status == BlockStatus::Invalid {
            return Err(ChainError::InvalidBlock("parent was previously marked invalid".into()));
        }

        let height = parent.height + 1;
        let expected_bits = self.expected_bits(&parent, height)?;
        if block.header.bits != expected_bits {
            return Err(ChainError::InvalidBlock(format!(
                "bad bits at height {height}: expected {expected_bits:#010x}, got {:#010x}",
                block.header.bits
            )));
        }

        let candidate_work = parent.total_work.saturating_add(work_for_target(bits_to_target(block.header.bits)));

        let mut w = Writer::new();
        encode_block(&mut w, &block);
        let ptr = self.blocks.store(&w.into_bytes())?;
        self.blocks.sync()?;

        let record = BlockMetadata {
            header: block.header,
            height,
            tx_count: block.txs.len() as u32,
            status: BlockStatus::Stored,
            total_work: candidate_work,
            block_ptr: ptr,
            revert_ptr: Pointer::default(),
        };

        let mut batch = Batch::new();
        encode_block_put(&mut batch, &hash, &record);
        record_segment_if_rolled(&mut batch, keys::BLOCKS_LATEST_SEGMENT_KEY, &mut self.last_block_segment, self.blocks.latest_segment());
        self.meta.inner().write_batch(batch)?;

        if candidate_work <= self.tip.total_work {
            tracing::debug!(height, ?candidate_work, "stored a side-branch block without reorganizing");
            self.try_connect_orphans(hash)?;
            return Ok(());
        }

        self.reorganize(hash, record)
    }

    fn expected_bits(&self, parent: &BlockMetadata, height: u64) -> Result<u32> {
        if height == 0 || height % RETARGET_INTERVAL != 0 {
            return Ok(parent.header.bits);
        }
        let first_height = height - RETARGET_INTERVAL + 1;
        let parent_hash = hash_block_header(&parent.header);
        let first = self.ancestor_at_height(parent_hash, first_height)?;
        let actual_timespan = parent.header.timestamp as i64 - first.header.timestamp as i64;
        Ok(retarget(parent.header.bits, actual_timespan))
    }

    fn ancestor_at_height(&self, from_hash: Hash, target_height: u64) -> Result<BlockMetadata> {
        let mut cur_hash = from_hash;
        let mut cur = self
            .meta
            .get_block(&cur_hash)?
            .ok_or_else(|| ChainError::InvalidBlock("missing ancestor while walking retarget window".into()))?;
        while cur.height > target_height {
            cur_hash = cur.header.parent;
            cur = self
                .meta
                .get_block(&cur_hash)?
                .ok_or_else(|| ChainError::InvalidBlock("missing ancestor while walking retarget window".into()))?;
        }
        Ok(cur)
    }

    fn lowest_common_ancestor(&self, a: Hash, b: Hash) -> Result<Hash> {
        let meta_a = self
            .meta
            .get_block(&a)?
            .ok_or_else(|| ChainError::InvalidBlock("missing block during reorg".into()))?;
        let meta_b = self
            .meta
            .get_block(&b)?
            .ok_or_else(|| ChainError::InvalidBlock("missing block during reorg".into()))?;
        let (mut x, mut y) = if meta_a.height >= meta_b.height {
            (hash_block_header(&self.ancestor_at_height(a, meta_b.height)?.header), b)
        } else {
            (a, hash_block_header(&self.ancestor_at_height(b, meta_a.height)?.header))
        };
        while x != y {
            x = self.meta.get_block(&x)?.ok_or_else(|| ChainError::InvalidBlock("missing ancestor".into()))?.header.parent;
            y = self.meta.get_block(&y)?.ok_or_else(|| ChainError::InvalidBlock("missing ancestor".into()))?.header.parent;
        }
        Ok(x)
    }

    /// `[from_hash, parent(from_hash), ..., child_of(stop_exclusive)]`.
    fn path_from_to(&self, from_hash: Hash, stop_exclusive: Hash) -> Result<Vec<Hash>> {
        let mut path = Vec::new();
        let mut cur = from_hash;
        while cur != stop_exclusive {
            path.push(cur);
            cur = self
                .meta
                .get_block(&cur)?
                .ok_or_else(|| ChainError::InvalidBlock("missing block while walking chain".into()))?
                .header
                .parent;
        }
        Ok(path)
    }

    fn reorganize(&mut self, new_hash: Hash, new_meta: BlockMetadata) -> Result<()> {
        let lca = self.lowest_common_ancestor(self.tip_hash, new_hash)?;
        let disconnect_path = self.path_from_to(self.tip_hash, lca)?;
        let mut connect_path = self.path_from_to(new_hash, lca)?;
        connect_path.reverse();

        if !disconnect_path.is_empty() {
            tracing::info!(
                disconnecting = disconnect_path.len(),
                connecting = connect_path.len(),
                new_height = new_meta.height,
                "reorganizing chain"
            );
        }

        for hash in &disconnect_path {
            self.disconnect_one(*hash)?;
        }

        let mut final_meta = new_meta;
        for (i, hash) in connect_path.iter().enumerate() {
            match self.connect_one(*hash) {
                Ok(connected) => {
                    if *hash == new_hash {
                        final_meta = connected;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reorg candidate failed to connect, rolling back");
                    self.mark_invalid(*hash)?;
                    self.rollback_failed_reorg(&connect_path[..i], &disconnect_path)?;
                    return Err(e);
                }
            }
        }

        let mut batch = Batch::new();
        encode_chain_head_put(&mut batch, &final_meta);
        self.meta.inner().write_batch(batch)?;
        self.tip = final_meta;
        self.tip_hash = new_hash;
        self.try_connect_orphans(new_hash)?;
        Ok(())
    }

    fn rollback_failed_reorg(&mut self, connected_so_far: &[Hash], original_disconnect_path: &[Hash]) -> Result<()> {
        for hash in connected_so_far.iter().rev() {
            self.disconnect_one(*hash)?;
        }
        let mut reconnect_order = original_disconnect_path.to_vec();
        reconnect_order.reverse();
        for hash in &reconnect_order {
            self.connect_one(*hash)?;
        }
        Ok(())
    }

    fn mark_invalid(&mut self, hash: Hash) -> Result<()> {
        let mut meta = self
            .meta
            .get_block(&hash)?
            .ok_or_else(|| ChainError::InvalidBlock("missing block to invalidate".into()))?;
        meta.status = BlockStatus::Invalid;
        let mut batch = Batch::new();
        encode_block_put(&mut batch, &hash, &meta);
        self.meta.inner().write_batch(batch)
    }

    /// Runs §4.4.2's contextual validation over one already-stored block
    /// and applies its UTXO mutation.
    fn connect_one(&mut self, hash: Hash) -> Result<BlockMetadata> {
        let mut meta = self
            .meta
            .get_block(&hash)?
            .ok_or_else(|| ChainError::InvalidBlock("missing block to connect".into()))?;
        let bytes = self.blocks.retrieve(meta.block_ptr)?;
        let mut r = Reader::new(&bytes);
        let block = decode_block(&mut r)?;

        let mut view = UtxoView::new(&self.meta);
        let mut total_fees: u64 = 0;

        for tx in block.txs.iter().skip(1) {
            check_transaction_non_contextual(tx)?;
            let tx_id = txid(tx);
            let mut input_sum: u64 = 0;
            for (input_idx, input) in tx.inputs.iter().enumerate() {
                let entry = view.spend(&input.ref_tx, input.index)?;
                if entry.is_coinbase && meta.height < entry.block_height + COINBASE_MATURITY {
                    return Err(ChainError::invalid_tx(&tx_id, "spends an immature coinbase output"));
                }
                let witness = tx
                    .witnesses
                    .get(input_idx)
                    .ok_or_else(|| ChainError::invalid_tx(&tx_id, "missing witness"))?;
                check_unlock(input, &entry.output, witness)
                    .map_err(|e| ChainError::invalid_tx(&tx_id, e.to_string()))?;
                input_sum = input_sum
                    .checked_add(entry.output.amount)
                    .ok_or_else(|| ChainError::invalid_tx(&tx_id, "input sum overflows"))?;
            }
            let output_sum: u64 = tx.outputs.iter().map(|o| o.amount).sum();
            if output_sum > input_sum {
                return Err(ChainError::invalid_tx(&tx_id, "outputs exceed inputs"));
            }
            total_fees += input_sum - output_sum;
            for (index, output) in tx.outputs.iter().enumerate() {
                view.create(UtxoEntry {
                    txid: tx_id,
                    index: index as u32,
                    block_height: meta.height,
                    version: tx.version,
                    is_coinbase: false,
                    output: output.clone(),
                });
            }
        }

        let coinbase = &block.txs[0];
        let coinbase_id = txid(coinbase);
        let claimed: u64 = coinbase.outputs.iter().map(|o| o.amount).sum();
        let allowed = subsidy(meta.height) + total_fees;
        if claimed > allowed {
            return Err(ChainError::CoinbaseOverpay { claimed, allowed });
        }
        for (index, output) in coinbase.outputs.iter().enumerate() {
            view.create(UtxoEntry {
                txid: coinbase_id,
                index: index as u32,
                block_height: meta.height,
                version: coinbase.version,
                is_coinbase: true,
                output: output.clone(),
            });
        }

        let (persisted_spent, created) = view.into_parts();
        let record = RevertRecord { consumed: persisted_spent.clone() };
        let mut rw = Writer::new();
        encode_revert_record(&mut rw, &record);
        let revert_ptr = self.reverts.store(&rw.into_bytes())?;
        self.reverts.sync()?;

        let mut batch = Batch::new();
        for entry in &persisted_spent {
            encode_utxo_delete(&mut batch, &entry.txid, entry.index);
        }
        for entry in &created {
            encode_utxo_put(&mut batch, entry);
        }
        meta.status = BlockStatus::Connected;
        meta.revert_ptr = revert_ptr;
        encode_block_put(&mut batch, &hash, &meta);
        record_segment_if_rolled(&mut batch, keys::REVERTS_LATEST_SEGMENT_KEY, &mut self.last_revert_segment, self.reverts.latest_segment());
        self.meta.inner().write_batch(batch)?;
        Ok(meta)
    }

    /// Reverses `connect_one`, applying the revert record in the order
    /// spec.md §4.4.3 describes: re-insert consumed entries, then remove
    /// entries the block added.
    fn disconnect_one(&mut self, hash: Hash) -> Result<()> {
        let mut meta = self
            .meta
            .get_block(&hash)?
            .ok_or_else(|| ChainError::InvalidBlock("missing block to disconnect".into()))?;
        let revert_bytes = self.reverts.retrieve(meta.revert_ptr)?;
        let mut rr = Reader::new(&revert_bytes);
        let record = decode_revert_record(&mut rr)?;

        let block_bytes = self.blocks.retrieve(meta.block_ptr)?;
        let mut br = Reader::new(&block_bytes);
        let block = decode_block(&mut br)?;

        let mut batch = Batch::new();
        for entry in &record.consumed {
            encode_utxo_put(&mut batch, entry);
        }
        for tx in &block.txs {
            let tx_id = txid(tx);
            for index in 0..tx.outputs.len() {
                encode_utxo_delete(&mut batch, &tx_id, index as u32);
            }
        }
        meta.status = BlockStatus::Stored;
        encode_block_put(&mut batch, &hash, &meta);
        self.meta.inner().write_batch(batch)
    }

    fn try_connect_orphans(&mut self, parent: Hash) -> Result<()> {
        for child in self.orphans.take_children_of(parent) {
            let _ = self.accept(child);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use thunderbolt_core::codec::merkle_root;
    use thunderbolt_core::model::{BlockHeader, LockType, Output, Transaction};
    use thunderbolt_storage::MemMetadataStore;
    use thunderbolt_storage::segment::FileSegmentStore;

    fn engine_on_tmpdir() -> (ChainEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(MemMetadataStore::new());
        let blocks: Box<dyn ContiguousStorage> = Box::new(
            FileSegmentStore::open(dir.path().join("blocks"), "block", thunderbolt_storage::BLOCK_RECORD_MAGIC, 0).unwrap(),
        );
        let reverts: Box<dyn ContiguousStorage> = Box::new(
            FileSegmentStore::open(dir.path().join("reverts"), "revert", thunderbolt_storage::REVERT_RECORD_MAGIC, 0).unwrap(),
        );
        let engine = ChainEngine::open(store, blocks, reverts).unwrap();
        (engine, dir)
    }

    fn coinbase_tx(reward: u64, salt: u8) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![thunderbolt_core::model::Outpoint { ref_tx: thunderbolt_core::ZERO_HASH, index: salt as u32 }],
            outputs: vec![Output { amount: reward, lock_type: LockType::Unspendable, lock_params: vec![salt] }],
            lock_time: 0,
            witnesses: vec![vec![]],
        }
    }

    fn mine_child(parent: &BlockMetadata, salt: u8) -> Block {
        let coinbase = coinbase_tx(subsidy(parent.height + 1), salt);
        let header = BlockHeader {
            version: 1,
            parent: hash_block_header(&parent.header),
            merkle_root: merkle_root(&[txid(&coinbase)]),
            timestamp: parent.header.timestamp + 120,
            bits: parent.header.bits,
            nonce: 0,
        };
        find_valid_nonce(header, vec![coinbase])
    }

    fn find_valid_nonce(mut header: BlockHeader, txs: Vec<Transaction>) -> Block {
        // Genesis bits (0x1dfffff8) are loose enough that nonce 0 almost
        // always satisfies the target in this test fixture; fall back to a
        // short search to stay robust regardless.
        for nonce in 0..10_000u32 {
            header.nonce = nonce;
            let hash = hash_block_header(&header);
            if thunderbolt_core::pow::hash_meets_target(&hash, header.bits) {
                return Block { header, txs };
            }
        }
        panic!("did not find a valid nonce within budget");
    }

    #[test]
    fn bootstrap_creates_a_connected_genesis_tip() {
        let (engine, _dir) = engine_on_tmpdir();
        assert_eq!(engine.tip().height, 0);
        assert_eq!(engine.tip().status, BlockStatus::Connected);
        assert_eq!(engine.tip_hash(), hash_block_header(&genesis_block().header));
    }

    #[test]
    fn accepting_a_child_of_tip_extends_the_chain() {
        let (mut engine, _dir) = engine_on_tmpdir();
        let genesis_meta = engine.tip().clone();
        let child = mine_child(&genesis_meta, 1);
        let child_hash = hash_block_header(&child.header);
        engine.accept(child).unwrap();
        assert_eq!(engine.tip_hash(), child_hash);
        assert_eq!(engine.tip().height, 1);
    }

    #[test]
    fn unknown_parent_is_reported_as_orphan() {
        let (mut engine, _dir) = engine_on_tmpdir();
        let dangling = BlockHeader {
            version: 1,
            parent: [0xAB; 32],
            merkle_root: [0u8; 32],
            timestamp: 0,
            bits: 0x1dfffff8,
            nonce: 0,
        };
        let block = Block { header: dangling, txs: vec![coinbase_tx(1, 9)] };
        let err = engine.accept(block).unwrap_err();
        assert!(matches!(err, ChainError::Orphan { .. }));
    }

    #[test]
    fn a_longer_competing_branch_reorgs_the_tip() {
        let (mut engine, _dir) = engine_on_tmpdir();
        let genesis_meta = engine.tip().clone();

        let a1 = mine_child(&genesis_meta, 1);
        let a1_hash = hash_block_header(&a1.header);
        engine.accept(a1).unwrap();
        let a1_meta = engine.meta().get_block(&a1_hash).unwrap().unwrap();
        let a2 = mine_child(&a1_meta, 2);
        engine.accept(a2).unwrap();
        assert_eq!(engine.tip().height, 2);

        let b1 = mine_child(&genesis_meta, 3);
        let b1_hash = hash_block_header(&b1.header);
        engine.accept(b1).unwrap();
        let b1_meta = engine.meta().get_block(&b1_hash).unwrap().unwrap();
        let b2 = mine_child(&b1_meta, 4);
        let b2_hash = hash_block_header(&b2.header);
        engine.accept(b2).unwrap();
        let b2_meta = engine.meta().get_block(&b2_hash).unwrap().unwrap();
        let b3 = mine_child(&b2_meta, 5);
        let b3_hash = hash_block_header(&b3.header);
        engine.accept(b3).unwrap();

        assert_eq!(engine.tip_hash(), b3_hash);
        assert_eq!(engine.tip().height, 3);
    }

    #[test]
    fn double_spend_within_a_block_is_rejected_and_tip_unchanged() {
        let (mut engine, _dir) = engine_on_tmpdir();
        let genesis_meta = engine.tip().clone();
        let tip_before = engine.tip_hash();

        let coinbase = coinbase_tx(subsidy(1), 1);
        let double_spend = Transaction {
            version: 1,
            inputs: vec![
                thunderbolt_core::model::Outpoint { ref_tx: [5u8; 32], index: 0 },
                thunderbolt_core::model::Outpoint { ref_tx: [5u8; 32], index: 0 },
            ],
            outputs: vec![Output { amount: 1, lock_type: LockType::Unspendable, lock_params: vec![] }],
            lock_time: 0,
            witnesses: vec![vec![], vec![]],
        };
        let txs = vec![coinbase, double_spend];
        let ids: Vec<Hash> = txs.iter().map(txid).collect();
        let header = BlockHeader {
            version: 1,
            parent: hash_block_header(&genesis_meta.header),
            merkle_root: merkle_root(&ids),
            timestamp: genesis_meta.header.timestamp + 120,
            bits: genesis_meta.header.bits,
            nonce: 0,
        };
        let block = find_valid_nonce(header, txs);
        assert!(engine.accept(block).is_err());
        assert_eq!(engine.tip_hash(), tip_before);
    }

    #[test]
    fn coinbase_output_is_spendable_only_after_the_maturity_window() {
        use crate::unlock::{encode_single_sig_witness, signed_digest, SingleSigWitness};
        use secp256k1::{rand, Message as SecpMessage, Secp256k1, SecretKey};
        use thunderbolt_core::crypto::ripemd160_sha256;
        use thunderbolt_core::model::Outpoint;

        let (mut engine, _dir) = engine_on_tmpdir();
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk, pk) = secp.generate_keypair(&mut rng);
        let hash160 = ripemd160_sha256(&pk.serialize()).to_vec();

        // Height 1: a coinbase with a real SingleSig output instead of the
        // other tests' Unspendable one, so it can later be spent.
        let genesis_meta = engine.tip().clone();
        let spendable_coinbase = Transaction {
            version: 1,
            inputs: vec![Outpoint { ref_tx: thunderbolt_core::ZERO_HASH, index: 1 }],
            outputs: vec![Output { amount: subsidy(1), lock_type: LockType::SingleSig, lock_params: hash160 }],
            lock_time: 0,
            witnesses: vec![vec![]],
        };
        let coinbase_txid = txid(&spendable_coinbase);
        let header1 = BlockHeader {
            version: 1,
            parent: hash_block_header(&genesis_meta.header),
            merkle_root: merkle_root(&[coinbase_txid]),
            timestamp: genesis_meta.header.timestamp + 120,
            bits: genesis_meta.header.bits,
            nonce: 0,
        };
        let block1 = find_valid_nonce(header1, vec![spendable_coinbase.clone()]);
        engine.accept(block1).unwrap();
        let mut parent_meta = engine.tip().clone();
        assert_eq!(parent_meta.height, 1);

        // Fill in plain blocks up to height 99; none of these touch the
        // height-1 coinbase.
        for salt in 2..100u8 {
            let child = mine_child(&parent_meta, salt);
            engine.accept(child).unwrap();
            parent_meta = engine.tip().clone();
        }
        assert_eq!(parent_meta.height, 99);

        let spend_input = Outpoint { ref_tx: coinbase_txid, index: 0 };
        let digest = signed_digest(&spend_input, &spendable_coinbase.outputs[0]);
        let msg = SecpMessage::from_digest_slice(&digest).unwrap();
        let sig = secp.sign_ecdsa(&msg, &SecretKey::from(sk));
        let witness = encode_single_sig_witness(&SingleSigWitness {
            public_key: pk.serialize().to_vec(),
            signature: sig.serialize_der().to_vec(),
        });

        let build_spend_block = |parent: &BlockMetadata, coinbase_salt: u8| -> Block {
            let coinbase = coinbase_tx(subsidy(parent.height + 1), coinbase_salt);
            let spend_tx = Transaction {
                version: 1,
                inputs: vec![spend_input],
                outputs: vec![Output { amount: subsidy(1) - 1, lock_type: LockType::Unspendable, lock_params: vec![] }],
                lock_time: 0,
                witnesses: vec![witness.clone()],
            };
            let txs = vec![coinbase, spend_tx];
            let ids: Vec<Hash> = txs.iter().map(txid).collect();
            let header = BlockHeader {
                version: 1,
                parent: hash_block_header(&parent.header),
                merkle_root: merkle_root(&ids),
                timestamp: parent.header.timestamp + 120,
                bits: parent.header.bits,
                nonce: 0,
            };
            find_valid_nonce(header, txs)
        };

        // entry.block_height (1) + COINBASE_MATURITY (100) == 101: a block at
        // height 100 still spends an immature output and must be rejected,
        // leaving the tip untouched.
        let early_spend = build_spend_block(&parent_meta, 100);
        let tip_before_early = engine.tip_hash();
        assert!(engine.accept(early_spend).is_err());
        assert_eq!(engine.tip_hash(), tip_before_early);
        assert_eq!(engine.tip().height, 99);

        let filler = mine_child(&parent_meta, 101);
        engine.accept(filler).unwrap();
        let parent_meta = engine.tip().clone();
        assert_eq!(parent_meta.height, 100);

        // One block later, at height 101, the same spend is mature and must
        // connect.
        let mature_spend = build_spend_block(&parent_meta, 102);
        let mature_hash = hash_block_header(&mature_spend.header);
        engine.accept(mature_spend).unwrap();
        assert_eq!(engine.tip_hash(), mature_hash);
        assert_eq!(engine.tip().height, 101);
    }
}
