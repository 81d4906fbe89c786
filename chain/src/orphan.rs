//! Bounded FIFO pool for blocks whose parent hasn't arrived yet
//! (spec.md §4.4.1 step 2: "hold the block in a bounded orphan pool, drop
//! oldest").

use std::collections::{HashMap, VecDeque};

use thunderbolt_core::{Block, Hash};

pub struct OrphanPool {
    capacity: usize,
    order: VecDeque<Hash>,
    blocks: HashMap<Hash, Block>,
}

impl OrphanPool {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), blocks: HashMap::new() }
    }

    pub fn insert(&mut self, hash: Hash, block: Block) {
        if self.blocks.contains_key(&hash) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.blocks.remove(&oldest);
            }
        }
        self.order.push_back(hash);
        self.blocks.insert(hash, block);
    }

    /// Removes and returns every orphan whose declared parent is `parent`,
    /// so the caller can retry accepting them now that it exists.
    pub fn take_children_of(&mut self, parent: Hash) -> Vec<Block> {
        let matching: Vec<Hash> =
            self.blocks.iter().filter(|(_, b)| b.header.parent == parent).map(|(h, _)| *h).collect();
        let mut out = Vec::with_capacity(matching.len());
        for hash in matching {
            if let Some(block) = self.blocks.remove(&hash) {
                self.order.retain(|h| h != &hash);
                out.push(block);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_core::model::BlockHeader;

    fn block_with_parent(parent: Hash) -> Block {
        Block {
            header: BlockHeader { version: 1, parent, merkle_root: [0u8; 32], timestamp: 0, bits: 0, nonce: 0 },
            txs: vec![],
        }
    }

    #[test]
    fn drops_oldest_once_over_capacity() {
        let mut pool = OrphanPool::new(2);
        pool.insert([1u8; 32], block_with_parent([0u8; 32]));
        pool.insert([2u8; 32], block_with_parent([0u8; 32]));
        pool.insert([3u8; 32], block_with_parent([0u8; 32]));
        assert_eq!(pool.len(), 2);
        assert!(pool.take_children_of([0u8; 32]).iter().count() == 2);
    }

    #[test]
    fn take_children_of_only_removes_matching_parent() {
        let mut pool = OrphanPool::new(10);
        pool.insert([1u8; 32], block_with_parent([9u8; 32]));
        pool.insert([2u8; 32], block_with_parent([8u8; 32]));
        let children = pool.take_children_of([9u8; 32]);
        assert_eq!(children.len(), 1);
        assert_eq!(pool.len(), 1);
    }
}
