//! Initial block download (spec.md §4.9): pick a syncing peer, request
//! its inventory beyond our locator, fetch the blocks, and hand them to
//! the chain engine in order.
//!
//! Pure state machine — [`crate::manager::PeerManager`] supplies peer
//! heights and delivers the outbound [`Message`]s this module produces.

use std::collections::HashSet;

use thunderbolt_core::{Block, Hash};

use crate::params::SYNC_ATTEMPTS;
use crate::peer::PeerId;
use crate::wire::{InventoryItem, InventoryKind, LocatorRequest, Message};

#[derive(Debug)]
enum Phase {
    Idle,
    AwaitingInventory { peer: PeerId },
    Downloading { peer: PeerId, expected: HashSet<Hash>, staged: Vec<Block> },
}

/// What the coordinator should do after feeding the state machine one
/// event.
pub enum IbdOutcome {
    /// Nothing to do yet.
    Continue,
    /// Send this message to the peer the outcome names.
    Send(PeerId, Message),
    /// The whole batch arrived in order; connect it to the chain and then
    /// call [`Ibd::finish_batch`] with the result.
    ReadyToConnect(Vec<Block>),
    /// IBD gave up after `SYNC_ATTEMPTS` consecutive failures to make
    /// progress (spec.md §4.9 step 7).
    GaveUp,
}

pub struct Ibd {
    phase: Phase,
    attempts_remaining: u32,
}

impl Default for Ibd {
    fn default() -> Self {
        Self::new()
    }
}

impl Ibd {
    pub fn new() -> Self {
        Self { phase: Phase::Idle, attempts_remaining: SYNC_ATTEMPTS }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// True once the gap between our height and the best peer height
    /// warrants entering IBD (spec.md §4.9's entry condition).
    pub fn needs_sync(our_height: u64, best_peer_height: u64) -> bool {
        best_peer_height.saturating_sub(our_height) > crate::params::IBD_HEIGHT_THRESHOLD
    }

    /// Picks the peer reporting the greatest known height and issues a
    /// `GetBlocks` built from `locator`. Returns `GaveUp` once selection
    /// has failed `SYNC_ATTEMPTS` times in a row.
    pub fn start(&mut self, peer_heights: &[(PeerId, u64)], locator: Vec<Hash>, stop_hash: Hash, nonce: u64) -> IbdOutcome {
        if self.is_active() {
            return IbdOutcome::Continue;
        }
        match peer_heights.iter().max_by_key(|(_, height)| *height) {
            Some((peer, _)) => {
                self.phase = Phase::AwaitingInventory { peer: *peer };
                let request = LocatorRequest { version: crate::params::PROTOCOL_VERSION, locator, stop_hash, nonce };
                IbdOutcome::Send(*peer, Message::GetBlocks(request))
            }
            None => {
                if self.report_failure() {
                    IbdOutcome::GaveUp
                } else {
                    IbdOutcome::Continue
                }
            }
        }
    }

    /// Feeds an `Inventory` reply. Only the peer currently being synced
    /// from is honored (spec.md §4.9: ignore stray replies).
    pub fn on_inventory(&mut self, from: PeerId, items: Vec<InventoryItem>) -> IbdOutcome {
        match &self.phase {
            Phase::AwaitingInventory { peer } if *peer == from => {
                let blocks: Vec<InventoryItem> = items.into_iter().filter(|i| i.kind == InventoryKind::Block).collect();
                if blocks.is_empty() {
                    self.phase = Phase::Idle;
                    self.attempts_remaining = SYNC_ATTEMPTS;
                    return IbdOutcome::Continue;
                }
                let expected: HashSet<Hash> = blocks.iter().map(|i| i.hash).collect();
                self.phase = Phase::Downloading { peer: from, expected, staged: Vec::new() };
                IbdOutcome::Send(from, Message::GetData(blocks))
            }
            _ => IbdOutcome::Continue,
        }
    }

    /// Feeds one `Block` reply. Once every expected hash of the current
    /// batch has arrived, returns the staged blocks for the coordinator
    /// to connect, in arrival order.
    pub fn on_block(&mut self, from: PeerId, block: Block, hash: Hash) -> IbdOutcome {
        let ready = match &mut self.phase {
            Phase::Downloading { peer, expected, staged } if *peer == from && expected.remove(&hash) => {
                staged.push(block);
                expected.is_empty()
            }
            _ => return IbdOutcome::Continue,
        };
        if ready {
            let Phase::Downloading { staged, .. } = std::mem::replace(&mut self.phase, Phase::Idle) else {
                unreachable!()
            };
            IbdOutcome::ReadyToConnect(staged)
        } else {
            IbdOutcome::Continue
        }
    }

    /// Called by the coordinator after attempting to connect a batch
    /// returned by [`IbdOutcome::ReadyToConnect`]. On success the attempt
    /// counter resets; on failure the whole batch is discarded and this
    /// counts as one of the `SYNC_ATTEMPTS` consecutive failures.
    pub fn finish_batch(&mut self, succeeded: bool) -> bool {
        self.phase = Phase::Idle;
        if succeeded {
            self.attempts_remaining = SYNC_ATTEMPTS;
            false
        } else {
            self.report_failure()
        }
    }

    /// Drops the in-flight sync state; used when the syncing peer
    /// disconnects mid-download.
    pub fn abort_if_peer(&mut self, id: PeerId) {
        let matches = match &self.phase {
            Phase::AwaitingInventory { peer } => *peer == id,
            Phase::Downloading { peer, .. } => *peer == id,
            Phase::Idle => false,
        };
        if matches {
            self.phase = Phase::Idle;
        }
    }

    fn report_failure(&mut self) -> bool {
        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
        self.attempts_remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u64) -> PeerId {
        PeerId(n)
    }

    #[test]
    fn needs_sync_only_past_the_height_threshold() {
        assert!(!Ibd::needs_sync(100, 150));
        assert!(Ibd::needs_sync(100, 100 + crate::params::IBD_HEIGHT_THRESHOLD + 1));
    }

    #[test]
    fn start_selects_the_tallest_peer() {
        let mut ibd = Ibd::new();
        let heights = vec![(peer(1), 10), (peer(2), 500), (peer(3), 200)];
        match ibd.start(&heights, vec![[0u8; 32]], [1u8; 32], 7) {
            IbdOutcome::Send(p, Message::GetBlocks(_)) => assert_eq!(p, peer(2)),
            _ => panic!("expected a GetBlocks sent to the tallest peer"),
        }
    }

    #[test]
    fn start_with_no_peers_counts_toward_giving_up() {
        let mut ibd = Ibd::new();
        for _ in 0..SYNC_ATTEMPTS - 1 {
            assert!(matches!(ibd.start(&[], vec![], [0u8; 32], 0), IbdOutcome::Continue));
        }
        assert!(matches!(ibd.start(&[], vec![], [0u8; 32], 0), IbdOutcome::GaveUp));
    }

    #[test]
    fn full_round_trip_stages_blocks_in_arrival_order() {
        let mut ibd = Ibd::new();
        let heights = vec![(peer(1), 500)];
        let _ = ibd.start(&heights, vec![[0u8; 32]], [1u8; 32], 7);

        let h1 = [1u8; 32];
        let h2 = [2u8; 32];
        let items = vec![
            InventoryItem { kind: InventoryKind::Block, hash: h1 },
            InventoryItem { kind: InventoryKind::Block, hash: h2 },
        ];
        match ibd.on_inventory(peer(1), items) {
            IbdOutcome::Send(p, Message::GetData(items)) => {
                assert_eq!(p, peer(1));
                assert_eq!(items.len(), 2);
            }
            _ => panic!("expected GetData"),
        }

        let block1 = sample_block();
        let block2 = sample_block();
        assert!(matches!(ibd.on_block(peer(1), block1.clone(), h1), IbdOutcome::Continue));
        match ibd.on_block(peer(1), block2, h2) {
            IbdOutcome::ReadyToConnect(blocks) => assert_eq!(blocks.len(), 2),
            _ => panic!("expected the batch to complete"),
        }
    }

    fn sample_block() -> Block {
        use thunderbolt_core::model::{BlockHeader, Transaction};
        Block {
            header: BlockHeader { version: 1, parent: [0u8; 32], merkle_root: [0u8; 32], timestamp: 0, bits: 0, nonce: 0 },
            txs: vec![Transaction { version: 1, inputs: vec![], outputs: vec![], lock_time: 0, witnesses: vec![] }],
        }
    }

    #[test]
    fn abort_if_peer_resets_only_the_syncing_peer() {
        let mut ibd = Ibd::new();
        let heights = vec![(peer(9), 500)];
        let _ = ibd.start(&heights, vec![[0u8; 32]], [1u8; 32], 7);
        assert!(ibd.is_active());
        ibd.abort_if_peer(peer(1));
        assert!(ibd.is_active());
        ibd.abort_if_peer(peer(9));
        assert!(!ibd.is_active());
    }
}
