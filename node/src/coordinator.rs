//! The node coordinator (spec.md §4.10): the sole owner of the chain
//! engine and the mempool, driving both from a single `tokio::select!`
//! loop over peer events, wallet-submitted commands, and housekeeping
//! timers. Per spec.md §5, every other task only reads; this loop is the
//! only writer.

use std::collections::HashSet;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use thunderbolt_chain::mempool::DEFAULT_MEMPOOL_MAX_BYTES;
use thunderbolt_chain::{ChainEngine, Mempool};
use thunderbolt_core::config::Config;
use thunderbolt_core::model::NetworkAddress;
use thunderbolt_core::{Block, Hash, Transaction};
use thunderbolt_network::params::{MAIN_NET_MAGIC, MAX_INVENTORY_ITEMS};
use thunderbolt_network::{
    AddressBook, Ibd, IbdOutcome, InventoryItem, InventoryKind, LocatorRequest, Message, PeerEvent, PeerId,
    PeerManager, TimestampedAddress,
};
use thunderbolt_storage::{ContiguousStorage, DataDir, MetadataStore, RocksMetadataStore};
use thunderbolt_wallet::Wallet;

use crate::command::NodeCommand;
use crate::error::{NodeError, Result};
use crate::handle::NodeHandle;

/// How often the coordinator checks whether IBD should start; not pinned
/// by spec.md, just often enough to notice a tall peer promptly.
const IBD_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// Addresses offered per `GetAddress` reply; not pinned by spec.md.
const ADDRESS_GOSSIP_COUNT: usize = 100;

/// Owns the chain engine, mempool, and peer manager handle; runs the
/// single coordinator loop spec.md §4.10 describes.
pub struct Node {
    config: Config,
    engine: ChainEngine,
    mempool: Mempool,
    peers: Arc<PeerManager<RocksMetadataStore>>,
    peer_events: mpsc::Receiver<PeerEvent>,
    commands: mpsc::Receiver<NodeCommand>,
    ibd: Ibd,
    ibd_peer: Option<PeerId>,
    wallet: Arc<Mutex<Option<Wallet>>>,
    mempool_count: Arc<AtomicUsize>,
}

impl Node {
    /// Opens the data directory, bootstraps the chain engine and address
    /// book atop it, and returns the coordinator together with a
    /// [`NodeHandle`] the RPC surface can clone freely.
    pub fn open(config: Config) -> Result<(Node, NodeHandle)> {
        std::fs::create_dir_all(&config.datadir)?;
        let data = DataDir::open(&config.datadir)?;

        let meta_store: Arc<dyn MetadataStore> = data.meta.clone();
        let blocks: Box<dyn ContiguousStorage> = Box::new(data.blocks);
        let reverts: Box<dyn ContiguousStorage> = Box::new(data.reverts);
        let engine = ChainEngine::open(meta_store, blocks, reverts)?;

        let book = AddressBook::new(data.meta.clone());
        let seeds = resolve_seeds(&config.seed_nodes);
        let (peers, peer_events) = PeerManager::new(book, MAIN_NET_MAGIC, seeds);
        peers.set_our_height(engine.tip().height);

        let wallet_path = config.datadir.join("wallet.dat");
        let wallet = if wallet_path.exists() { Some(Wallet::open(&wallet_path)?) } else { None };
        let wallet = Arc::new(Mutex::new(wallet));

        let (commands_tx, commands_rx) = mpsc::channel(256);
        let mempool_count = Arc::new(AtomicUsize::new(0));

        let handle = NodeHandle {
            meta: engine.meta().clone(),
            peers: Arc::clone(&peers),
            wallet: Arc::clone(&wallet),
            wallet_path,
            commands: commands_tx,
            mempool_count: Arc::clone(&mempool_count),
            started_at: Instant::now(),
        };

        let node = Node {
            config,
            engine,
            mempool: Mempool::new(DEFAULT_MEMPOOL_MAX_BYTES),
            peers,
            peer_events,
            commands: commands_rx,
            ibd: Ibd::new(),
            ibd_peer: None,
            wallet,
            mempool_count,
        };
        Ok((node, handle))
    }

    /// Runs forever: accepts and dials peers, serves their requests,
    /// drives IBD to completion, and admits wallet-submitted transactions.
    /// Returns once `Ctrl-C` is received or the peer event channel closes.
    pub async fn run(mut self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.listen_port)).await?;
        tracing::info!(port = self.config.listen_port, "listening for inbound peers");

        if let Err(err) = self.peers.bootstrap().await {
            tracing::warn!(%err, "failed to reach the minimum peer count during bootstrap");
            return Err(NodeError::InsufficientPeers);
        }

        let manager = Arc::clone(&self.peers);
        let manager_task = tokio::spawn(manager.run(listener));

        let mut ibd_timer = tokio::time::interval(IBD_CHECK_INTERVAL);
        loop {
            tokio::select! {
                event = self.peer_events.recv() => {
                    match event {
                        Some(event) => self.handle_peer_event(event),
                        None => break,
                    }
                }
                cmd = self.commands.recv() => {
                    if let Some(cmd) = cmd {
                        self.handle_command(cmd);
                    }
                }
                _ = ibd_timer.tick() => {
                    self.maybe_start_ibd();
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }
        manager_task.abort();
        Ok(())
    }

    fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connected { id, addr, direction } => {
                tracing::info!(peer = id.0, ?direction, "peer connected");
                if let Err(err) = self.peers.book().observe(addr) {
                    tracing::warn!(%err, "failed to record peer address");
                }
            }
            PeerEvent::Disconnected { id } => {
                tracing::info!(peer = id.0, "peer disconnected");
                self.ibd.abort_if_peer(id);
            }
            PeerEvent::Message { id, message } => self.handle_message(id, message),
        }
    }

    fn handle_message(&mut self, from: PeerId, message: Message) {
        match message {
            Message::Version(_) | Message::Verack | Message::Ping(_) | Message::Pong(_) => {
                // Peer already resolves handshake/liveness traffic before forwarding.
            }
            Message::Address(entries) => {
                for entry in entries {
                    if let Err(err) = self.peers.book().observe(entry.addr) {
                        tracing::warn!(%err, "failed to record gossiped address");
                    }
                }
            }
            Message::GetAddress => {
                let sample = self.peers.book().sample(ADDRESS_GOSSIP_COUNT);
                match sample {
                    Ok(addrs) => {
                        let now = unix_now();
                        let entries =
                            addrs.into_iter().map(|addr| TimestampedAddress { timestamp: now, addr }).collect();
                        self.peers.send(from, Message::Address(entries));
                    }
                    Err(err) => tracing::warn!(%err, "failed to sample address book"),
                }
            }
            Message::GetBlocks(req) => match self.locator_hashes(&req) {
                Ok(hashes) => {
                    let items = hashes.into_iter().map(|hash| InventoryItem { kind: InventoryKind::Block, hash }).collect();
                    self.peers.send(from, Message::Inventory { nonce: req.nonce, items });
                }
                Err(err) => tracing::warn!(%err, "failed to build inventory for a getblocks request"),
            },
            Message::GetHeaders(req) => match self.locator_hashes(&req) {
                Ok(hashes) => {
                    let mut headers = Vec::with_capacity(hashes.len());
                    for hash in hashes {
                        if let Ok(Some(meta)) = self.engine.meta().get_block(&hash) {
                            headers.push(meta.header);
                        }
                    }
                    self.peers.send(from, Message::Headers(headers));
                }
                Err(err) => tracing::warn!(%err, "failed to build headers for a getheaders request"),
            },
            Message::Inventory { items, .. } => {
                let outcome = self.ibd.on_inventory(from, items);
                self.apply_ibd_outcome(outcome);
            }
            Message::GetData(items) => self.serve_get_data(from, items),
            Message::Block(block) => {
                let hash = thunderbolt_core::codec::hash_block_header(&block.header);
                let outcome = self.ibd.on_block(from, *block, hash);
                self.apply_ibd_outcome(outcome);
            }
            Message::Headers(_) => {
                tracing::debug!(peer = from.0, "received unsolicited headers; header-based sync is not used");
            }
            Message::Transaction(tx) => {
                if let Err(err) = self.admit_and_relay(*tx, Some(from)) {
                    tracing::debug!(peer = from.0, %err, "rejected a relayed transaction");
                }
            }
            Message::NotFound(_) => {
                tracing::debug!(peer = from.0, "peer reported missing inventory");
                self.ibd.abort_if_peer(from);
            }
        }
    }

    fn serve_get_data(&mut self, from: PeerId, items: Vec<InventoryItem>) {
        let mut not_found = Vec::new();
        for item in items {
            match item.kind {
                InventoryKind::Block => match self.engine.get_block(&item.hash) {
                    Ok(Some(block)) => self.peers.send(from, Message::Block(Box::new(block))),
                    Ok(None) => not_found.push(item),
                    Err(err) => {
                        tracing::warn!(%err, "failed to load a requested block");
                        not_found.push(item);
                    }
                },
                InventoryKind::Transaction => match self.mempool.get(&item.hash) {
                    Some(tx) => self.peers.send(from, Message::Transaction(Box::new(tx.clone()))),
                    None => not_found.push(item),
                },
            }
        }
        if !not_found.is_empty() {
            self.peers.send(from, Message::NotFound(not_found));
        }
    }

    /// Walks parent pointers back from the tip until hitting a hash the
    /// requester already has (per `req.locator`) or `req.stop_hash`,
    /// returning the gap in forward order, capped at
    /// [`MAX_INVENTORY_ITEMS`].
    fn locator_hashes(&self, req: &LocatorRequest) -> Result<Vec<Hash>> {
        let known: HashSet<Hash> = req.locator.iter().copied().collect();
        let mut collected = Vec::new();
        let mut cursor = self.engine.tip_hash();
        loop {
            if known.contains(&cursor) || cursor == req.stop_hash {
                break;
            }
            let Some(meta) = self.engine.meta().get_block(&cursor)? else { break };
            collected.push(cursor);
            if meta.height == 0 || collected.len() >= MAX_INVENTORY_ITEMS {
                break;
            }
            cursor = meta.header.parent;
        }
        collected.reverse();
        Ok(collected)
    }

    fn apply_ibd_outcome(&mut self, outcome: IbdOutcome) {
        match outcome {
            IbdOutcome::Continue => {}
            IbdOutcome::Send(peer, msg) => {
                self.ibd_peer = Some(peer);
                self.peers.send(peer, msg);
            }
            IbdOutcome::ReadyToConnect(blocks) => self.connect_ibd_batch(blocks),
            IbdOutcome::GaveUp => tracing::warn!("initial block download gave up after repeated failures"),
        }
    }

    fn connect_ibd_batch(&mut self, blocks: Vec<Block>) {
        let mut failed = false;
        for block in blocks {
            if let Err(err) = self.accept_block(block) {
                tracing::warn!(%err, "failed to connect a downloaded block; discarding the rest of the batch");
                failed = true;
                break;
            }
        }
        if failed {
            if let Some(peer) = self.ibd_peer.take() {
                self.peers.force_disconnect(peer);
            }
        } else {
            self.ibd_peer = None;
        }
        if self.ibd.finish_batch(!failed) {
            tracing::warn!("initial block download gave up after repeated failures");
        }
    }

    fn maybe_start_ibd(&mut self) {
        if self.ibd.is_active() {
            return;
        }
        let heights = self.peers.peer_heights();
        let best = heights.iter().map(|(_, h)| *h).max().unwrap_or(0);
        if !Ibd::needs_sync(self.engine.tip().height, best) {
            return;
        }
        let locator = match self.engine.build_locator() {
            Ok(locator) => locator,
            Err(err) => {
                tracing::warn!(%err, "failed to build a block locator");
                return;
            }
        };
        let outcome = self.ibd.start(&heights, locator, thunderbolt_core::ZERO_HASH, rand::random());
        self.apply_ibd_outcome(outcome);
    }

    fn accept_block(&mut self, block: Block) -> Result<()> {
        let before = self.engine.tip_hash();
        self.engine.accept(block)?;
        let after = self.engine.tip_hash();
        if after != before {
            self.on_new_tip(after);
        }
        Ok(())
    }

    fn on_new_tip(&mut self, new_tip: Hash) {
        self.peers.set_our_height(self.engine.tip().height);
        if let Ok(Some(block)) = self.engine.get_block(&new_tip) {
            self.mempool.remove_conflicts(&block.txs);
            self.mempool_count.store(self.mempool.len(), Ordering::Relaxed);
        }
        self.peers.broadcast(Message::Inventory { nonce: 0, items: vec![InventoryItem { kind: InventoryKind::Block, hash: new_tip }] }, None);
    }

    fn handle_command(&mut self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::SubmitTransaction(tx, reply) => {
                let result = self.admit_and_relay(tx, None);
                let _ = reply.send(result);
            }
        }
    }

    fn admit_and_relay(&mut self, tx: Transaction, from: Option<PeerId>) -> Result<Hash> {
        let id = self.mempool.admit(tx.clone(), self.engine.meta(), self.engine.tip().height)?;
        self.mempool_count.store(self.mempool.len(), Ordering::Relaxed);
        self.peers.broadcast(Message::Transaction(Box::new(tx)), from);
        Ok(id)
    }
}

/// Resolves each `host:port` seed entry via blocking DNS at startup;
/// unparseable or unresolvable entries are skipped rather than failing
/// the whole bootstrap.
fn resolve_seeds(raw: &[String]) -> Vec<NetworkAddress> {
    raw.iter()
        .filter_map(|entry| entry.to_socket_addrs().ok()?.next())
        .map(|addr| NetworkAddress::from_socket_addr(addr, 0))
        .collect()
}

fn unix_now() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}
