//! The peer manager: bootstrap, accept/dial loops, and per-connection
//! read/write tasks (spec.md §4.8).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use thunderbolt_core::model::NetworkAddress;
use thunderbolt_storage::MetadataStore;

use crate::addressbook::AddressBook;
use crate::error::ProtocolError;
use crate::framing::{read_message, write_message};
use crate::params::{dial_candidate_budget, CONNECT_TIMEOUT, MAX_PEERS};
use crate::peer::{Direction, Peer, PeerAction, PeerId, PeerState};
use crate::wire::Message;

/// What the manager reports up to the coordinator. Handshake and liveness
/// traffic never surfaces here — [`Peer`] resolves it internally.
#[derive(Debug)]
pub enum PeerEvent {
    Connected { id: PeerId, addr: NetworkAddress, direction: Direction },
    Message { id: PeerId, message: Message },
    Disconnected { id: PeerId },
}

struct PeerHandle {
    addr: NetworkAddress,
    outbound: mpsc::Sender<Message>,
    remote_height: AtomicU64,
    abort: tokio::task::AbortHandle,
}

/// Owns every live connection and the address book that feeds the dial
/// loop. Always used behind an `Arc` so connection tasks can hold a
/// handle back to it.
pub struct PeerManager<S: MetadataStore + ?Sized + 'static> {
    book: AddressBook<S>,
    magic: u32,
    seeds: Vec<NetworkAddress>,
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
    our_height: AtomicU64,
    events_tx: mpsc::Sender<PeerEvent>,
}

impl<S: MetadataStore + ?Sized + 'static> PeerManager<S> {
    pub fn new(book: AddressBook<S>, magic: u32, seeds: Vec<NetworkAddress>) -> (Arc<Self>, mpsc::Receiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(1024);
        let manager = Arc::new(Self {
            book,
            magic,
            seeds,
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            our_height: AtomicU64::new(0),
            events_tx,
        });
        (manager, events_rx)
    }

    pub fn set_our_height(&self, height: u64) {
        self.our_height.store(height, Ordering::Relaxed);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// The address book backing this manager's bootstrap/dial/ban
    /// bookkeeping (spec.md §4.8: "owned by the peer manager").
    pub fn book(&self) -> &AddressBook<S> {
        &self.book
    }

    /// Aborts a peer's connection task outright, closing its socket
    /// immediately instead of waiting for it to notice a ban score or I/O
    /// error on its own (spec.md §4.9 step 5: "discard the whole staging
    /// batch and drop the peer").
    pub fn force_disconnect(&self, id: PeerId) {
        if let Some(handle) = self.peers.lock().unwrap().remove(&id) {
            handle.abort.abort();
        }
    }

    /// Known chain heights of every active peer, as reported by its
    /// `Version` handshake (spec.md §4.9: "select the peer that reports
    /// the greatest known height").
    pub fn peer_heights(&self) -> Vec<(PeerId, u64)> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, h)| (*id, h.remote_height.load(Ordering::Relaxed)))
            .collect()
    }

    fn set_remote_height(&self, id: PeerId, height: u64) {
        if let Some(handle) = self.peers.lock().unwrap().get(&id) {
            handle.remote_height.store(height, Ordering::Relaxed);
        }
    }

    /// Enqueues `msg` for delivery to `id`; silently dropped if the peer
    /// has already disconnected.
    pub fn send(&self, id: PeerId, msg: Message) {
        let sender = self.peers.lock().unwrap().get(&id).map(|h| h.outbound.clone());
        if let Some(sender) = sender {
            let _ = sender.try_send(msg);
        }
    }

    pub fn broadcast(&self, msg: Message, exclude: Option<PeerId>) {
        let targets: Vec<mpsc::Sender<Message>> = self
            .peers
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, h)| h.outbound.clone())
            .collect();
        for sender in targets {
            let _ = sender.try_send(msg.clone());
        }
    }

    /// Dials address-book candidates, falling back to compiled-in seeds,
    /// until at least `MIN_INITIAL_PEERS` handshakes start (spec.md §4.8's
    /// startup bootstrap).
    pub async fn bootstrap(self: &Arc<Self>) -> Result<usize, ProtocolError> {
        let mut candidates = self.book.sample(dial_candidate_budget(MAX_PEERS)).unwrap_or_default();
        if candidates.is_empty() {
            candidates = self.seeds.clone();
        }
        let mut connected = 0;
        for addr in candidates {
            if self.dial(addr).await.is_ok() {
                connected += 1;
            }
        }
        if connected < crate::params::MIN_INITIAL_PEERS {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(connected)
    }

    /// Runs the accept loop plus the periodic dial and address-book
    /// housekeeping timers, forever.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let mut dial_timer = tokio::time::interval(crate::params::NEW_PEERS_INTERVAL);
        let mut clean_timer = tokio::time::interval(crate::params::CLEAN_INTERVAL);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    if let Ok((stream, socket_addr)) = accepted {
                        self.handle_inbound(stream, socket_addr).await;
                    }
                }
                _ = dial_timer.tick() => {
                    self.dial_more().await;
                }
                _ = clean_timer.tick() => {
                    if let Err(err) = self.book.clean_up() {
                        tracing::warn!(%err, "address book clean-up failed");
                    }
                }
            }
        }
    }

    async fn dial_more(self: &Arc<Self>) {
        let have = self.peer_count();
        if have >= MAX_PEERS {
            return;
        }
        let want = dial_candidate_budget(MAX_PEERS - have).min(dial_candidate_budget(MAX_PEERS));
        let candidates = self.book.sample(want).unwrap_or_default();
        for addr in candidates {
            if self.peer_count() >= MAX_PEERS {
                break;
            }
            let _ = self.dial(addr).await;
        }
    }

    async fn dial(self: &Arc<Self>, addr: NetworkAddress) -> Result<PeerId, ProtocolError> {
        if self.book.is_banned(&addr).unwrap_or(false) {
            return Err(ProtocolError::ConnectionClosed);
        }
        let socket_addr = addr.to_socket_addr();
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))??;
        let id = self.next_peer_id();
        self.spawn_connection(stream, addr, Direction::Outbound, id);
        Ok(id)
    }

    async fn handle_inbound(self: &Arc<Self>, stream: TcpStream, socket_addr: SocketAddr) {
        let addr = NetworkAddress::from_socket_addr(socket_addr, 0);
        if self.book.is_banned(&addr).unwrap_or(false) {
            return;
        }
        if self.peer_count() >= MAX_PEERS {
            return;
        }
        let id = self.next_peer_id();
        self.spawn_connection(stream, addr, Direction::Inbound, id);
    }

    fn next_peer_id(&self) -> PeerId {
        PeerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn spawn_connection(self: &Arc<Self>, stream: TcpStream, addr: NetworkAddress, direction: Direction, id: PeerId) {
        let manager = Arc::clone(self);
        let (abort_tx, abort_rx) = tokio::sync::oneshot::channel();
        let join = tokio::spawn(async move {
            manager.run_connection(stream, addr, direction, id, abort_rx).await;
        });
        // The task always awaits `abort_rx` before touching shared state, so
        // it is never observed before this send lands.
        let _ = abort_tx.send(join.abort_handle());
    }

    async fn run_connection(
        self: Arc<Self>,
        stream: TcpStream,
        addr: NetworkAddress,
        direction: Direction,
        id: PeerId,
        own_abort: tokio::sync::oneshot::Receiver<tokio::task::AbortHandle>,
    ) {
        let (reader, writer) = tokio::io::split(stream);
        let (out_tx, out_rx) = mpsc::channel::<Message>(64);
        let abort = match own_abort.await {
            Ok(handle) => handle,
            Err(_) => return,
        };
        self.peers.lock().unwrap().insert(
            id,
            PeerHandle { addr, outbound: out_tx.clone(), remote_height: AtomicU64::new(0), abort },
        );

        let magic = self.magic;
        let writer_task = tokio::spawn(write_loop(writer, magic, out_rx));

        let our_height = self.our_height.load(Ordering::Relaxed);
        let mut peer = match direction {
            Direction::Outbound => {
                let (peer, version_msg, _nonce) = Peer::outbound(id, addr, our_height);
                let _ = out_tx.send(version_msg).await;
                peer
            }
            Direction::Inbound => Peer::inbound(id, addr),
        };

        let _ = self.events_tx.send(PeerEvent::Connected { id, addr, direction }).await;

        if let Err(err) = self.read_loop(reader, &mut peer, &out_tx).await {
            tracing::debug!(peer = id.0, %err, "peer connection closed");
        }

        if peer.state == PeerState::Draining {
            if let Err(err) = self.book.ban(&addr) {
                tracing::warn!(%err, "failed to persist ban");
            }
        }
        self.peers.lock().unwrap().remove(&id);
        drop(out_tx);
        writer_task.abort();
        let _ = self.events_tx.send(PeerEvent::Disconnected { id }).await;
    }

    async fn read_loop(
        &self,
        mut reader: ReadHalf<TcpStream>,
        peer: &mut Peer,
        out_tx: &mpsc::Sender<Message>,
    ) -> Result<(), ProtocolError> {
        // Checked more often than HEARTBEAT/PONG_TIMEOUT so both fire close
        // to their nominal deadline.
        let mut heartbeat = tokio::time::interval(crate::params::PING_TIMEOUT);
        loop {
            let action = tokio::select! {
                msg = read_message(&mut reader, self.magic) => {
                    let msg = msg?;
                    let our_height = self.our_height.load(Ordering::Relaxed);
                    match msg {
                        Message::Version(payload) => {
                            let action = peer.on_version(payload, our_height);
                            self.set_remote_height(peer.id, peer.remote_height);
                            action
                        }
                        Message::Verack => peer.on_verack(),
                        Message::Ping(nonce) => peer.on_ping(nonce),
                        Message::Pong(nonce) => peer.on_pong(nonce),
                        other => {
                            if peer.is_active() {
                                peer.touch();
                                let _ = self.events_tx.send(PeerEvent::Message { id: peer.id, message: other }).await;
                                PeerAction::None
                            } else {
                                peer.add_ban_score(1)
                            }
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    peer.tick(std::time::Instant::now())
                }
            };
            match action {
                PeerAction::Send(reply) => {
                    if out_tx.send(reply).await.is_err() {
                        return Err(ProtocolError::ConnectionClosed);
                    }
                }
                PeerAction::SendMany(replies) => {
                    for reply in replies {
                        if out_tx.send(reply).await.is_err() {
                            return Err(ProtocolError::ConnectionClosed);
                        }
                    }
                }
                PeerAction::Disconnect => return Err(ProtocolError::ConnectionClosed),
                PeerAction::None => {}
            }
        }
    }
}

async fn write_loop(mut writer: WriteHalf<TcpStream>, magic: u32, mut out_rx: mpsc::Receiver<Message>) {
    while let Some(msg) = out_rx.recv().await {
        if write_message(&mut writer, magic, &msg).await.is_err() {
            break;
        }
    }
}
