//! Per-peer lifecycle state machine (spec.md §4.7).
//!
//! Pure transition logic, no socket I/O — [`crate::manager`] drives this
//! from the bytes [`crate::framing`] decodes. Request/reply correlation
//! (`Ping`/`Pong`) uses a nonce-keyed map owned by the peer itself, per
//! spec.md §9's replacement for the source's string-keyed registry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

use thunderbolt_core::model::NetworkAddress;

use crate::params::{HEARTBEAT, PONG_TIMEOUT, PROTOCOL_VERSION};
use crate::wire::{Message, VersionPayload};

/// Identifies a connected peer within one node's process. Assigned by
/// [`crate::manager::PeerManager`] when the connection is accepted or
/// dialled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Lifecycle states of spec.md §4.7's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    AwaitingVersion,
    AwaitingVerack,
    Active,
    Draining,
    Closed,
}

/// An action the caller (the I/O task or the coordinator) must take as a
/// result of feeding an event into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAction {
    Send(Message),
    SendMany(Vec<Message>),
    Disconnect,
    None,
}

/// One peer's handshake/liveness/ban-score state (spec.md §4.7).
pub struct Peer {
    pub id: PeerId,
    pub addr: NetworkAddress,
    pub direction: Direction,
    pub state: PeerState,
    pub ban_score: i32,
    pub our_version_nonce: u64,
    pub remote_height: u64,
    pub remote_services: u64,
    pub last_message_at: Instant,
    pending_pings: HashMap<u64, Instant>,
}

impl Peer {
    fn new(id: PeerId, addr: NetworkAddress, direction: Direction, state: PeerState) -> Self {
        Self {
            id,
            addr,
            direction,
            state,
            ban_score: 0,
            our_version_nonce: rand::thread_rng().gen(),
            remote_height: 0,
            remote_services: 0,
            last_message_at: Instant::now(),
            pending_pings: HashMap::new(),
        }
    }

    /// A connection this node dialled out (spec.md §4.7: "socket ready
    /// (outbound)"). Immediately wants to send `Version`.
    pub fn outbound(id: PeerId, addr: NetworkAddress, our_height: u64) -> (Self, Message, u64) {
        let mut peer = Self::new(id, addr, Direction::Outbound, PeerState::Connecting);
        let version = peer.build_version(our_height);
        peer.state = PeerState::AwaitingVersion;
        let nonce = peer.our_version_nonce;
        (peer, version, nonce)
    }

    /// A connection this node accepted (spec.md §4.7: "accept (inbound)").
    pub fn inbound(id: PeerId, addr: NetworkAddress) -> Self {
        Self::new(id, addr, Direction::Inbound, PeerState::AwaitingVersion)
    }

    fn build_version(&self, our_height: u64) -> Message {
        Message::Version(VersionPayload {
            protocol: PROTOCOL_VERSION,
            services: 0,
            time: unix_now(),
            block_height: our_height,
            nonce: self.our_version_nonce,
            receive_addr: self.addr,
        })
    }

    pub fn is_handshaking(&self) -> bool {
        matches!(self.state, PeerState::Connecting | PeerState::AwaitingVersion | PeerState::AwaitingVerack)
    }

    pub fn is_active(&self) -> bool {
        self.state == PeerState::Active
    }

    /// Feeds one inbound `Version` (spec.md §4.7 row "AwaitingVersion /
    /// Version(payload)").
    pub fn on_version(&mut self, payload: VersionPayload, our_height: u64) -> PeerAction {
        if self.state != PeerState::AwaitingVersion {
            self.ban_score += 1;
            return PeerAction::None;
        }
        if payload.protocol != PROTOCOL_VERSION {
            self.state = PeerState::Closed;
            return PeerAction::Disconnect;
        }
        if payload.nonce == self.our_version_nonce {
            // Loopback: we connected to ourselves.
            self.state = PeerState::Closed;
            return PeerAction::Disconnect;
        }
        self.remote_height = payload.block_height;
        self.remote_services = payload.services;
        self.state = PeerState::AwaitingVerack;
        match self.direction {
            Direction::Inbound => {
                // We are the server and have not sent our own Version yet:
                // send it now, immediately followed by our Verack for the
                // Version we just received (spec.md §4.7: "reply Version
                // (if server) then Verack").
                let reply = self.build_version(our_height);
                PeerAction::SendMany(vec![reply, Message::Verack])
            }
            Direction::Outbound => PeerAction::Send(Message::Verack),
        }
    }

    /// Feeds one inbound `Verack`.
    pub fn on_verack(&mut self) -> PeerAction {
        if self.state != PeerState::AwaitingVerack {
            self.ban_score += 1;
            return PeerAction::None;
        }
        self.state = PeerState::Active;
        match self.direction {
            Direction::Outbound => PeerAction::Send(Message::GetAddress),
            Direction::Inbound => PeerAction::None,
        }
    }

    /// Feeds one inbound `Ping`.
    pub fn on_ping(&mut self, nonce: u64) -> PeerAction {
        self.touch();
        PeerAction::Send(Message::Pong(nonce))
    }

    /// Feeds one inbound `Pong`. Raises `ban_score` only on a pong that
    /// does not match an outstanding ping (spec.md §8's property: sending
    /// us extra `Ping`s never raises our ban score — only a malformed pong
    /// does).
    pub fn on_pong(&mut self, nonce: u64) -> PeerAction {
        self.touch();
        if self.pending_pings.remove(&nonce).is_some() {
            PeerAction::None
        } else {
            self.ban_score += 1;
            PeerAction::None
        }
    }

    /// Called on any other event to mark liveness.
    pub fn touch(&mut self) {
        self.last_message_at = Instant::now();
    }

    /// Heartbeat tick: emits a `Ping` once the peer has been idle past
    /// `HEARTBEAT`, and detects an unanswered ping past `PONG_TIMEOUT`.
    pub fn tick(&mut self, now: Instant) -> PeerAction {
        if !self.is_active() {
            return PeerAction::None;
        }
        let timed_out = self.pending_pings.values().any(|sent_at| now.duration_since(*sent_at) > PONG_TIMEOUT);
        if timed_out {
            self.ban_score += 100;
            self.state = PeerState::Draining;
            return PeerAction::Disconnect;
        }
        if now.duration_since(self.last_message_at) > HEARTBEAT && self.pending_pings.is_empty() {
            let nonce: u64 = rand::thread_rng().gen();
            self.pending_pings.insert(nonce, now);
            return PeerAction::Send(Message::Ping(nonce));
        }
        PeerAction::None
    }

    /// Raises the ban score for a malformed or out-of-turn message and
    /// reports whether the peer must now be disconnected (spec.md §4.7:
    /// "banScore >= 100 -> mark address banned, Draining").
    pub fn add_ban_score(&mut self, amount: i32) -> PeerAction {
        self.ban_score += amount;
        if self.ban_score >= crate::params::BAN_SCORE_THRESHOLD {
            self.state = PeerState::Draining;
            PeerAction::Disconnect
        } else {
            PeerAction::None
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_message_at)
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> NetworkAddress {
        NetworkAddress::from_ipv4([127, 0, 0, 1], 9567, 0)
    }

    #[test]
    fn outbound_handshake_reaches_active() {
        let (mut peer, _version_msg, our_nonce) = Peer::outbound(PeerId(1), addr(), 0);
        assert_eq!(peer.state, PeerState::AwaitingVersion);
        let remote = VersionPayload {
            protocol: PROTOCOL_VERSION,
            services: 0,
            time: 0,
            block_height: 10,
            nonce: our_nonce.wrapping_add(1),
            receive_addr: addr(),
        };
        let action = peer.on_version(remote, 0);
        assert_eq!(action, PeerAction::Send(Message::Verack));
        assert_eq!(peer.state, PeerState::AwaitingVerack);
        let action = peer.on_verack();
        assert_eq!(action, PeerAction::Send(Message::GetAddress));
        assert!(peer.is_active());
    }

    #[test]
    fn inbound_handshake_sends_version_then_verack_together() {
        let mut peer = Peer::inbound(PeerId(1), addr());
        assert_eq!(peer.state, PeerState::AwaitingVersion);
        let remote = VersionPayload {
            protocol: PROTOCOL_VERSION,
            services: 0,
            time: 0,
            block_height: 5,
            nonce: peer.our_version_nonce.wrapping_add(1),
            receive_addr: addr(),
        };
        let action = peer.on_version(remote, 0);
        match action {
            PeerAction::SendMany(msgs) => {
                assert_eq!(msgs.len(), 2);
                assert!(matches!(msgs[0], Message::Version(_)));
                assert_eq!(msgs[1], Message::Verack);
            }
            other => panic!("expected SendMany([Version, Verack]), got {other:?}"),
        }
        assert_eq!(peer.state, PeerState::AwaitingVerack);
        let action = peer.on_verack();
        assert_eq!(action, PeerAction::None, "inbound side does not send GetAddress");
        assert!(peer.is_active());
    }

    #[test]
    fn loopback_nonce_disconnects() {
        let (mut peer, _msg, our_nonce) = Peer::outbound(PeerId(1), addr(), 0);
        let remote = VersionPayload {
            protocol: PROTOCOL_VERSION,
            services: 0,
            time: 0,
            block_height: 0,
            nonce: our_nonce,
            receive_addr: addr(),
        };
        assert_eq!(peer.on_version(remote, 0), PeerAction::Disconnect);
    }

    #[test]
    fn mismatched_protocol_disconnects() {
        let (mut peer, _msg, our_nonce) = Peer::outbound(PeerId(1), addr(), 0);
        let remote = VersionPayload {
            protocol: PROTOCOL_VERSION + 1,
            services: 0,
            time: 0,
            block_height: 0,
            nonce: our_nonce.wrapping_add(1),
            receive_addr: addr(),
        };
        assert_eq!(peer.on_version(remote, 0), PeerAction::Disconnect);
    }

    #[test]
    fn unmatched_pong_raises_ban_score_but_extra_pings_do_not() {
        let mut peer = Peer::inbound(PeerId(2), addr());
        peer.state = PeerState::Active;
        assert_eq!(peer.ban_score, 0);
        for _ in 0..5 {
            peer.on_ping(1);
        }
        assert_eq!(peer.ban_score, 0, "receiving pings we must answer never raises ban score");
        peer.on_pong(999);
        assert_eq!(peer.ban_score, 1);
    }

    #[test]
    fn ban_threshold_drains_the_peer() {
        let mut peer = Peer::inbound(PeerId(3), addr());
        peer.state = PeerState::Active;
        let action = peer.add_ban_score(100);
        assert_eq!(action, PeerAction::Disconnect);
        assert_eq!(peer.state, PeerState::Draining);
    }

    #[test]
    fn heartbeat_sends_ping_once_idle_past_threshold() {
        let mut peer = Peer::inbound(PeerId(4), addr());
        peer.state = PeerState::Active;
        let future = Instant::now() + HEARTBEAT + Duration::from_secs(1);
        match peer.tick(future) {
            PeerAction::Send(Message::Ping(_)) => {}
            other => panic!("expected a Ping, got {other:?}"),
        }
    }

    #[test]
    fn unanswered_ping_times_out_into_draining() {
        let mut peer = Peer::inbound(PeerId(5), addr());
        peer.state = PeerState::Active;
        let soon = Instant::now() + HEARTBEAT + Duration::from_secs(1);
        peer.tick(soon);
        let later = soon + PONG_TIMEOUT + Duration::from_secs(1);
        let action = peer.tick(later);
        assert_eq!(action, PeerAction::Disconnect);
        assert_eq!(peer.state, PeerState::Draining);
    }
}
