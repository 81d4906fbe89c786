//! Peer-to-peer networking: wire framing, the peer lifecycle state
//! machine, connection management, and initial block download
//! (spec.md §4.6-§4.9).

pub mod addressbook;
pub mod error;
pub mod framing;
pub mod ibd;
pub mod manager;
pub mod params;
pub mod peer;
pub mod wire;

pub use addressbook::AddressBook;
pub use error::{ProtocolError, TimeoutError};
pub use ibd::{Ibd, IbdOutcome};
pub use manager::{PeerEvent, PeerManager};
pub use peer::{Direction, Peer, PeerAction, PeerId, PeerState};
pub use wire::{InventoryItem, InventoryKind, LocatorRequest, Message, TimestampedAddress, VersionPayload};
