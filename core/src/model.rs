//! The data model of spec.md §3.
//!
//! Every type here is plain data; validity rules, hashing and (de)serialization
//! live in [`crate::crypto`], [`crate::pow`] and [`crate::codec`] respectively
//! so that this module stays a terse catalogue of shapes.

use crate::pow::Work;
use crate::Hash;

/// Block header: the part of a block that is hashed for proof-of-work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub parent: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// A spend of a previously created output. `ref_tx == ZERO_HASH` marks the
/// single input of a coinbase transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub ref_tx: Hash,
    pub index: u32,
}

/// Alias used at call sites that think of this as "the input", per spec.md §3.
pub type Input = Outpoint;

/// The three lock types the system supports in place of a script VM
/// (spec.md §1 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    SingleSig = 0,
    MultiSig = 1,
    Unspendable = 2,
}

impl LockType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::SingleSig),
            1 => Some(Self::MultiSig),
            2 => Some(Self::Unspendable),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A newly created, spendable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub amount: u64,
    pub lock_type: LockType,
    pub lock_params: Vec<u8>,
}

/// A transfer of value. The transaction id hashes everything except
/// `witnesses`, so unlocking data is malleable without changing identity
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub lock_time: u64,
    pub witnesses: Vec<Vec<u8>>,
}

impl Transaction {
    /// `true` when this transaction has the coinbase shape: exactly one
    /// input, with `ref_tx == ZERO_HASH`.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].ref_tx == crate::ZERO_HASH
    }
}

/// An ordered set of transactions linked into the chain by `header.parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

/// A `MultiSig` witness: `M` signatures, keyed by the index of the public
/// key they correspond to in `pubkeys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSigWitness {
    pub m: u8,
    pub pubkeys: Vec<Vec<u8>>,
    pub sig_map: Vec<(u8, Vec<u8>)>,
}

/// A `SingleSig` witness: one public key, one DER signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleSigWitness {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// `(segment, offset)` address of a record inside a [`crate::Hash`]-keyed
/// [segmented store](../../thunderbolt_storage/index.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pointer {
    pub segment: u32,
    pub offset: u64,
}

/// Status bits recorded alongside every [`BlockMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockStatus {
    /// Stored and indexed, not (yet) connected to the main chain's UTXO.
    Stored = 0,
    /// Connected: its UTXO mutations are reflected in the current tip.
    Connected = 1,
    /// Permanently rejected; never revisited (spec.md §4.4.1 step 5).
    Invalid = 2,
}

/// Everything the metadata store keeps about a block besides its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetadata {
    pub header: BlockHeader,
    pub height: u64,
    pub tx_count: u32,
    pub status: BlockStatus,
    pub total_work: Work,
    pub block_ptr: Pointer,
    pub revert_ptr: Pointer,
}

/// Supports `getTransactionById` without scanning block storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMetadata {
    pub txid: Hash,
    pub block_ptr: Pointer,
    pub position_in_block: u32,
}

/// An unspent output, keyed by `(txid, index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub txid: Hash,
    pub index: u32,
    pub block_height: u64,
    pub version: i32,
    pub is_coinbase: bool,
    pub output: Output,
}

impl UtxoEntry {
    pub fn key(&self) -> (Hash, u32) {
        (self.txid, self.index)
    }
}

/// A peer or address-book network address. IPv4 addresses are carried
/// IPv4-mapped in the 16-byte field, as spec.md §3 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetworkAddress {
    pub fn from_ipv4(octets: [u8; 4], port: u16, services: u64) -> Self {
        let mut ip = [0u8; 16];
        ip[10] = 0xff;
        ip[11] = 0xff;
        ip[12..16].copy_from_slice(&octets);
        Self { services, ip, port }
    }

    pub fn is_ipv4_mapped(&self) -> bool {
        self.ip[..10] == [0u8; 10] && self.ip[10] == 0xff && self.ip[11] == 0xff
    }

    pub fn to_socket_addr(&self) -> std::net::SocketAddr {
        if self.is_ipv4_mapped() {
            let octets = [self.ip[12], self.ip[13], self.ip[14], self.ip[15]];
            std::net::SocketAddr::from((std::net::Ipv4Addr::from(octets), self.port))
        } else {
            std::net::SocketAddr::from((std::net::Ipv6Addr::from(self.ip), self.port))
        }
    }

    pub fn from_socket_addr(addr: std::net::SocketAddr, services: u64) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => Self::from_ipv4(v4.ip().octets(), v4.port(), services),
            std::net::SocketAddr::V6(v6) => Self { services, ip: v6.ip().octets(), port: v6.port() },
        }
    }
}

/// Address-book bookkeeping for one [`NetworkAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAddressMetadata {
    pub addr: NetworkAddress,
    pub last_seen: u32,
    pub ban_score: i32,
    pub is_banned: bool,
    pub ban_expiry: u32,
}

impl NetworkAddressMetadata {
    pub fn fresh(addr: NetworkAddress, now: u32) -> Self {
        Self {
            addr,
            last_seen: now,
            ban_score: 0,
            is_banned: false,
            ban_expiry: 0,
        }
    }
}
