//! Wire framing and message variants (spec.md §4.6).
//!
//! `MessageHeader` is `magic(4) | type(2) | payloadLen(4) | checksum(4)`,
//! little-endian, followed by `payloadLen` bytes of payload. There is no
//! varint anywhere in this format, matching [`thunderbolt_core::codec`].

use thunderbolt_core::codec::{
    decode_block, decode_header, decode_hash, decode_network_address, decode_transaction,
    encode_block, encode_header, encode_hash, encode_network_address, encode_transaction, Reader, Writer,
};
use thunderbolt_core::model::{BlockHeader, NetworkAddress};
use thunderbolt_core::params::MAX_MESSAGE_SIZE;
use thunderbolt_core::{Block, Hash, Transaction};

use crate::error::ProtocolError;
use crate::params::{MAX_HEADERS, MAX_INVENTORY_ITEMS};

/// One `(type, hash)` pair inside an `Inventory`/`GetData`/`NotFound`
/// message (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryItem {
    pub kind: InventoryKind,
    pub hash: Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InventoryKind {
    Block = 0,
    Transaction = 1,
}

impl InventoryKind {
    fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0 => Ok(Self::Block),
            1 => Ok(Self::Transaction),
            _ => Err(ProtocolError::UnknownMessageType(tag as u16)),
        }
    }
}

/// Payload of `Version` (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    pub protocol: u32,
    pub services: u64,
    pub time: i64,
    pub block_height: u64,
    pub nonce: u64,
    pub receive_addr: NetworkAddress,
}

/// Payload shared by `GetBlocks`/`GetHeaders` (spec.md §4.6: "same").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorRequest {
    pub version: u32,
    pub locator: Vec<Hash>,
    pub stop_hash: Hash,
    pub nonce: u64,
}

/// One timestamped address gossiped in an `Address` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedAddress {
    pub timestamp: u32,
    pub addr: NetworkAddress,
}

/// Every message variant of spec.md §4.6's table, one per type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping(u64),
    Pong(u64),
    Version(VersionPayload),
    Verack,
    Address(Vec<TimestampedAddress>),
    GetAddress,
    GetBlocks(LocatorRequest),
    GetHeaders(LocatorRequest),
    Inventory { nonce: u64, items: Vec<InventoryItem> },
    GetData(Vec<InventoryItem>),
    Block(Box<Block>),
    Headers(Vec<BlockHeader>),
    Transaction(Box<Transaction>),
    NotFound(Vec<InventoryItem>),
}

impl Message {
    pub fn type_code(&self) -> u16 {
        match self {
            Message::Ping(_) => 0x00,
            Message::Pong(_) => 0x01,
            Message::Version(_) => 0x02,
            Message::Verack => 0x03,
            Message::Address(_) => 0x04,
            Message::GetAddress => 0x05,
            Message::GetBlocks(_) => 0x06,
            Message::GetHeaders(_) => 0x07,
            Message::Inventory { .. } => 0x08,
            Message::GetData(_) => 0x09,
            Message::Block(_) => 0x0A,
            Message::Headers(_) => 0x0B,
            Message::Transaction(_) => 0x0C,
            Message::NotFound(_) => 0x0D,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Ping(_) => "Ping",
            Message::Pong(_) => "Pong",
            Message::Version(_) => "Version",
            Message::Verack => "Verack",
            Message::Address(_) => "Address",
            Message::GetAddress => "GetAddress",
            Message::GetBlocks(_) => "GetBlocks",
            Message::GetHeaders(_) => "GetHeaders",
            Message::Inventory { .. } => "Inventory",
            Message::GetData(_) => "GetData",
            Message::Block(_) => "Block",
            Message::Headers(_) => "Headers",
            Message::Transaction(_) => "Transaction",
            Message::NotFound(_) => "NotFound",
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Message::Ping(nonce) | Message::Pong(nonce) => w.write_u64(*nonce),
            Message::Version(v) => {
                w.write_u32(v.protocol);
                w.write_u64(v.services);
                w.write_i64(v.time);
                w.write_u64(v.block_height);
                w.write_u64(v.nonce);
                encode_network_address(&mut w, &v.receive_addr);
            }
            Message::Verack | Message::GetAddress => {}
            Message::Address(entries) => {
                w.write_vec(entries, |w, e| {
                    w.write_u32(e.timestamp);
                    encode_network_address(w, &e.addr);
                });
            }
            Message::GetBlocks(r) | Message::GetHeaders(r) => encode_locator(&mut w, r),
            Message::Inventory { nonce, items } => {
                w.write_u64(*nonce);
                w.write_vec(items, |w, i| encode_inventory_item(w, i));
            }
            Message::GetData(items) | Message::NotFound(items) => {
                w.write_vec(items, |w, i| encode_inventory_item(w, i));
            }
            Message::Block(b) => encode_block(&mut w, b),
            Message::Headers(h) => w.write_vec(h, |w, header| encode_header(w, header)),
            Message::Transaction(tx) => encode_transaction(&mut w, tx),
        }
        w.into_bytes()
    }

    fn decode_payload(type_code: u16, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(bytes);
        let msg = match type_code {
            0x00 => Message::Ping(r.read_u64()?),
            0x01 => Message::Pong(r.read_u64()?),
            0x02 => Message::Version(VersionPayload {
                protocol: r.read_u32()?,
                services: r.read_u64()?,
                time: r.read_i64()?,
                block_height: r.read_u64()?,
                nonce: r.read_u64()?,
                receive_addr: decode_network_address(&mut r)?,
            }),
            0x03 => Message::Verack,
            0x04 => Message::Address(r.read_vec(MAX_INVENTORY_ITEMS * 10, |r| {
                Ok(TimestampedAddress { timestamp: r.read_u32()?, addr: decode_network_address(r)? })
            })?),
            0x05 => Message::GetAddress,
            0x06 => Message::GetBlocks(decode_locator(&mut r)?),
            0x07 => Message::GetHeaders(decode_locator(&mut r)?),
            0x08 => Message::Inventory {
                nonce: r.read_u64()?,
                items: r.read_vec(MAX_INVENTORY_ITEMS, |r| decode_inventory_item(r))?,
            },
            0x09 => Message::GetData(r.read_vec(MAX_INVENTORY_ITEMS, |r| decode_inventory_item(r))?),
            0x0A => Message::Block(Box::new(decode_block(&mut r)?)),
            0x0B => Message::Headers(r.read_vec(MAX_HEADERS, |r| decode_header(r))?),
            0x0C => Message::Transaction(Box::new(decode_transaction(&mut r)?)),
            0x0D => Message::NotFound(r.read_vec(MAX_INVENTORY_ITEMS, |r| decode_inventory_item(r))?),
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };
        r.expect_exhausted()?;
        Ok(msg)
    }
}

fn encode_locator(w: &mut Writer, r: &LocatorRequest) {
    w.write_u32(r.version);
    w.write_vec(&r.locator, |w, h| encode_hash(w, h));
    encode_hash(w, &r.stop_hash);
    w.write_u64(r.nonce);
}

fn decode_locator(r: &mut Reader) -> Result<LocatorRequest, ProtocolError> {
    Ok(LocatorRequest {
        version: r.read_u32()?,
        locator: r.read_vec(2000, |r| decode_hash(r))?,
        stop_hash: decode_hash(r)?,
        nonce: r.read_u64()?,
    })
}

fn encode_inventory_item(w: &mut Writer, item: &InventoryItem) {
    w.write_u8(item.kind as u8);
    encode_hash(w, &item.hash);
}

fn decode_inventory_item(r: &mut Reader) -> Result<InventoryItem, ProtocolError> {
    let kind = InventoryKind::from_tag(r.read_u8()?)?;
    Ok(InventoryItem { kind, hash: decode_hash(r)? })
}

/// `[magic(4) | type(2) | payloadLen(4) | checksum(4)]`, the 14-byte
/// prefix of every wire frame (spec.md §3).
pub const HEADER_LEN: usize = 14;

/// Encodes the full wire frame (header + payload) for one message.
pub fn encode_message(magic: u32, msg: &Message) -> Vec<u8> {
    let payload = msg.encode_payload();
    let checksum = thunderbolt_core::crypto::checksum(&payload);
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&msg.type_code().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&checksum);
    out.extend_from_slice(&payload);
    out
}

/// A parsed header, before its payload has necessarily arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    pub magic: u32,
    pub type_code: u16,
    pub payload_len: u32,
    pub checksum: [u8; 4],
}

/// Parses the fixed 14-byte header. Callers are expected to have already
/// located `magic` via the resync scan of [`crate::framing`].
pub fn decode_header_bytes(bytes: &[u8; HEADER_LEN]) -> ParsedHeader {
    ParsedHeader {
        magic: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        type_code: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
        payload_len: u32::from_le_bytes(bytes[6..10].try_into().unwrap()),
        checksum: bytes[10..14].try_into().unwrap(),
    }
}

/// Validates a header's `payloadLen` against spec.md §3's 32 MiB cap, and
/// decodes+checksums the payload once it has fully arrived.
pub fn finish_decode(header: ParsedHeader, payload: &[u8]) -> Result<Message, ProtocolError> {
    if header.payload_len as usize > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge { got: header.payload_len, max: MAX_MESSAGE_SIZE as u32 });
    }
    let actual_checksum = thunderbolt_core::crypto::checksum(payload);
    if actual_checksum != header.checksum {
        return Err(ProtocolError::ChecksumMismatch { msg_type: header.type_code });
    }
    Message::decode_payload(header.type_code, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_core::crypto::checksum;

    #[test]
    fn ping_round_trips_with_exact_length() {
        let msg = Message::Ping(0xDEAD_BEEF_CAFE_BABE);
        let bytes = encode_message(0x746e_6470, &msg);
        assert_eq!(bytes.len(), HEADER_LEN + 8);

        let header_bytes: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        let header = decode_header_bytes(&header_bytes);
        assert_eq!(header.magic, 0x746e_6470);
        assert_eq!(header.payload_len, 8);

        let mut payload_w = Writer::new();
        payload_w.write_u64(0xDEAD_BEEF_CAFE_BABE);
        let expected_checksum = checksum(&payload_w.into_bytes());
        assert_eq!(header.checksum, expected_checksum);

        let decoded = finish_decode(header, &bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let header = ParsedHeader {
            magic: 0x746e_6470,
            type_code: 0x00,
            payload_len: (MAX_MESSAGE_SIZE + 1) as u32,
            checksum: [0u8; 4],
        };
        assert!(matches!(finish_decode(header, &[]), Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let msg = Message::Verack;
        let bytes = encode_message(0x746e_6470, &msg);
        let mut header_bytes: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        header_bytes[10] ^= 0xff; // corrupt the checksum
        let header = decode_header_bytes(&header_bytes);
        assert!(matches!(finish_decode(header, &bytes[HEADER_LEN..]), Err(ProtocolError::ChecksumMismatch { .. })));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let header = ParsedHeader { magic: 0x746e_6470, type_code: 0xFFFF, payload_len: 0, checksum: checksum(&[]) };
        assert!(matches!(finish_decode(header, &[]), Err(ProtocolError::UnknownMessageType(0xFFFF))));
    }

    #[test]
    fn inventory_round_trips() {
        let msg = Message::Inventory {
            nonce: 7,
            items: vec![InventoryItem { kind: InventoryKind::Block, hash: [1u8; 32] }],
        };
        let bytes = encode_message(0x746e_6470, &msg);
        let header_bytes: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        let header = decode_header_bytes(&header_bytes);
        let decoded = finish_decode(header, &bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, msg);
    }
}
