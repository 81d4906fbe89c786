//! Key schema for the metadata store (spec.md §4.3).

use thunderbolt_core::Hash;

pub const BLOCK_PREFIX: u8 = b'b';
pub const TX_PREFIX: u8 = b't';
pub const UTXO_PREFIX: u8 = b'u';
pub const CHAIN_HEAD_KEY: &[u8] = b"h";
pub const BLOCKS_LATEST_SEGMENT_KEY: &[u8] = b"l";
pub const REVERTS_LATEST_SEGMENT_KEY: &[u8] = b"r";
pub const ADDRESS_PREFIX: u8 = b'a';

pub fn block(hash: &Hash) -> Vec<u8> {
    let mut k = Vec::with_capacity(33);
    k.push(BLOCK_PREFIX);
    k.extend_from_slice(hash);
    k
}

pub fn tx(txid: &Hash) -> Vec<u8> {
    let mut k = Vec::with_capacity(33);
    k.push(TX_PREFIX);
    k.extend_from_slice(txid);
    k
}

pub fn utxo(txid: &Hash, index: u32) -> Vec<u8> {
    let mut k = Vec::with_capacity(37);
    k.push(UTXO_PREFIX);
    k.extend_from_slice(txid);
    k.extend_from_slice(&index.to_le_bytes());
    k
}

pub fn address(raw_ip: &[u8; 16]) -> Vec<u8> {
    let mut k = Vec::with_capacity(17);
    k.push(ADDRESS_PREFIX);
    k.extend_from_slice(raw_ip);
    k
}

pub fn utxo_prefix_for_tx(txid: &Hash) -> Vec<u8> {
    let mut k = Vec::with_capacity(33);
    k.push(UTXO_PREFIX);
    k.extend_from_slice(txid);
    k
}
