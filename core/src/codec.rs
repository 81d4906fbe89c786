//! Fixed-endian codec for the wire/storage format (spec.md §4.1).
//!
//! All multi-byte integers are little-endian. Lists are prefixed by an
//! unsigned 32-bit count; byte strings are prefixed by an unsigned 32-bit
//! length. There is no varint anywhere in this format — every size that
//! needs bounding is bounded by an explicit maximum passed at the call site,
//! not by the wire format itself.

use crate::error::{CodecError, CodecResult};
use crate::model::*;
use crate::pow::U256;
use crate::Hash;

/// An append-only little-endian byte writer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_array(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed byte string (u32 count, then the bytes themselves).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed list, encoding each element with `encode_elem`.
    pub fn write_vec<T>(&mut self, items: &[T], mut encode_elem: impl FnMut(&mut Writer, &T)) {
        self.write_u32(items.len() as u32);
        for item in items {
            encode_elem(self, item);
        }
    }
}

/// A bounds-checked little-endian byte reader over a borrowed slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Errors if the whole input was not consumed; callers use this after a
    /// top-level decode to reject trailing garbage.
    pub fn expect_exhausted(&self) -> CodecResult<()> {
        if self.remaining() != 0 {
            return Err(CodecError::LengthOverflow { got: self.buf.len(), max: self.pos });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::TruncatedInput { needed: n, had: self.remaining() });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let b = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Length-prefixed byte string, rejecting a declared length over `max`.
    pub fn read_bytes(&mut self, max: usize) -> CodecResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(CodecError::LengthOverflow { got: len, max });
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Length-prefixed list, rejecting a declared count over `max_count`.
    pub fn read_vec<T>(
        &mut self,
        max_count: usize,
        mut decode_elem: impl FnMut(&mut Reader<'a>) -> CodecResult<T>,
    ) -> CodecResult<Vec<T>> {
        let count = self.read_u32()? as usize;
        if count > max_count {
            return Err(CodecError::LengthOverflow { got: count, max: max_count });
        }
        let mut out = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            out.push(decode_elem(self)?);
        }
        Ok(out)
    }
}

/// Ceiling applied to any list/byte-string length this codec decodes that
/// has no tighter, type-specific bound (spec.md §4.1's blanket 32 MiB cap).
pub const ABSOLUTE_MAX: usize = crate::params::MAX_MESSAGE_SIZE;

/// Upper bound on transactions or inputs/outputs inside one block/tx — not
/// named numerically by spec.md, so bounded by what `MAX_BLOCK_SIZE` could
/// possibly contain at one byte per entry.
const MAX_LIST_LEN: usize = crate::params::MAX_BLOCK_SIZE;

// ---- primitive data-model types ----

pub fn encode_hash(w: &mut Writer, h: &Hash) {
    w.write_array(h);
}

pub fn decode_hash(r: &mut Reader) -> CodecResult<Hash> {
    r.read_array::<32>()
}

pub fn encode_header(w: &mut Writer, h: &BlockHeader) {
    w.write_i32(h.version);
    encode_hash(w, &h.parent);
    encode_hash(w, &h.merkle_root);
    w.write_u32(h.timestamp);
    w.write_u32(h.bits);
    w.write_u32(h.nonce);
}

pub fn decode_header(r: &mut Reader) -> CodecResult<BlockHeader> {
    Ok(BlockHeader {
        version: r.read_i32()?,
        parent: decode_hash(r)?,
        merkle_root: decode_hash(r)?,
        timestamp: r.read_u32()?,
        bits: r.read_u32()?,
        nonce: r.read_u32()?,
    })
}

pub fn encode_outpoint(w: &mut Writer, o: &Outpoint) {
    encode_hash(w, &o.ref_tx);
    w.write_u32(o.index);
}

pub fn decode_outpoint(r: &mut Reader) -> CodecResult<Outpoint> {
    Ok(Outpoint { ref_tx: decode_hash(r)?, index: r.read_u32()? })
}

pub fn encode_output(w: &mut Writer, o: &Output) {
    w.write_u64(o.amount);
    w.write_u8(o.lock_type.tag());
    w.write_bytes(&o.lock_params);
}

pub fn decode_output(r: &mut Reader) -> CodecResult<Output> {
    let amount = r.read_u64()?;
    let tag = r.read_u8()?;
    let lock_type = LockType::from_tag(tag)
        .ok_or(CodecError::UnknownEnum { type_name: "LockType", tag: tag as u32 })?;
    let lock_params = r.read_bytes(ABSOLUTE_MAX)?;
    Ok(Output { amount, lock_type, lock_params })
}

/// Encodes everything in a [`Transaction`] *except* `witnesses`, which is
/// exactly the preimage the transaction id hashes (spec.md §3's witness
/// malleability rule).
pub fn encode_tx_body(w: &mut Writer, tx: &Transaction) {
    w.write_i32(tx.version);
    w.write_vec(&tx.inputs, |w, i| encode_outpoint(w, i));
    w.write_vec(&tx.outputs, |w, o| encode_output(w, o));
    w.write_u64(tx.lock_time);
}

pub fn encode_transaction(w: &mut Writer, tx: &Transaction) {
    encode_tx_body(w, tx);
    w.write_vec(&tx.witnesses, |w, wit| w.write_bytes(wit));
}

pub fn decode_transaction(r: &mut Reader) -> CodecResult<Transaction> {
    let version = r.read_i32()?;
    let inputs = r.read_vec(MAX_LIST_LEN, decode_outpoint)?;
    let outputs = r.read_vec(MAX_LIST_LEN, decode_output)?;
    let lock_time = r.read_u64()?;
    let witnesses = r.read_vec(MAX_LIST_LEN, |r| r.read_bytes(ABSOLUTE_MAX))?;
    Ok(Transaction { version, inputs, outputs, lock_time, witnesses })
}

pub fn encode_block(w: &mut Writer, b: &Block) {
    encode_header(w, &b.header);
    w.write_vec(&b.txs, |w, tx| encode_transaction(w, tx));
}

pub fn decode_block(r: &mut Reader) -> CodecResult<Block> {
    let header = decode_header(r)?;
    let txs = r.read_vec(MAX_LIST_LEN, decode_transaction)?;
    Ok(Block { header, txs })
}

pub fn encode_network_address(w: &mut Writer, a: &NetworkAddress) {
    w.write_u64(a.services);
    w.write_array(&a.ip);
    w.write_u16(a.port);
}

pub fn decode_network_address(r: &mut Reader) -> CodecResult<NetworkAddress> {
    Ok(NetworkAddress {
        services: r.read_u64()?,
        ip: r.read_array::<16>()?,
        port: r.read_u16()?,
    })
}

pub fn encode_pointer(w: &mut Writer, p: &Pointer) {
    w.write_u32(p.segment);
    w.write_u64(p.offset);
}

pub fn decode_pointer(r: &mut Reader) -> CodecResult<Pointer> {
    Ok(Pointer { segment: r.read_u32()?, offset: r.read_u64()? })
}

pub fn encode_work(w: &mut Writer, work: &U256) {
    w.write_array(&work.to_be_bytes());
}

pub fn decode_work(r: &mut Reader) -> CodecResult<U256> {
    Ok(U256::from_be_bytes(r.read_array::<32>()?))
}

pub fn encode_block_status(w: &mut Writer, status: BlockStatus) {
    w.write_u8(status as u8);
}

pub fn decode_block_status(r: &mut Reader) -> CodecResult<BlockStatus> {
    match r.read_u8()? {
        0 => Ok(BlockStatus::Stored),
        1 => Ok(BlockStatus::Connected),
        2 => Ok(BlockStatus::Invalid),
        tag => Err(CodecError::UnknownEnum { type_name: "BlockStatus", tag: tag as u32 }),
    }
}

pub fn encode_block_metadata(w: &mut Writer, m: &BlockMetadata) {
    encode_header(w, &m.header);
    w.write_u64(m.height);
    w.write_u32(m.tx_count);
    encode_block_status(w, m.status);
    encode_work(w, &m.total_work);
    encode_pointer(w, &m.block_ptr);
    encode_pointer(w, &m.revert_ptr);
}

pub fn decode_block_metadata(r: &mut Reader) -> CodecResult<BlockMetadata> {
    Ok(BlockMetadata {
        header: decode_header(r)?,
        height: r.read_u64()?,
        tx_count: r.read_u32()?,
        status: decode_block_status(r)?,
        total_work: decode_work(r)?,
        block_ptr: decode_pointer(r)?,
        revert_ptr: decode_pointer(r)?,
    })
}

pub fn encode_tx_metadata(w: &mut Writer, m: &TxMetadata) {
    encode_hash(w, &m.txid);
    encode_pointer(w, &m.block_ptr);
    w.write_u32(m.position_in_block);
}

pub fn decode_tx_metadata(r: &mut Reader) -> CodecResult<TxMetadata> {
    Ok(TxMetadata {
        txid: decode_hash(r)?,
        block_ptr: decode_pointer(r)?,
        position_in_block: r.read_u32()?,
    })
}

pub fn encode_utxo_entry(w: &mut Writer, u: &UtxoEntry) {
    encode_hash(w, &u.txid);
    w.write_u32(u.index);
    w.write_u64(u.block_height);
    w.write_i32(u.version);
    w.write_bool(u.is_coinbase);
    encode_output(w, &u.output);
}

pub fn decode_utxo_entry(r: &mut Reader) -> CodecResult<UtxoEntry> {
    Ok(UtxoEntry {
        txid: decode_hash(r)?,
        index: r.read_u32()?,
        block_height: r.read_u64()?,
        version: r.read_i32()?,
        is_coinbase: r.read_bool()?,
        output: decode_output(r)?,
    })
}

pub fn encode_address_metadata(w: &mut Writer, m: &NetworkAddressMetadata) {
    encode_network_address(w, &m.addr);
    w.write_u32(m.last_seen);
    w.write_i32(m.ban_score);
    w.write_bool(m.is_banned);
    w.write_u32(m.ban_expiry);
}

pub fn decode_address_metadata(r: &mut Reader) -> CodecResult<NetworkAddressMetadata> {
    Ok(NetworkAddressMetadata {
        addr: decode_network_address(r)?,
        last_seen: r.read_u32()?,
        ban_score: r.read_i32()?,
        is_banned: r.read_bool()?,
        ban_expiry: r.read_u32()?,
    })
}

// ---- hashing entry points named by spec.md §4.1 ----

/// `SHA256(SHA256(serialize(header)))`.
pub fn hash_block_header(header: &BlockHeader) -> Hash {
    let mut w = Writer::new();
    encode_header(&mut w, header);
    crate::crypto::sha256d(&w.into_bytes())
}

/// `SHA256(SHA256(serialize_without_witnesses(tx)))`.
pub fn txid(tx: &Transaction) -> Hash {
    let mut w = Writer::new();
    encode_tx_body(&mut w, tx);
    crate::crypto::sha256d(&w.into_bytes())
}

/// Computes the merkle root over a block's transaction ids. Odd levels
/// duplicate the last hash, as every Bitcoin-derived chain does.
pub fn merkle_root(txids: &[Hash]) -> Hash {
    if txids.is_empty() {
        return crate::ZERO_HASH;
    }
    let mut level: Vec<Hash> = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(&pair[0]);
                buf.extend_from_slice(&pair[1]);
                crate::crypto::sha256d(&buf)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![Outpoint { ref_tx: [1u8; 32], index: 0 }],
            outputs: vec![Output { amount: 5000, lock_type: LockType::SingleSig, lock_params: vec![1, 2, 3] }],
            lock_time: 0,
            witnesses: vec![vec![9, 9, 9]],
        }
    }

    #[test]
    fn transaction_round_trips() {
        let tx = sample_tx();
        let mut w = Writer::new();
        encode_transaction(&mut w, &tx);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = decode_transaction(&mut r).unwrap();
        r.expect_exhausted().unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn txid_is_independent_of_witnesses() {
        let mut tx = sample_tx();
        let id_before = txid(&tx);
        tx.witnesses = vec![vec![0xff; 200]];
        let id_after = txid(&tx);
        assert_eq!(id_before, id_after);
    }

    #[test]
    fn block_round_trips() {
        let block = Block {
            header: BlockHeader {
                version: 1,
                parent: [0u8; 32],
                merkle_root: merkle_root(&[txid(&sample_tx())]),
                timestamp: 1525003294,
                bits: 0x1dfffff8,
                nonce: 449327816,
            },
            txs: vec![sample_tx()],
        };
        let mut w = Writer::new();
        encode_block(&mut w, &block);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = decode_block(&mut r).unwrap();
        r.expect_exhausted().unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let tx = sample_tx();
        let mut w = Writer::new();
        encode_transaction(&mut w, &tx);
        let mut bytes = w.into_bytes();
        bytes.truncate(bytes.len() - 1);
        let mut r = Reader::new(&bytes);
        assert!(decode_transaction(&mut r).is_err());
    }

    #[test]
    fn unknown_lock_type_is_rejected() {
        let mut w = Writer::new();
        w.write_u64(100);
        w.write_u8(0xEE); // not a valid LockType tag
        w.write_bytes(&[]);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(
            decode_output(&mut r),
            Err(CodecError::UnknownEnum { type_name: "LockType", tag: 0xEE })
        );
    }

    #[test]
    fn network_address_round_trips() {
        let addr = NetworkAddress::from_ipv4([10, 0, 0, 1], 9567, 1);
        let mut w = Writer::new();
        encode_network_address(&mut w, &addr);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(decode_network_address(&mut r).unwrap(), addr);
    }

    #[test]
    fn merkle_root_of_single_tx_is_its_txid() {
        let id = txid(&sample_tx());
        assert_eq!(merkle_root(&[id]), id);
    }
}
