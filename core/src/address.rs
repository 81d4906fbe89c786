//! Human-readable address encoding (spec.md §6).
//!
//! `"0x" || hex(prefix(1) || hash160(20) || checksum(4))`, fixed total
//! string length 52 (`2 + 2*(1+20+4)`). The checksum is the first four bytes
//! of `SHA256(prefix || hash160)` — spec.md §9 notes the source computed
//! this two different ways across files and names this the authoritative
//! one.

use thiserror::Error;

use crate::crypto::{ripemd160_sha256, sha256d};

/// Address version byte, selecting which [`crate::LockType`] the address
/// unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressPrefix {
    SingleSig = 0x10,
    MultiSig = 0x20,
}

impl AddressPrefix {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x10 => Some(Self::SingleSig),
            0x20 => Some(Self::MultiSig),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AddressError {
    #[error("address string has the wrong length")]
    WrongLength,
    #[error("address is missing the 0x prefix")]
    MissingPrefix,
    #[error("address is not valid hex")]
    InvalidHex,
    #[error("unknown address version byte {0:#04x}")]
    UnknownPrefix(u8),
    #[error("checksum mismatch")]
    BadChecksum,
}

/// A decoded address: a prefix plus the 20-byte hash it commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub prefix: AddressPrefix,
    pub hash160: [u8; 20],
}

const ENCODED_LEN: usize = 52; // "0x" + 2 * (1 + 20 + 4)

impl Address {
    /// Builds an address committing to `pubkey_or_multisig_hash`, which
    /// must already be `RIPEMD160(SHA256(...))` per spec.md §6 — callers
    /// pass a single public key for `SingleSig` or the serialized
    /// `(M, pubkeys)` tuple's hash160 for `MultiSig`.
    pub fn new(prefix: AddressPrefix, hash160: [u8; 20]) -> Self {
        Self { prefix, hash160 }
    }

    /// Convenience constructor hashing a raw public key for `SingleSig`.
    pub fn from_single_sig_pubkey(pubkey: &[u8]) -> Self {
        Self::new(AddressPrefix::SingleSig, ripemd160_sha256(pubkey))
    }

    fn checksum(&self) -> [u8; 4] {
        let mut preimage = Vec::with_capacity(21);
        preimage.push(self.prefix as u8);
        preimage.extend_from_slice(&self.hash160);
        let digest = sha256d(&preimage);
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest[..4]);
        out
    }

    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(25);
        raw.push(self.prefix as u8);
        raw.extend_from_slice(&self.hash160);
        raw.extend_from_slice(&self.checksum());
        format!("0x{}", hex::encode(raw))
    }

    pub fn decode(s: &str) -> Result<Self, AddressError> {
        if s.len() != ENCODED_LEN {
            return Err(AddressError::WrongLength);
        }
        let body = s.strip_prefix("0x").ok_or(AddressError::MissingPrefix)?;
        let raw = hex::decode(body).map_err(|_| AddressError::InvalidHex)?;
        if raw.len() != 25 {
            return Err(AddressError::WrongLength);
        }
        let prefix = AddressPrefix::from_byte(raw[0]).ok_or(AddressError::UnknownPrefix(raw[0]))?;
        let mut hash160 = [0u8; 20];
        hash160.copy_from_slice(&raw[1..21]);
        let addr = Address::new(prefix, hash160);
        let expected = &raw[21..25];
        if addr.checksum() != expected {
            return Err(AddressError::BadChecksum);
        }
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let addr = Address::new(AddressPrefix::SingleSig, [7u8; 20]);
        let encoded = addr.encode();
        assert_eq!(encoded.len(), ENCODED_LEN);
        assert_eq!(Address::decode(&encoded).unwrap(), addr);
    }

    #[test]
    fn multisig_prefix_round_trips() {
        let addr = Address::new(AddressPrefix::MultiSig, [0xab; 20]);
        let encoded = addr.encode();
        assert_eq!(Address::decode(&encoded).unwrap(), addr);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let addr = Address::new(AddressPrefix::SingleSig, [1u8; 20]);
        let mut encoded = addr.encode();
        // Flip the last hex digit, which lives inside the checksum.
        let last = encoded.pop().unwrap();
        let replacement = if last == '0' { '1' } else { '0' };
        encoded.push(replacement);
        assert_eq!(Address::decode(&encoded), Err(AddressError::BadChecksum));
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        // manually construct bytes with an invalid prefix byte
        let mut raw = vec![0x30u8]; // not a recognised prefix
        raw.extend_from_slice(&[2u8; 20]);
        let digest = sha256d(&raw);
        raw.extend_from_slice(&digest[..4]);
        let s = format!("0x{}", hex::encode(raw));
        assert!(matches!(Address::decode(&s), Err(AddressError::UnknownPrefix(0x30))));
    }
}
