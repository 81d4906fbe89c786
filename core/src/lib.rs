//! Thunderbolt core library.
//!
//! Provides the data model (§3), the fixed-endian wire/storage codec (§4.1),
//! proof-of-work helpers (§4.4.4), address encoding (§6) and the consensus
//! constants (§4.4.2/§4.4.4) shared by every other crate in the workspace.
//! Nothing here touches sockets or the filesystem.

pub mod address;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod model;
pub mod params;
pub mod pow;

pub use error::{CodecError, CodecResult, CryptoError};
pub use model::*;

/// Opaque 32-byte hash. Equality, ordering and hex rendering only — no
/// arithmetic.
pub type Hash = [u8; 32];

/// Renders a [`Hash`] as lowercase hex, matching how block/tx ids are shown
/// throughout logs and the CLI.
pub fn hash_to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Parses a lowercase (or uppercase) hex string into a [`Hash`].
pub fn hash_from_hex(s: &str) -> Result<Hash, hex::FromHexError> {
    let bytes = hex::decode(s)?;
    let mut out = [0u8; 32];
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub const ZERO_HASH: Hash = [0u8; 32];
