//! Error types shared by the codec and cryptographic helpers.
//!
//! Higher layers (`thunderbolt-chain`, `thunderbolt-network`) define their
//! own error enums for their own concerns and wrap these where a lower-level
//! failure bubbles up; see spec.md §7.

use thiserror::Error;

/// Errors raised while encoding or decoding the fixed-endian wire/storage
/// format of §4.1.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("truncated input: needed {needed} bytes, had {had}")]
    TruncatedInput { needed: usize, had: usize },

    #[error("length {got} exceeds maximum {max}")]
    LengthOverflow { got: usize, max: usize },

    #[error("unknown enum tag {tag} for {type_name}")]
    UnknownEnum { type_name: &'static str, tag: u32 },
}

/// Result alias for codec operations.
pub type CodecResult<T> = core::result::Result<T, CodecError>;

/// Errors raised by the cryptographic helpers in [`crate::crypto`].
///
/// Per spec.md §7, a `CryptoError` is always a validation failure, never a
/// process-aborting condition.
#[derive(Debug, Error, Clone)]
pub enum CryptoError {
    #[error("malformed public key")]
    BadPublicKey,

    #[error("malformed signature")]
    BadSignature,

    #[error("signature does not verify")]
    VerificationFailed,
}
