//! Typed network errors (spec.md §7).
//!
//! A [`ProtocolError`] always closes the offending peer and raises its ban
//! score; a [`TimeoutError`] is peer-local recovery only.

use thiserror::Error;
use thunderbolt_core::CodecError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload length {got} exceeds maximum {max}")]
    PayloadTooLarge { got: u32, max: u32 },

    #[error("checksum mismatch for message type {msg_type:#04x}")]
    ChecksumMismatch { msg_type: u16 },

    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u16),

    #[error("malformed payload: {0}")]
    Codec(#[from] CodecError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("dial to {0} timed out")]
    ConnectTimeout(std::net::SocketAddr),

    #[error("no pong received within the configured timeout")]
    PongTimeout,
}

pub type Result<T> = core::result::Result<T, ProtocolError>;
