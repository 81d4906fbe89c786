//! Socket-level framing: the magic-byte resync scan and length-delimited
//! read/write of whole messages (spec.md §4.6).
//!
//! Kept separate from [`crate::wire`] so the pure encode/decode logic stays
//! testable without a socket.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::wire::{decode_header_bytes, encode_message, finish_decode, Message, HEADER_LEN};
use thunderbolt_core::params::MAX_MESSAGE_SIZE;

/// Scans `reader` byte-by-byte until four consecutive bytes equal `magic`'s
/// little-endian encoding, then reads and decodes the rest of the header
/// and its payload (spec.md §4.6: "resync on garbage").
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R, magic: u32) -> Result<Message, ProtocolError> {
    let magic_bytes = magic.to_le_bytes();
    let mut window = [0u8; 4];
    reader.read_exact(&mut window).await?;
    while window != magic_bytes {
        window.copy_within(1..4, 0);
        window[3] = reader.read_u8().await?;
    }

    let mut rest = [0u8; HEADER_LEN - 4];
    reader.read_exact(&mut rest).await?;
    let mut header_bytes = [0u8; HEADER_LEN];
    header_bytes[..4].copy_from_slice(&window);
    header_bytes[4..].copy_from_slice(&rest);
    let header = decode_header_bytes(&header_bytes);

    if header.payload_len as usize > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge { got: header.payload_len, max: MAX_MESSAGE_SIZE as u32 });
    }
    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;
    finish_decode(header, &payload)
}

/// Writes one fully framed message. Per spec.md §5, a peer's outbound
/// writes are serialized by construction: callers hold `&mut W` for the
/// duration of the write.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, magic: u32, msg: &Message) -> Result<(), ProtocolError> {
    let bytes = encode_message(magic, msg);
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Message;

    #[tokio::test]
    async fn reads_back_a_message_written_with_no_garbage() {
        let mut buf = Vec::new();
        write_message(&mut buf, 0x746e_6470, &Message::Ping(42)).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor, 0x746e_6470).await.unwrap();
        assert_eq!(decoded, Message::Ping(42));
    }

    #[tokio::test]
    async fn resyncs_past_leading_garbage_bytes() {
        let mut buf = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        write_message(&mut buf, 0x746e_6470, &Message::Verack).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor, 0x746e_6470).await.unwrap();
        assert_eq!(decoded, Message::Verack);
    }

    #[tokio::test]
    async fn reads_two_messages_back_to_back() {
        let mut buf = Vec::new();
        write_message(&mut buf, 0x746e_6470, &Message::Ping(1)).await.unwrap();
        write_message(&mut buf, 0x746e_6470, &Message::Pong(2)).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_message(&mut cursor, 0x746e_6470).await.unwrap(), Message::Ping(1));
        assert_eq!(read_message(&mut cursor, 0x746e_6470).await.unwrap(), Message::Pong(2));
    }
}
