//! Encodes and decodes [`ChannelMessage`]s to/from the wire format in §4.2/§6:
//! a one-byte type tag followed by fields in declaration order, little-endian
//! scalars, `u32`-length-prefixed strings and lists, unprefixed fixed arrays.
//!
//! There's no reflection in Rust to drive a `tie()`-style tuple walk the way
//! the original engine's C++ did, so each variant gets a hand-written
//! `encode`/`decode` pair instead, picked by a `match` on the type tag — same
//! intent (one function pair per message type, dispatched from a small
//! table), no macros, no trait objects.

use crate::math::Vec2;
use crate::net::message::ChannelMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Input ran out before a field's encoding said it should.
    ShortInput,
    /// A length prefix claimed more bytes than remain in the input, a string
    /// wasn't valid UTF-8, or a `type` byte didn't match any known message.
    InvalidPayload,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::ShortInput => write!(f, "message payload shorter than its fields require"),
            CodecError::InvalidPayload => write!(f, "invalid message payload"),
        }
    }
}

/// Message type tags, in protocol order. The transport range (0..=8) is
/// reserved by `NetChannel` itself; application messages start at 9 per §6.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    HandshakePart1 = 0,
    HandshakePart2 = 1,
    HandshakePart3 = 2,
    Connect = 3,
    Disconnect = 4,
    Close = 5,
    Ping = 6,
    Pong = 7,
    EncryptedMessage = 8,
    MapInfo = 9,
    ClientReady = 10,
    PlayerCommand = 11,
    Snapshot = 12,
    ServerPrint = 13,
    ClientCommand = 14,
}

/// A cursor over an in-memory byte slice, tracking how much has been
/// consumed so several messages can be read back-to-back from one payload.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let slice = self.bytes.get(self.pos..self.pos + n).ok_or(CodecError::ShortInput)?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    fn array32(&mut self) -> Result<[u8; 32], CodecError> {
        Ok(self.take(32)?.try_into().unwrap())
    }

    fn array24(&mut self) -> Result<[u8; 24], CodecError> {
        Ok(self.take(24)?.try_into().unwrap())
    }

    fn bytes_list(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidPayload)
    }

    fn vec2(&mut self) -> Result<Vec2, CodecError> {
        let x = self.i16()?;
        let y = self.i16()?;
        Ok(Vec2::new(x, y))
    }
}

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(v as u8);
}

fn put_bytes_list(buf: &mut Vec<u8>, v: &[u8]) {
    put_u32(buf, v.len() as u32);
    buf.extend_from_slice(v);
}

fn put_string(buf: &mut Vec<u8>, v: &str) {
    put_u32(buf, v.len() as u32);
    buf.extend_from_slice(v.as_bytes());
}

fn put_vec2(buf: &mut Vec<u8>, v: Vec2) {
    put_i16(buf, v.x);
    put_i16(buf, v.y);
}

/// Encodes a single message: `[type:1][fields...]`.
pub fn encode_message(msg: &ChannelMessage) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    match msg {
        ChannelMessage::HandshakePart1 { client_public_key, client_nonce } => {
            put_u8(&mut buf, Tag::HandshakePart1 as u8);
            buf.extend_from_slice(client_public_key);
            buf.extend_from_slice(client_nonce);
        }
        ChannelMessage::HandshakePart2 { server_public_key, server_nonce } => {
            put_u8(&mut buf, Tag::HandshakePart2 as u8);
            buf.extend_from_slice(server_public_key);
            buf.extend_from_slice(server_nonce);
        }
        ChannelMessage::HandshakePart3 { token } => {
            put_u8(&mut buf, Tag::HandshakePart3 as u8);
            put_bytes_list(&mut buf, token);
        }
        ChannelMessage::Connect { protocol_version } => {
            put_u8(&mut buf, Tag::Connect as u8);
            put_u32(&mut buf, *protocol_version);
        }
        ChannelMessage::Disconnect { reason } => {
            put_u8(&mut buf, Tag::Disconnect as u8);
            put_string(&mut buf, reason);
        }
        ChannelMessage::Close => {
            put_u8(&mut buf, Tag::Close as u8);
        }
        ChannelMessage::Ping { nonce } => {
            put_u8(&mut buf, Tag::Ping as u8);
            put_u32(&mut buf, *nonce);
        }
        ChannelMessage::Pong { nonce } => {
            put_u8(&mut buf, Tag::Pong as u8);
            put_u32(&mut buf, *nonce);
        }
        ChannelMessage::EncryptedMessage { cipher_text } => {
            put_u8(&mut buf, Tag::EncryptedMessage as u8);
            put_bytes_list(&mut buf, cipher_text);
        }
        ChannelMessage::MapInfo { name, hash } => {
            put_u8(&mut buf, Tag::MapInfo as u8);
            put_string(&mut buf, name);
            put_u32(&mut buf, *hash);
        }
        ChannelMessage::ClientReady => {
            put_u8(&mut buf, Tag::ClientReady as u8);
        }
        ChannelMessage::PlayerCommand { tick, r#move, wish_jump } => {
            put_u8(&mut buf, Tag::PlayerCommand as u8);
            put_u32(&mut buf, *tick);
            put_vec2(&mut buf, *r#move);
            put_bool(&mut buf, *wish_jump);
        }
        ChannelMessage::Snapshot { tick, payload } => {
            put_u8(&mut buf, Tag::Snapshot as u8);
            put_u32(&mut buf, *tick);
            put_bytes_list(&mut buf, payload);
        }
        ChannelMessage::ServerPrint { message } => {
            put_u8(&mut buf, Tag::ServerPrint as u8);
            put_string(&mut buf, message);
        }
        ChannelMessage::ClientCommand { command } => {
            put_u8(&mut buf, Tag::ClientCommand as u8);
            put_string(&mut buf, command);
        }
    }
    Ok(buf)
}

fn decode_one(reader: &mut Reader) -> Result<ChannelMessage, CodecError> {
    let tag = reader.u8()?;
    let msg = match tag {
        t if t == Tag::HandshakePart1 as u8 => ChannelMessage::HandshakePart1 {
            client_public_key: reader.array32()?,
            client_nonce: reader.array24()?,
        },
        t if t == Tag::HandshakePart2 as u8 => ChannelMessage::HandshakePart2 {
            server_public_key: reader.array32()?,
            server_nonce: reader.array24()?,
        },
        t if t == Tag::HandshakePart3 as u8 => ChannelMessage::HandshakePart3 { token: reader.bytes_list()? },
        t if t == Tag::Connect as u8 => ChannelMessage::Connect { protocol_version: reader.u32()? },
        t if t == Tag::Disconnect as u8 => ChannelMessage::Disconnect { reason: reader.string()? },
        t if t == Tag::Close as u8 => ChannelMessage::Close,
        t if t == Tag::Ping as u8 => ChannelMessage::Ping { nonce: reader.u32()? },
        t if t == Tag::Pong as u8 => ChannelMessage::Pong { nonce: reader.u32()? },
        // §4.2: receiving this tag recursively (i.e. from inside an
        // already-decrypted plaintext) is forbidden. `NetChannel` enforces
        // that by never routing an `EncryptedMessage` plaintext back through
        // `decode_message` without first stripping the envelope; decoding it
        // here at the outer (ciphertext) layer is the only legal occurrence.
        t if t == Tag::EncryptedMessage as u8 => ChannelMessage::EncryptedMessage { cipher_text: reader.bytes_list()? },
        t if t == Tag::MapInfo as u8 => ChannelMessage::MapInfo { name: reader.string()?, hash: reader.u32()? },
        t if t == Tag::ClientReady as u8 => ChannelMessage::ClientReady,
        t if t == Tag::PlayerCommand as u8 => ChannelMessage::PlayerCommand {
            tick: reader.u32()?,
            r#move: reader.vec2()?,
            wish_jump: reader.bool()?,
        },
        t if t == Tag::Snapshot as u8 => ChannelMessage::Snapshot {
            tick: reader.u32()?,
            payload: reader.bytes_list()?,
        },
        t if t == Tag::ServerPrint as u8 => ChannelMessage::ServerPrint { message: reader.string()? },
        t if t == Tag::ClientCommand as u8 => ChannelMessage::ClientCommand { command: reader.string()? },
        _ => return Err(CodecError::InvalidPayload),
    };
    Ok(msg)
}

/// Decodes exactly one message; errors if any bytes remain afterward (used
/// for split-reassembled messages and `EncryptedMessage` plaintexts, both of
/// which carry precisely one logical message per buffer).
pub fn decode_message(bytes: &[u8]) -> Result<ChannelMessage, CodecError> {
    let mut reader = Reader::new(bytes);
    let msg = decode_one(&mut reader)?;
    if !reader.is_empty() {
        return Err(CodecError::InvalidPayload);
    }
    Ok(msg)
}

/// Decodes every message packed back-to-back into one packet payload. Each
/// message is self-delimiting (fixed widths plus length-prefixed
/// variable-length fields), so no inter-message separator is needed.
pub fn decode_messages(bytes: &[u8]) -> Result<Vec<ChannelMessage>, CodecError> {
    let mut reader = Reader::new(bytes);
    let mut messages = Vec::new();
    while !reader.is_empty() {
        messages.push(decode_one(&mut reader)?);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        let msg = ChannelMessage::ClientCommand {
            command: "say hi".to_owned(),
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn decodes_several_messages_packed_back_to_back() {
        let a = ChannelMessage::Ping { nonce: 1 };
        let b = ChannelMessage::Pong { nonce: 2 };
        let mut bytes = encode_message(&a).unwrap();
        bytes.extend(encode_message(&b).unwrap());
        assert_eq!(decode_messages(&bytes).unwrap(), vec![a, b]);
    }

    #[test]
    fn unknown_type_byte_is_invalid_payload() {
        assert_eq!(decode_message(&[255]), Err(CodecError::InvalidPayload));
    }

    #[test]
    fn truncated_fixed_array_is_short_input() {
        // HandshakePart1's type byte followed by too few bytes for the keys.
        assert_eq!(decode_message(&[0, 1, 2, 3]), Err(CodecError::ShortInput));
    }

    #[test]
    fn over_long_length_prefix_is_short_input() {
        let mut bytes = vec![Tag::Disconnect as u8];
        bytes.extend_from_slice(&1_000_000u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        assert_eq!(decode_message(&bytes), Err(CodecError::ShortInput));
    }

    #[test]
    fn player_command_roundtrips() {
        let msg = ChannelMessage::PlayerCommand {
            tick: 42,
            r#move: Vec2::new(-3, 7),
            wish_jump: true,
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn snapshot_payload_roundtrips_arbitrary_bytes() {
        let msg = ChannelMessage::Snapshot {
            tick: 7,
            payload: (0..=255u8).collect(),
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }
}
