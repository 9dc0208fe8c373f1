//! Packet framing: header flags, sequence numbers and the CRC32-checked
//! wire format each UDP datagram is wrapped in.

use bitflags::bitflags;

/// Protocol tag folded into every checksum. A datagram from an unrelated
/// protocol (or stray traffic) fails the checksum before any other parsing
/// happens — there is no separately transmitted protocol-id field.
const PROTOCOL_TAG: &[u8] = b"AF2V2";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketFlags: u8 {
        /// Payload is deflate-compressed. Reserved: never set by this
        /// implementation, but parsed so a future sender can turn it on
        /// without breaking older receivers.
        const COMPRESSED = 1 << 1;
        /// Payload carries a reliable message (or a piece of one).
        const RELIABLE = 1 << 2;
        /// Payload is one piece of a message too large for one packet.
        /// Implies `RELIABLE`.
        const SPLIT = 1 << 3;
        /// This is the final piece of a split message. Implies `SPLIT`.
        const LAST_PIECE = 1 << 4;
        /// Header carries a piggybacked ack (sequence + mask) for the
        /// remote peer's send stream, independent of whether this packet
        /// itself is reliable.
        const EARLY_ACKS = 1 << 5;
    }
}

/// A 16-bit sequence number that wraps around, with "is this more recent"
/// comparisons defined by signed wrap distance rather than simple `<`/`>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceNumber(pub u16);

impl SequenceNumber {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Signed distance `self - other`, valid as long as the two numbers are
    /// within half the sequence space of each other.
    pub fn wrapping_distance(self, other: Self) -> i32 {
        (self.0.wrapping_sub(other.0) as i16) as i32
    }

    pub fn is_more_recent_than(self, other: Self) -> bool {
        self.wrapping_distance(other) > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Highest contiguous sequence number the remote peer has fully
    /// handled; every packet at or before this point can be dropped from
    /// the sender's retransmit buffer.
    pub sequence: SequenceNumber,
    /// Bit `i` set means `sequence + 1 + i` was also received, but sits in
    /// the peer's receive ring because an earlier packet is still missing.
    pub mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyInfo {
    /// Identifies which oversized message this piece belongs to.
    pub message_id: u16,
    pub piece_index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub flags: PacketFlags,
    pub sequence: SequenceNumber,
    pub ack: Option<Acknowledgement>,
    pub reassembly: Option<ReassemblyInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    TooShort,
    ChecksumMismatch,
    InconsistentFlags,
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::TooShort => write!(f, "packet shorter than its header"),
            PacketError::ChecksumMismatch => write!(f, "checksum mismatch"),
            PacketError::InconsistentFlags => write!(f, "flag combination implies a field that isn't set"),
        }
    }
}

fn checksum(body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(PROTOCOL_TAG);
    hasher.update(body);
    hasher.finalize()
}

impl PacketHeader {
    /// Validates flag implications (`SPLIT` implies `RELIABLE`, `LAST_PIECE`
    /// implies `SPLIT`) and that the optional fields agree with the flags.
    pub fn validate(&self) -> Result<(), PacketError> {
        if self.flags.contains(PacketFlags::LAST_PIECE) && !self.flags.contains(PacketFlags::SPLIT) {
            return Err(PacketError::InconsistentFlags);
        }
        if self.flags.contains(PacketFlags::SPLIT) && !self.flags.contains(PacketFlags::RELIABLE) {
            return Err(PacketError::InconsistentFlags);
        }
        if self.flags.contains(PacketFlags::EARLY_ACKS) != self.ack.is_some() {
            return Err(PacketError::InconsistentFlags);
        }
        if self.flags.contains(PacketFlags::SPLIT) != self.reassembly.is_some() {
            return Err(PacketError::InconsistentFlags);
        }
        Ok(())
    }

    /// Encodes header + payload into a single checksummed datagram:
    /// `[checksum:4][flags:1][sequence:2][ack?][reassembly?][payload]`, where
    /// the checksum covers the fixed protocol tag followed by everything
    /// after it.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
        self.validate()?;

        let mut body = Vec::with_capacity(1 + 2 + 6 + 4 + payload.len());
        body.push(self.flags.bits());
        body.extend_from_slice(&self.sequence.0.to_le_bytes());
        if let Some(ack) = self.ack {
            body.extend_from_slice(&ack.sequence.0.to_le_bytes());
            body.extend_from_slice(&ack.mask.to_le_bytes());
        }
        if let Some(reassembly) = self.reassembly {
            body.extend_from_slice(&reassembly.message_id.to_le_bytes());
            body.extend_from_slice(&reassembly.piece_index.to_le_bytes());
        }
        body.extend_from_slice(payload);

        let crc = checksum(&body);
        let mut packet = Vec::with_capacity(4 + body.len());
        packet.extend_from_slice(&crc.to_le_bytes());
        packet.extend_from_slice(&body);
        Ok(packet)
    }

    /// Decodes a datagram, returning the header and a slice of the payload
    /// that follows it. A checksum mismatch covers both corruption and
    /// traffic from an unrelated protocol.
    pub fn decode(datagram: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        if datagram.len() < 5 {
            return Err(PacketError::TooShort);
        }
        let expected_crc = u32::from_le_bytes(datagram[0..4].try_into().unwrap());
        let body = &datagram[4..];
        if checksum(body) != expected_crc {
            return Err(PacketError::ChecksumMismatch);
        }

        let mut cursor = 0usize;
        let flags = PacketFlags::from_bits_truncate(*body.get(cursor).ok_or(PacketError::TooShort)?);
        cursor += 1;

        let sequence = SequenceNumber(read_u16(body, &mut cursor)?);

        let ack = if flags.contains(PacketFlags::EARLY_ACKS) {
            let sequence = SequenceNumber(read_u16(body, &mut cursor)?);
            let mask = read_u32(body, &mut cursor)?;
            Some(Acknowledgement { sequence, mask })
        } else {
            None
        };

        let reassembly = if flags.contains(PacketFlags::SPLIT) {
            let message_id = read_u16(body, &mut cursor)?;
            let piece_index = read_u16(body, &mut cursor)?;
            Some(ReassemblyInfo { message_id, piece_index })
        } else {
            None
        };

        let header = PacketHeader {
            flags,
            sequence,
            ack,
            reassembly,
        };
        header.validate()?;
        Ok((header, &body[cursor..]))
    }
}

fn read_u16(body: &[u8], cursor: &mut usize) -> Result<u16, PacketError> {
    let bytes = body.get(*cursor..*cursor + 2).ok_or(PacketError::TooShort)?;
    *cursor += 2;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32(body: &[u8], cursor: &mut usize) -> Result<u32, PacketError> {
    let bytes = body.get(*cursor..*cursor + 4).ok_or(PacketError::TooShort)?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_minimal_header() {
        let header = PacketHeader {
            flags: PacketFlags::empty(),
            sequence: SequenceNumber(7),
            ack: None,
            reassembly: None,
        };
        let packet = header.encode(b"hello").unwrap();
        let (decoded, payload) = PacketHeader::decode(&packet).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn roundtrip_with_ack_and_split() {
        let header = PacketHeader {
            flags: PacketFlags::RELIABLE | PacketFlags::SPLIT | PacketFlags::EARLY_ACKS,
            sequence: SequenceNumber(400),
            ack: Some(Acknowledgement {
                sequence: SequenceNumber(399),
                mask: 0b1011,
            }),
            reassembly: Some(ReassemblyInfo {
                message_id: 12,
                piece_index: 3,
            }),
        };
        let packet = header.encode(b"chunk").unwrap();
        let (decoded, payload) = PacketHeader::decode(&packet).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(payload, b"chunk");
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let header = PacketHeader {
            flags: PacketFlags::empty(),
            sequence: SequenceNumber(1),
            ack: None,
            reassembly: None,
        };
        let mut packet = header.encode(b"hello").unwrap();
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;
        assert_eq!(PacketHeader::decode(&packet), Err(PacketError::ChecksumMismatch));
    }

    #[test]
    fn last_piece_without_split_is_rejected() {
        let header = PacketHeader {
            flags: PacketFlags::LAST_PIECE,
            sequence: SequenceNumber(1),
            ack: None,
            reassembly: None,
        };
        assert_eq!(header.encode(b""), Err(PacketError::InconsistentFlags));
    }

    #[test]
    fn sequence_wraparound_ordering() {
        let a = SequenceNumber(65535);
        let b = SequenceNumber(1);
        assert!(b.is_more_recent_than(a));
        assert!(!a.is_more_recent_than(b));
    }
}
