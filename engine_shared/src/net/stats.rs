//! Per-channel counters and the non-propagating error classification used
//! to report them.

use std::time::Duration;

/// Counted, never-returned classification of something that went wrong on
/// a channel. `NetChannel` bumps the matching counter in [`ConnectionStats`]
/// and keeps running; nothing here is meant to be `?`-propagated the way an
/// `anyhow::Error` is; a malformed packet from a flaky peer is an expected
/// event, not a setup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Datagram failed CRC validation before a header could even be parsed.
    MalformedPacket,
    /// Header parsed, but flag combination or optional field layout was
    /// inconsistent.
    InvalidHeader,
    /// Message body failed to deserialize, or a reliable message arrived
    /// out of the sender's enqueue order.
    MalformedMessage,
    /// AEAD authentication failed on a `Secret` message; the message is
    /// dropped but the stream's own state is untouched.
    DecryptionFailed,
    /// The handshake did not complete within `CONNECT_DURATION`.
    HandshakeTimedOut,
    /// No traffic from a connected peer within the configured timeout.
    TimedOut,
    /// A ping was sent but no matching pong arrived within the configured
    /// grace period.
    PingTimedOut,
    /// A write or split would have needed more send/receive buffer capacity
    /// than the channel's policy allows.
    BufferOverflow,
    /// The OS socket call itself failed (not a framing/protocol issue).
    SocketError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorKind::MalformedPacket => "malformed packet",
            ErrorKind::InvalidHeader => "invalid packet header",
            ErrorKind::MalformedMessage => "malformed or out-of-order message",
            ErrorKind::DecryptionFailed => "decryption failed",
            ErrorKind::HandshakeTimedOut => "handshake timed out",
            ErrorKind::TimedOut => "connection timed out",
            ErrorKind::PingTimedOut => "ping response timed out",
            ErrorKind::BufferOverflow => "send or receive buffer overflow",
            ErrorKind::SocketError => "socket error",
        };
        write!(f, "{text}")
    }
}

/// Running counters for one `NetChannel`. Exposed for diagnostics/console
/// output; nothing in the channel's own logic reads these back.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub packets_lost: u64,
    pub packets_acked: u64,
    pub retransmits: u64,
    /// Messages skipped because the outbound send buffer was over the
    /// configured high-water mark when `send_packets` ran.
    pub send_rate_throttle_count: u64,
    pub errors: [u64; 9],
    pub round_trip_time: Duration,
}

impl ConnectionStats {
    pub fn record_error(&mut self, kind: ErrorKind) {
        self.errors[kind as usize] += 1;
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors[kind as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_increments_matching_counter() {
        let mut stats = ConnectionStats::default();
        stats.record_error(ErrorKind::TimedOut);
        stats.record_error(ErrorKind::TimedOut);
        stats.record_error(ErrorKind::SocketError);
        assert_eq!(stats.error_count(ErrorKind::TimedOut), 2);
        assert_eq!(stats.error_count(ErrorKind::SocketError), 1);
        assert_eq!(stats.error_count(ErrorKind::MalformedPacket), 0);
    }
}
