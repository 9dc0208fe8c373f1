//! Message categories and the wire-level message enum.
//!
//! The original engine dispatched messages through a C++ template
//! `TypeList`/`tie()` reflection system. That has no good Rust analogue and
//! isn't idiomatic here, so every message this channel can carry is folded
//! into one tagged enum (`ChannelMessage`) and dispatch is a plain `match` —
//! no trait objects, no vtable.

use crate::math::Vec2;

/// Governs how a message is scheduled for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// Fire-and-forget. Lost if the packet carrying it is lost.
    Unreliable,
    /// Retransmitted until acknowledged, delivered in order, reassembled if split.
    Reliable,
    /// Like `Reliable`, but only valid once the channel has completed its
    /// handshake and established an encrypted stream.
    Secret,
}

/// Which side originates a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageDirection {
    /// Client -> server.
    Input,
    /// Server -> client.
    Output,
}

/// Every message `NetChannel` can carry, client- or server-originated,
/// tagged by variant for wire dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// First leg of the handshake: client presents its public key and a
    /// client-chosen nonce.
    HandshakePart1 { client_public_key: [u8; 32], client_nonce: [u8; 24] },
    /// Second leg: server presents its own public key and nonce.
    HandshakePart2 { server_public_key: [u8; 32], server_nonce: [u8; 24] },
    /// Third leg: client proves it derived the same session key by echoing
    /// a token encrypted under it.
    HandshakePart3 { token: Vec<u8> },

    /// Requests a new connection (sent unreliably, unencrypted, before any
    /// handshake state exists).
    Connect { protocol_version: u32 },
    /// Politely tears down the channel with a human-readable reason.
    Disconnect { reason: String },
    /// Acknowledges a `Disconnect` so the sender can stop retransmitting it.
    Close,

    /// Round-trip time probe.
    Ping { nonce: u32 },
    Pong { nonce: u32 },

    /// Server -> client: which map to load.
    MapInfo { name: String, hash: u32 },
    /// Client -> server: map is loaded, ready to receive snapshots.
    ClientReady,

    /// Client -> server: input for one simulation tick.
    PlayerCommand { tick: u32, r#move: Vec2, wish_jump: bool },
    /// Server -> client: authoritative world snapshot.
    Snapshot { tick: u32, payload: Vec<u8> },

    /// Server -> client: console/chat text. Sent as a `Secret` message: the
    /// body above is what gets encrypted, never what goes on the wire.
    ServerPrint { message: String },
    /// Client -> server: a console command line. Also `Secret`.
    ClientCommand { command: String },

    /// Wire envelope for any `Secret` message once pushed through the
    /// sender's `SecretStream`. Never constructed directly by application
    /// code; `NetChannel::write` builds one from the plaintext message it is
    /// given and re-tags the outgoing entry `Reliable` before buffering it.
    EncryptedMessage { cipher_text: Vec<u8> },
}

impl ChannelMessage {
    pub fn category(&self) -> MessageCategory {
        use ChannelMessage::*;
        match self {
            Connect { .. } | Ping { .. } | Pong { .. } | PlayerCommand { .. } | Snapshot { .. } => {
                MessageCategory::Unreliable
            }
            Disconnect { .. } | Close | MapInfo { .. } | ClientReady | HandshakePart1 { .. }
            | HandshakePart2 { .. } | HandshakePart3 { .. } | EncryptedMessage { .. } => {
                MessageCategory::Reliable
            }
            ServerPrint { .. } | ClientCommand { .. } => MessageCategory::Secret,
        }
    }

    pub fn direction(&self) -> MessageDirection {
        use ChannelMessage::*;
        match self {
            HandshakePart1 { .. } | HandshakePart3 { .. } | Connect { .. } | PlayerCommand { .. }
            | ClientReady | ClientCommand { .. } | Ping { .. } => MessageDirection::Input,
            HandshakePart2 { .. } | MapInfo { .. } | Snapshot { .. } | ServerPrint { .. }
            | Pong { .. } => MessageDirection::Output,
            // Symmetric control messages: either side may send these.
            Disconnect { .. } | Close | EncryptedMessage { .. } => MessageDirection::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliable_messages_are_categorized_correctly() {
        assert_eq!(ChannelMessage::ClientReady.category(), MessageCategory::Reliable);
        assert_eq!(
            ChannelMessage::Ping { nonce: 0 }.category(),
            MessageCategory::Unreliable
        );
        assert_eq!(
            ChannelMessage::HandshakePart1 {
                client_public_key: [0; 32],
                client_nonce: [0; 24]
            }
            .category(),
            MessageCategory::Reliable
        );
        assert_eq!(
            ChannelMessage::ClientCommand { command: "say hi".into() }.category(),
            MessageCategory::Secret
        );
    }
}
