//! Reliable-UDP transport.
//!
//! `NetChannel` (in [`channel`]) is the whole of the transport layer: packet
//! framing and sequencing ([`packet`]), the application-visible message set
//! ([`message`]) and its wire codec ([`codec`]), the handshake/encryption
//! primitives ([`crypto`]), counters ([`stats`]), a non-blocking socket
//! wrapper ([`socket`]), and address parsing ([`endpoint`]).

pub mod channel;
pub mod codec;
pub mod crypto;
pub mod endpoint;
pub mod message;
pub mod packet;
pub mod socket;
pub mod stats;

pub use channel::{ChannelRole, NetChannel};
pub use codec::{decode_message, encode_message, CodecError};
pub use crypto::{ClientHandshakeKey, CryptoError, SecretStream, ServerIdentity};
pub use endpoint::{EndpointParseError, IpAddress, IpEndpoint};
pub use message::{ChannelMessage, MessageCategory, MessageDirection};
pub use packet::{Acknowledgement, PacketError, PacketFlags, PacketHeader, ReassemblyInfo, SequenceNumber};
pub use socket::{Socket, SocketEvent};
pub use stats::{ConnectionStats, ErrorKind};

use std::time::Duration;

/// Largest encoded datagram this transport will ever send or accept,
/// header included. Chosen to stay under the common internet MTU.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Worst-case header size (`RELIABLE|SPLIT|EARLY_ACKS` all present):
/// 4 checksum + 1 flags + 2 sequence + 6 ack + 4 reassembly.
pub const MAX_HEADER_SIZE: usize = 4 + 1 + 2 + 6 + 4;

/// Largest payload a single packet can carry.
pub const MAX_PACKET_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - MAX_HEADER_SIZE;

/// How many out-of-order reliable packets (or split-message pieces) the
/// receive ring will hold before a channel gives up and closes.
pub const MAX_RECEIVE_RING_CAPACITY: usize = 64;

/// Largest message `write` will accept before splitting would overflow the
/// receive ring's policy capacity on the other end.
pub const MAX_MESSAGE_SIZE: usize = MAX_PACKET_PAYLOAD_SIZE * MAX_RECEIVE_RING_CAPACITY;

/// How often `update` measures round-trip time by sending a fresh `Ping`.
pub const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Time allotted for the three-part handshake to complete before the
/// connecting side gives up.
pub const CONNECT_DURATION: Duration = Duration::from_secs(10);

/// After sending `Disconnect`, how long a channel keeps retransmitting it
/// while waiting for `Close` before giving up anyway.
pub const DISCONNECT_DURATION: Duration = Duration::from_secs(3);

/// Longest chat/console line accepted by `ServerPrint`/`ClientCommand`.
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 256;

/// Longest player name accepted during connect.
pub const MAX_USERNAME_LENGTH: usize = 16;

/// Current wire protocol version, exchanged in the `Connect` message so
/// mismatched builds fail fast instead of desyncing.
pub const PROTOCOL_VERSION: u32 = 1;
