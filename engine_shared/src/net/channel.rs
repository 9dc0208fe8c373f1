//! `NetChannel`: the reliable-UDP connection state machine.
//!
//! One `NetChannel` drives one peer connection over a shared, already-bound
//! [`Socket`]. Everything here is synchronous and non-blocking: `update`
//! advances timers, `receive_packet` processes one already-read datagram,
//! and `send_packets` flushes queued messages. The caller (`engine_server`'s
//! per-client loop, `engine_client`'s connection loop) is responsible for
//! actually polling the socket and invoking these in a tick.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::codec::{decode_message, decode_messages, encode_message};
use super::crypto::{tokens_match, ClientHandshakeKey, SecretStream, ServerIdentity, MAX_STREAM_MESSAGE_SIZE};
use super::endpoint::IpEndpoint;
use super::message::{ChannelMessage, MessageCategory};
use super::packet::{Acknowledgement, PacketError, PacketFlags, PacketHeader, ReassemblyInfo, SequenceNumber};
use super::socket::{Socket, SocketEvent};
use super::stats::{ConnectionStats, ErrorKind};
use super::{DISCONNECT_DURATION, MAX_MESSAGE_SIZE, MAX_PACKET_PAYLOAD_SIZE, MAX_RECEIVE_RING_CAPACITY, PING_INTERVAL};

/// Plaintext both sides agree on ahead of time; the client proves it
/// derived the right session key by successfully encrypting this under its
/// send stream, which the server must then successfully decrypt and match.
const HANDSHAKE_TOKEN: &[u8] = b"net-channel-handshake-ok";

/// Which side of the connection this channel represents. Determines who
/// initiates the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Initiates the handshake by sending `HandshakePart1`.
    Client,
    /// Waits for `HandshakePart1`, holds the long-term identity key.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHandshakePart1,
    AwaitingHandshakePart2,
    AwaitingHandshakePart3,
    Connected,
    DisconnectingMyself,
    DisconnectingPeer,
    Closed,
}

struct OutgoingPacket {
    sequence: SequenceNumber,
    flags: PacketFlags,
    reassembly: Option<ReassemblyInfo>,
    payload: Vec<u8>,
    attempts: u32,
}

struct IncomingPacket {
    flags: PacketFlags,
    reassembly: Option<ReassemblyInfo>,
    payload: Vec<u8>,
}

/// One end of a reliable-UDP connection: handshake, sequencing/ack,
/// splitting/reassembly, encryption envelope, throttling and timeouts.
pub struct NetChannel {
    role: ChannelRole,
    remote: IpEndpoint,
    state: State,
    stats: ConnectionStats,

    latest_seq_sent: SequenceNumber,
    latest_seq_handled: SequenceNumber,
    send_buffer: VecDeque<OutgoingPacket>,
    receive_buffer: BTreeMap<u16, IncomingPacket>,
    current_split: Option<(u16, Vec<u8>)>,
    next_message_id: u16,

    buffered_messages: VecDeque<(MessageCategory, Vec<u8>)>,

    throttle_period: u32,
    throttle_counter: u32,
    throttle_high_water_mark: usize,
    throttle_max_period: u32,

    timeout: Duration,
    last_receive_time: Instant,
    next_ping_time: Instant,
    last_ping_nonce: u32,
    last_ping_sent_at: Option<Instant>,

    handshake_deadline: Instant,
    disconnect_deadline: Option<Instant>,
    disconnect_message: Option<String>,

    client_handshake_key: Option<ClientHandshakeKey>,
    client_nonce: Option<[u8; 24]>,
    server_identity: Option<Arc<ServerIdentity>>,

    send_stream: Option<SecretStream>,
    recv_stream: Option<SecretStream>,
    recv_message_counter: u64,
}

impl NetChannel {
    fn new(
        role: ChannelRole,
        remote: IpEndpoint,
        timeout: Duration,
        throttle_high_water_mark: usize,
        throttle_max_period: Duration,
        now: Instant,
    ) -> Self {
        Self {
            role,
            remote,
            state: State::AwaitingHandshakePart1,
            stats: ConnectionStats::default(),

            latest_seq_sent: SequenceNumber::default(),
            latest_seq_handled: SequenceNumber::default(),
            send_buffer: VecDeque::new(),
            receive_buffer: BTreeMap::new(),
            current_split: None,
            next_message_id: 0,

            buffered_messages: VecDeque::new(),

            throttle_period: 0,
            throttle_counter: 0,
            throttle_high_water_mark: throttle_high_water_mark.max(1),
            throttle_max_period: throttle_max_period.as_millis().min(u32::MAX as u128) as u32,

            timeout,
            last_receive_time: now,
            next_ping_time: now + PING_INTERVAL,
            last_ping_nonce: 0,
            last_ping_sent_at: None,

            handshake_deadline: now + super::CONNECT_DURATION,
            disconnect_deadline: None,
            disconnect_message: None,

            client_handshake_key: None,
            client_nonce: None,
            server_identity: None,

            send_stream: None,
            recv_stream: None,
            recv_message_counter: 0,
        }
    }

    /// Starts a client-side channel: generates a fresh ephemeral handshake
    /// key and queues `HandshakePart1`.
    pub fn connect(
        remote: IpEndpoint,
        timeout: Duration,
        throttle_high_water_mark: usize,
        throttle_max_period: Duration,
        now: Instant,
    ) -> Self {
        let mut channel = Self::new(ChannelRole::Client, remote, timeout, throttle_high_water_mark, throttle_max_period, now);
        let handshake_key = ClientHandshakeKey::generate();
        let client_nonce = SecretStream::random_nonce();
        channel.state = State::AwaitingHandshakePart2;
        channel.write(ChannelMessage::HandshakePart1 {
            client_public_key: handshake_key.public_key,
            client_nonce,
        });
        channel.client_handshake_key = Some(handshake_key);
        channel.client_nonce = Some(client_nonce);
        channel
    }

    /// Starts a server-side channel bound to a specific remote address,
    /// waiting for that client's `HandshakePart1`.
    pub fn accept(
        remote: IpEndpoint,
        identity: Arc<ServerIdentity>,
        timeout: Duration,
        throttle_high_water_mark: usize,
        throttle_max_period: Duration,
        now: Instant,
    ) -> Self {
        let mut channel = Self::new(ChannelRole::Server, remote, timeout, throttle_high_water_mark, throttle_max_period, now);
        channel.server_identity = Some(identity);
        channel
    }

    pub fn remote(&self) -> IpEndpoint {
        self.remote
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn disconnect_message(&self) -> Option<&str> {
        self.disconnect_message.as_deref()
    }

    /// Enqueues an outbound message for the next `send_packets`. Returns
    /// `false` (without closing the channel) if the message is too large,
    /// or a `Secret` message is written before the handshake completed.
    pub fn write(&mut self, msg: ChannelMessage) -> bool {
        let category = msg.category();
        let plaintext = match encode_message(&msg) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.stats.record_error(ErrorKind::MalformedMessage);
                return false;
            }
        };

        let (wire_category, bytes) = if category == MessageCategory::Secret {
            if plaintext.len() > MAX_STREAM_MESSAGE_SIZE {
                self.stats.record_error(ErrorKind::BufferOverflow);
                return false;
            }
            let Some(stream) = self.send_stream.as_mut() else {
                self.stats.record_error(ErrorKind::MalformedMessage);
                return false;
            };
            let cipher_text = match stream.push(&plaintext) {
                Ok(c) => c,
                Err(_) => {
                    self.stats.record_error(ErrorKind::DecryptionFailed);
                    return false;
                }
            };
            let envelope = ChannelMessage::EncryptedMessage { cipher_text };
            match encode_message(&envelope) {
                Ok(bytes) => (MessageCategory::Reliable, bytes),
                Err(_) => {
                    self.stats.record_error(ErrorKind::MalformedMessage);
                    return false;
                }
            }
        } else {
            (category, plaintext)
        };

        if bytes.len() > MAX_MESSAGE_SIZE {
            self.stats.record_error(ErrorKind::BufferOverflow);
            return false;
        }

        self.buffered_messages.push_back((wire_category, bytes));
        self.stats.messages_sent += 1;
        true
    }

    /// Politely tears the channel down: queues `Disconnect` and waits
    /// either for the peer's `Close` or for `delay` to pass, whichever is
    /// first. `delay` is clamped to the channel's own timeout so a caller
    /// can't keep a half-dead channel alive indefinitely.
    pub fn disconnect(&mut self, reason: impl Into<String>, delay: Duration, now: Instant) {
        if self.state == State::Closed {
            return;
        }
        let reason = reason.into();
        self.write(ChannelMessage::Disconnect { reason: reason.clone() });
        self.disconnect_message = Some(reason);
        self.state = State::DisconnectingMyself;
        self.disconnect_deadline = Some(now + delay.min(self.timeout));
    }

    /// Closes immediately without notifying the peer.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }

    fn begin_close(&mut self, message: Option<String>) {
        if message.is_some() {
            self.disconnect_message = message;
        }
        self.state = State::Closed;
    }

    /// Advances timers: handshake/idle timeouts, the disconnect deadline
    /// and the ping schedule. Returns `false` once the channel is closed.
    pub fn update(&mut self, now: Instant) -> bool {
        match self.state {
            State::Closed => return false,
            State::Connected => {
                if now.duration_since(self.last_receive_time) >= self.timeout {
                    self.stats.record_error(ErrorKind::TimedOut);
                    self.begin_close(Some("Connection timed out (not receiving packets).".to_string()));
                } else if self
                    .last_ping_sent_at
                    .is_some_and(|sent_at| now.duration_since(sent_at) > self.timeout.max(Duration::from_secs(2)))
                {
                    self.stats.record_error(ErrorKind::PingTimedOut);
                    self.begin_close(Some("Connection timed out (not receiving ping responses).".to_string()));
                } else {
                    let mut due = false;
                    while now >= self.next_ping_time {
                        self.next_ping_time += PING_INTERVAL;
                        due = true;
                    }
                    if due {
                        self.last_ping_nonce = self.last_ping_nonce.wrapping_add(1);
                        self.last_ping_sent_at = Some(now);
                        let nonce = self.last_ping_nonce;
                        self.write(ChannelMessage::Ping { nonce });
                    }
                }
            }
            State::DisconnectingMyself | State::DisconnectingPeer => {
                if let Some(deadline) = self.disconnect_deadline {
                    if now >= deadline {
                        self.state = State::Closed;
                    }
                }
            }
            _ => {
                if now >= self.handshake_deadline {
                    self.stats.record_error(ErrorKind::HandshakeTimedOut);
                    self.begin_close(Some("Connection handshake timed out.".to_string()));
                }
            }
        }
        self.state != State::Closed
    }

    /// Processes one raw inbound datagram, returning every application
    /// message it yielded (transport/handshake messages are consumed
    /// internally and never appear here).
    pub fn receive_packet(&mut self, data: &[u8], now: Instant) -> Vec<ChannelMessage> {
        let mut dispatched = Vec::new();
        if self.state == State::Closed {
            return dispatched;
        }

        let (header, payload) = match PacketHeader::decode(data) {
            Ok(v) => v,
            Err(PacketError::InconsistentFlags) => {
                self.stats.record_error(ErrorKind::InvalidHeader);
                return dispatched;
            }
            Err(_) => {
                self.stats.record_error(ErrorKind::MalformedPacket);
                return dispatched;
            }
        };

        self.stats.packets_received += 1;
        self.stats.bytes_received += data.len() as u64;
        self.last_receive_time = now;

        if let Some(ack) = header.ack {
            self.acknowledge(ack);
        }

        if header.flags.contains(PacketFlags::RELIABLE) {
            let seq = header.sequence;
            let expected = self.latest_seq_handled.next();
            if seq == expected {
                self.handle_reliable_payload(header.flags, header.reassembly, payload.to_vec(), now, &mut dispatched);
                self.latest_seq_handled = seq;
                self.drain_receive_buffer(now, &mut dispatched);
            } else if seq.is_more_recent_than(self.latest_seq_handled) {
                if self.receive_buffer.len() >= MAX_RECEIVE_RING_CAPACITY {
                    self.stats.record_error(ErrorKind::BufferOverflow);
                    self.begin_close(Some("Receive buffer overflow.".to_string()));
                } else {
                    self.receive_buffer.insert(
                        seq.0,
                        IncomingPacket {
                            flags: header.flags,
                            reassembly: header.reassembly,
                            payload: payload.to_vec(),
                        },
                    );
                }
            }
            // seq <= latest_seq_handled: duplicate retransmit, drop silently.
        } else if !payload.is_empty() {
            match decode_messages(payload) {
                Ok(msgs) => {
                    for msg in msgs {
                        self.handle_incoming_message(msg, now, &mut dispatched);
                    }
                }
                Err(_) => self.stats.record_error(ErrorKind::MalformedMessage),
            }
        }

        dispatched
    }

    fn drain_receive_buffer(&mut self, now: Instant, dispatched: &mut Vec<ChannelMessage>) {
        loop {
            let next = self.latest_seq_handled.next();
            match self.receive_buffer.remove(&next.0) {
                Some(pkt) => {
                    self.handle_reliable_payload(pkt.flags, pkt.reassembly, pkt.payload, now, dispatched);
                    self.latest_seq_handled = next;
                }
                None => break,
            }
        }
    }

    fn handle_reliable_payload(
        &mut self,
        flags: PacketFlags,
        reassembly: Option<ReassemblyInfo>,
        payload: Vec<u8>,
        now: Instant,
        dispatched: &mut Vec<ChannelMessage>,
    ) {
        if flags.contains(PacketFlags::SPLIT) {
            let Some(info) = reassembly else {
                self.stats.record_error(ErrorKind::InvalidHeader);
                return;
            };
            match &mut self.current_split {
                Some((id, buf)) if *id == info.message_id => buf.extend_from_slice(&payload),
                _ => self.current_split = Some((info.message_id, payload)),
            }
            if flags.contains(PacketFlags::LAST_PIECE) {
                if let Some((_, buf)) = self.current_split.take() {
                    match decode_message(&buf) {
                        Ok(msg) => self.handle_incoming_message(msg, now, dispatched),
                        Err(_) => self.stats.record_error(ErrorKind::MalformedMessage),
                    }
                }
            }
        } else {
            match decode_messages(&payload) {
                Ok(msgs) => {
                    for msg in msgs {
                        self.handle_incoming_message(msg, now, dispatched);
                    }
                }
                Err(_) => self.stats.record_error(ErrorKind::MalformedMessage),
            }
        }
    }

    fn handle_incoming_message(&mut self, msg: ChannelMessage, now: Instant, dispatched: &mut Vec<ChannelMessage>) {
        self.stats.messages_received += 1;
        match msg {
            ChannelMessage::HandshakePart1 { client_public_key, client_nonce } => {
                self.on_handshake_part1(client_public_key, client_nonce)
            }
            ChannelMessage::HandshakePart2 { server_public_key, server_nonce } => {
                self.on_handshake_part2(server_public_key, server_nonce)
            }
            ChannelMessage::HandshakePart3 { token } => self.on_handshake_part3(&token),
            ChannelMessage::Disconnect { reason } => {
                self.write(ChannelMessage::Close);
                self.disconnect_message = Some(reason);
                self.state = State::DisconnectingPeer;
                self.disconnect_deadline = Some(now + DISCONNECT_DURATION);
            }
            ChannelMessage::Close => {
                if self.state == State::DisconnectingMyself {
                    self.state = State::Closed;
                }
            }
            ChannelMessage::Ping { nonce } => {
                self.write(ChannelMessage::Pong { nonce });
            }
            ChannelMessage::Pong { nonce } => {
                if nonce == self.last_ping_nonce {
                    if let Some(sent_at) = self.last_ping_sent_at.take() {
                        self.stats.round_trip_time = now.duration_since(sent_at);
                    }
                }
            }
            ChannelMessage::EncryptedMessage { cipher_text } => {
                let plain = self
                    .recv_stream
                    .as_ref()
                    .and_then(|stream| stream.pull_at(self.recv_message_counter, &cipher_text).ok());
                match plain {
                    Some(bytes) => {
                        self.recv_message_counter += 1;
                        match decode_message(&bytes) {
                            Ok(inner) => dispatched.push(inner),
                            Err(_) => self.stats.record_error(ErrorKind::MalformedMessage),
                        }
                    }
                    None => self.stats.record_error(ErrorKind::DecryptionFailed),
                }
            }
            other => dispatched.push(other),
        }
    }

    fn on_handshake_part1(&mut self, client_public_key: [u8; 32], client_nonce: [u8; 24]) {
        if self.role != ChannelRole::Server || self.state != State::AwaitingHandshakePart1 {
            return;
        }
        let Some(identity) = self.server_identity.clone() else {
            return;
        };
        let shared_secret = identity.diffie_hellman(&client_public_key);
        let server_nonce = SecretStream::random_nonce();
        self.recv_stream = Some(SecretStream::new(shared_secret, client_nonce));
        self.send_stream = Some(SecretStream::new(shared_secret, server_nonce));
        self.state = State::AwaitingHandshakePart3;
        self.write(ChannelMessage::HandshakePart2 {
            server_public_key: identity.public_key,
            server_nonce,
        });
    }

    fn on_handshake_part2(&mut self, server_public_key: [u8; 32], server_nonce: [u8; 24]) {
        if self.role != ChannelRole::Client || self.state != State::AwaitingHandshakePart2 {
            return;
        }
        let Some(mut handshake_key) = self.client_handshake_key.take() else {
            return;
        };
        let Some(shared_secret) = handshake_key.diffie_hellman(&server_public_key) else {
            return;
        };
        let Some(client_nonce) = self.client_nonce else {
            return;
        };
        self.send_stream = Some(SecretStream::new(shared_secret, client_nonce));
        self.recv_stream = Some(SecretStream::new(shared_secret, server_nonce));
        let Some(token) = self.send_stream.as_mut().and_then(|s| s.push(HANDSHAKE_TOKEN).ok()) else {
            self.begin_close(Some("Failed to build handshake token.".to_string()));
            return;
        };
        self.write(ChannelMessage::HandshakePart3 { token });
        // The transport's own retransmission guarantees HandshakePart3 will
        // reach the server; there's no need to wait for an explicit ack
        // before treating the channel as usable on this side.
        self.state = State::Connected;
    }

    fn on_handshake_part3(&mut self, token: &[u8]) {
        if self.role != ChannelRole::Server || self.state != State::AwaitingHandshakePart3 {
            return;
        }
        let Some(stream) = self.recv_stream.as_ref() else {
            return;
        };
        match stream.pull_at(0, token) {
            Ok(plain) if tokens_match(&plain, HANDSHAKE_TOKEN) => {
                // Counter 0 of this direction's stream was spent on the
                // token itself; real messages start at 1.
                self.recv_message_counter = 1;
                self.state = State::Connected;
            }
            _ => {
                self.stats.record_error(ErrorKind::DecryptionFailed);
                self.begin_close(Some("Handshake verification failed.".to_string()));
            }
        }
    }

    /// Drops every fully- or selectively-acked packet from the send buffer.
    fn acknowledge(&mut self, ack: Acknowledgement) {
        while let Some(front) = self.send_buffer.front() {
            if !front.sequence.is_more_recent_than(ack.sequence) {
                self.send_buffer.pop_front();
                self.stats.packets_acked += 1;
            } else {
                break;
            }
        }
        if ack.mask != 0 {
            let mut acked_indices = Vec::new();
            for (index, pkt) in self.send_buffer.iter().enumerate() {
                let distance = pkt.sequence.wrapping_distance(ack.sequence) - 1;
                if (0..32).contains(&distance) && (ack.mask & (1 << distance)) != 0 {
                    acked_indices.push(index);
                }
            }
            for &index in acked_indices.iter().rev() {
                self.send_buffer.remove(index);
                self.stats.packets_acked += 1;
            }
        }
    }

    /// Bit `i` set iff packet `latest_seq_handled + 1 + i` is sitting in our
    /// receive ring waiting for an earlier gap to fill.
    fn early_packet_mask(&self) -> u32 {
        let mut mask = 0u32;
        for &seq in self.receive_buffer.keys() {
            let distance = SequenceNumber(seq).wrapping_distance(self.latest_seq_handled) - 1;
            if (0..32).contains(&distance) {
                mask |= 1 << distance;
            }
        }
        mask
    }

    fn throttle(&mut self) -> bool {
        if self.throttle_period == 0 {
            if self.throttle_period < self.throttle_max_period {
                let backlog_ratio = (self.send_buffer.len() / self.throttle_high_water_mark) as u32;
                self.throttle_period = backlog_ratio.min(self.throttle_max_period);
                return true;
            }
            false
        } else {
            self.throttle_counter += 1;
            if self.throttle_counter < self.throttle_period {
                return true;
            }
            self.throttle_counter = 0;
            if self.throttle_period < self.throttle_max_period {
                self.throttle_period += 1;
            }
            false
        }
    }

    /// One send cycle: throttle check, heartbeat-if-idle, retransmission of
    /// every unacked packet, then draining newly buffered messages.
    pub fn send_packets(&mut self, socket: &Socket, now: Instant) {
        if self.state == State::Closed {
            return;
        }

        if self.send_buffer.len() > self.throttle_high_water_mark {
            if self.throttle() {
                self.stats.send_rate_throttle_count += 1;
                return;
            }
        } else {
            self.throttle_period = 0;
            self.throttle_counter = 0;
        }

        let ack = Acknowledgement {
            sequence: self.latest_seq_handled,
            mask: self.early_packet_mask(),
        };

        if self.buffered_messages.is_empty() && self.send_buffer.is_empty() {
            let header = PacketHeader {
                flags: PacketFlags::EARLY_ACKS,
                sequence: self.latest_seq_sent,
                ack: Some(ack),
                reassembly: None,
            };
            self.send_raw(socket, &header, &[]);
            return;
        }

        let pending: Vec<(SequenceNumber, PacketFlags, Option<ReassemblyInfo>, Vec<u8>)> = self
            .send_buffer
            .iter()
            .map(|p| (p.sequence, p.flags, p.reassembly, p.payload.clone()))
            .collect();
        for (sequence, flags, reassembly, payload) in pending {
            let header = PacketHeader { flags, sequence, ack: Some(ack), reassembly };
            self.send_raw(socket, &header, &payload);
        }
        for pkt in self.send_buffer.iter_mut() {
            if pkt.attempts > 0 {
                self.stats.retransmits += 1;
            }
            pkt.attempts += 1;
        }

        self.write_messages(socket, ack);
    }

    fn write_messages(&mut self, socket: &Socket, ack: Acknowledgement) {
        let mut flags = PacketFlags::EARLY_ACKS;
        let mut payload: Vec<u8> = Vec::new();
        while let Some((category, bytes)) = self.buffered_messages.pop_front() {
            if bytes.len() > MAX_PACKET_PAYLOAD_SIZE {
                if !payload.is_empty() {
                    self.send_packet(socket, flags, ack, std::mem::take(&mut payload));
                    flags &= !PacketFlags::RELIABLE;
                }
                self.split_and_send_message(socket, flags, ack, &bytes);
                continue;
            }

            if category == MessageCategory::Reliable {
                flags |= PacketFlags::RELIABLE;
            }
            if payload.len() + bytes.len() > MAX_PACKET_PAYLOAD_SIZE {
                self.send_packet(socket, flags, ack, std::mem::take(&mut payload));
                flags &= !PacketFlags::RELIABLE;
            }
            payload.extend_from_slice(&bytes);
        }
        if !payload.is_empty() {
            self.send_packet(socket, flags, ack, payload);
        }
    }

    fn send_packet(&mut self, socket: &Socket, flags: PacketFlags, ack: Acknowledgement, payload: Vec<u8>) {
        let reliable = flags.contains(PacketFlags::RELIABLE);
        let sequence = if reliable {
            self.latest_seq_sent = self.latest_seq_sent.next();
            self.latest_seq_sent
        } else {
            self.latest_seq_sent
        };
        if reliable {
            self.send_buffer.push_back(OutgoingPacket {
                sequence,
                flags,
                reassembly: None,
                payload: payload.clone(),
                attempts: 1,
            });
        }
        let header = PacketHeader { flags, sequence, ack: Some(ack), reassembly: None };
        self.send_raw(socket, &header, &payload);
    }

    fn split_and_send_message(&mut self, socket: &Socket, flags: PacketFlags, ack: Acknowledgement, message: &[u8]) {
        let total_pieces = message.len().div_ceil(MAX_PACKET_PAYLOAD_SIZE).max(1);
        if total_pieces > MAX_RECEIVE_RING_CAPACITY {
            self.stats.record_error(ErrorKind::BufferOverflow);
            return;
        }
        self.next_message_id = self.next_message_id.wrapping_add(1);
        let message_id = self.next_message_id;

        for (piece_index, chunk) in message.chunks(MAX_PACKET_PAYLOAD_SIZE).enumerate() {
            self.latest_seq_sent = self.latest_seq_sent.next();
            let sequence = self.latest_seq_sent;
            let mut piece_flags = flags | PacketFlags::RELIABLE | PacketFlags::SPLIT;
            if piece_index + 1 == total_pieces {
                piece_flags |= PacketFlags::LAST_PIECE;
            }
            let reassembly = Some(ReassemblyInfo { message_id, piece_index: piece_index as u16 });
            self.send_buffer.push_back(OutgoingPacket {
                sequence,
                flags: piece_flags,
                reassembly,
                payload: chunk.to_vec(),
                attempts: 1,
            });
            let header = PacketHeader { flags: piece_flags, sequence, ack: Some(ack), reassembly };
            self.send_raw(socket, &header, chunk);
        }
    }

    fn send_raw(&mut self, socket: &Socket, header: &PacketHeader, payload: &[u8]) {
        let datagram = match header.encode(payload) {
            Ok(d) => d,
            Err(_) => {
                self.stats.record_error(ErrorKind::InvalidHeader);
                return;
            }
        };
        match socket.send_to(&datagram, self.remote) {
            SocketEvent::Ready(()) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += datagram.len() as u64;
            }
            SocketEvent::Wait => {}
            SocketEvent::Failed(_) => self.stats.record_error(ErrorKind::SocketError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_socket() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    fn pump(
        client: &mut NetChannel,
        client_socket: &Socket,
        server: &mut NetChannel,
        server_socket: &Socket,
        now: Instant,
    ) {
        for _ in 0..16 {
            client.send_packets(client_socket, now);
            server.send_packets(server_socket, now);

            let mut buf = [0u8; 2048];
            while let SocketEvent::Ready((len, _)) = server_socket.receive_from(&mut buf) {
                server.receive_packet(&buf[..len], now);
            }
            while let SocketEvent::Ready((len, _)) = client_socket.receive_from(&mut buf) {
                client.receive_packet(&buf[..len], now);
            }

            if client.is_connected() && server.is_connected() {
                break;
            }
        }
    }

    #[test]
    fn handshake_completes_and_connects_both_sides() {
        let now = Instant::now();
        let identity = Arc::new(ServerIdentity::generate());
        let server_socket = loopback_socket();
        let client_socket = loopback_socket();

        let mut client = NetChannel::connect(
            server_socket.local_endpoint(),
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        let mut server = NetChannel::accept(
            client_socket.local_endpoint(),
            identity,
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );

        pump(&mut client, &client_socket, &mut server, &server_socket, now);

        assert!(client.is_connected());
        assert!(server.is_connected());
    }

    #[test]
    fn secret_message_roundtrips_after_handshake() {
        let now = Instant::now();
        let identity = Arc::new(ServerIdentity::generate());
        let server_socket = loopback_socket();
        let client_socket = loopback_socket();

        let mut client = NetChannel::connect(
            server_socket.local_endpoint(),
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        let mut server = NetChannel::accept(
            client_socket.local_endpoint(),
            identity,
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        pump(&mut client, &client_socket, &mut server, &server_socket, now);
        assert!(client.is_connected() && server.is_connected());

        client.write(ChannelMessage::ClientCommand { command: "say hi".to_string() });

        let mut received = Vec::new();
        for _ in 0..16 {
            client.send_packets(&client_socket, now);
            let mut buf = [0u8; 2048];
            while let SocketEvent::Ready((len, _)) = server_socket.receive_from(&mut buf) {
                received.extend(server.receive_packet(&buf[..len], now));
            }
            if !received.is_empty() {
                break;
            }
        }

        assert_eq!(
            received,
            vec![ChannelMessage::ClientCommand { command: "say hi".to_string() }]
        );
    }

    #[test]
    fn split_message_reassembles_in_order() {
        let now = Instant::now();
        let identity = Arc::new(ServerIdentity::generate());
        let server_socket = loopback_socket();
        let client_socket = loopback_socket();

        let mut client = NetChannel::connect(
            server_socket.local_endpoint(),
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        let mut server = NetChannel::accept(
            client_socket.local_endpoint(),
            identity,
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        pump(&mut client, &client_socket, &mut server, &server_socket, now);

        let big_payload = vec![0xABu8; 4096];
        client.write(ChannelMessage::Snapshot { tick: 1, payload: big_payload.clone() });
        // Snapshot is Unreliable in our categorization, so use a reliable
        // message of the same size to exercise the split path end to end.
        client.write(ChannelMessage::ServerPrint { message: "x".repeat(4096) });

        let mut received = Vec::new();
        for _ in 0..64 {
            client.send_packets(&client_socket, now);
            let mut buf = [0u8; 2048];
            while let SocketEvent::Ready((len, _)) = server_socket.receive_from(&mut buf) {
                received.extend(server.receive_packet(&buf[..len], now));
            }
            if received.iter().any(|m| matches!(m, ChannelMessage::ServerPrint { .. })) {
                break;
            }
        }

        assert!(received
            .iter()
            .any(|m| matches!(m, ChannelMessage::ServerPrint { message } if message.len() == 4096)));
    }

    #[test]
    fn handshake_times_out_without_a_peer() {
        let now = Instant::now();
        let server_socket = loopback_socket();
        let mut client = NetChannel::connect(
            server_socket.local_endpoint(),
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        assert!(client.update(now));
        let later = now + super::super::CONNECT_DURATION;
        assert!(!client.update(later));
        assert!(client.is_closed());
        assert_eq!(client.disconnect_message(), Some("Connection handshake timed out."));
    }

    #[test]
    fn reordered_reliable_packets_dispatch_in_sent_order() {
        let now = Instant::now();
        let identity = Arc::new(ServerIdentity::generate());
        let server_socket = loopback_socket();
        let client_socket = loopback_socket();

        let mut client = NetChannel::connect(
            server_socket.local_endpoint(),
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        let mut server = NetChannel::accept(
            client_socket.local_endpoint(),
            identity,
            Duration::from_secs(10),
            64,
            Duration::from_millis(500),
            now,
        );
        pump(&mut client, &client_socket, &mut server, &server_socket, now);
        assert!(client.is_connected() && server.is_connected());

        // Build five raw reliable datagrams by hand so they can be fed to the
        // server in an order other than the one they were sent in.
        let commands: Vec<ChannelMessage> = (1..=5)
            .map(|tick| ChannelMessage::ClientCommand { command: format!("cmd{tick}") })
            .collect();
        let packets: Vec<Vec<u8>> = commands
            .iter()
            .enumerate()
            .map(|(i, msg)| {
                let payload = encode_message(msg).unwrap();
                let header = PacketHeader {
                    flags: PacketFlags::RELIABLE,
                    sequence: SequenceNumber(1 + i as u16),
                    ack: None,
                    reassembly: None,
                };
                header.encode(&payload).unwrap()
            })
            .collect();

        // Deliver 1, 3, 4, 2, 5.
        let delivery_order = [0, 2, 3, 1, 4];
        let mut dispatched = Vec::new();
        for &i in &delivery_order {
            dispatched.extend(server.receive_packet(&packets[i], now));
        }

        assert_eq!(dispatched, commands);
        assert!(server.receive_buffer.is_empty());
    }
}
