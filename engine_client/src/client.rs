//! Client implementation.
//!
//! The client drives a single `NetChannel` to the server over its own
//! non-blocking UDP socket: handshake, map transfer, per-tick input and
//! snapshot interpolation, plus a console for local commands.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use engine_server::world::WorldSnapshot;
use engine_shared::config::EngineConfig;
use engine_shared::console::{Console, CvarFlags, CvarValue};
use engine_shared::map::Map;
use engine_shared::net::{ChannelMessage, IpAddress, IpEndpoint, NetChannel, Socket, SocketEvent, PROTOCOL_VERSION};
use tracing::{debug, info, warn};

use crate::input::{build_command, InputState};
use crate::interp::SnapshotBuffer;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Transport handshake in progress.
    Connecting,
    /// Transport connected, waiting for `MapInfo`.
    Connected,
    /// Map is loading locally.
    LoadingMap,
    /// Map loaded, `ClientReady` sent, receiving snapshots.
    Ready,
    /// Channel closed (by either side) or timed out.
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub state: ClientState,
    pub console: Console,

    socket: Socket,
    channel: NetChannel,
    pub snaps: SnapshotBuffer,
    tick: u32,

    /// Currently loaded map.
    pub current_map: Option<Map>,
    /// Map name/hash the server announced, pending a local load.
    pub pending_map: Option<(String, u32)>,
    /// Path to maps directory.
    maps_dir: PathBuf,

    /// Server messages to display.
    pub server_messages: Vec<String>,
    pub disconnect_reason: Option<String>,
}

impl GameClient {
    /// Binds a local socket and starts the handshake with `cfg.server_addr`.
    pub fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let server_addr: IpEndpoint = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %server_addr, "Connecting to server");

        let socket = Socket::bind(IpEndpoint::new(IpAddress::localhost(), 0)).context("bind client socket")?;
        let now = Instant::now();
        let channel = NetChannel::connect(
            server_addr,
            Duration::from_secs(cfg.net_timeout_secs),
            cfg.net_throttle_high_water_mark,
            Duration::from_millis(cfg.net_throttle_max_period_ms),
            now,
        );

        let mut console = Console::new();
        Self::register_cvars(&mut console, cfg);

        Ok(Self {
            state: ClientState::Connecting,
            console,
            socket,
            channel,
            snaps: SnapshotBuffer::new(32),
            tick: 0,
            current_map: None,
            pending_map: None,
            maps_dir: PathBuf::from(&cfg.maps_dir),
            server_messages: Vec::new(),
            disconnect_reason: None,
        })
    }

    fn register_cvars(console: &mut Console, cfg: &EngineConfig) {
        console.register_cvar("cl_interp", CvarValue::Float(0.1), "Interpolation delay", CvarFlags::NONE);
        console.register_cvar("name", CvarValue::String(cfg.player_name.clone()), "Player name", CvarFlags::NONE);
    }

    /// One client-side tick: drains the socket, advances channel timers,
    /// reacts to server messages, and flushes any queued writes.
    pub fn poll(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();

        let mut buf = [0u8; 2048];
        loop {
            let (len, _from) = match self.socket.receive_from(&mut buf) {
                SocketEvent::Ready(v) => v,
                SocketEvent::Wait => break,
                SocketEvent::Failed(e) => {
                    warn!(error = %e, "socket receive failed");
                    break;
                }
            };
            for message in self.channel.receive_packet(&buf[..len], now) {
                self.handle_message(message);
            }
        }

        if !self.channel.update(now) {
            if self.state != ClientState::Disconnected {
                self.disconnect_reason = self.channel.disconnect_message().map(str::to_string);
                if let Some(reason) = &self.disconnect_reason {
                    info!(%reason, "disconnected from server");
                }
            }
            self.state = ClientState::Disconnected;
        } else if self.state == ClientState::Connecting && self.channel.is_connected() {
            self.state = ClientState::Connected;
            self.channel.write(ChannelMessage::Connect { protocol_version: PROTOCOL_VERSION });
        }

        self.channel.send_packets(&self.socket, now);
        Ok(())
    }

    fn handle_message(&mut self, message: ChannelMessage) {
        match message {
            ChannelMessage::MapInfo { name, hash } => {
                info!(map = %name, hash, "server sent map info");
                self.pending_map = Some((name.clone(), hash));
                self.state = ClientState::LoadingMap;
                if let Err(e) = self.load_map(&name) {
                    warn!(error = %e, "failed to load map locally");
                    return;
                }
                self.channel.write(ChannelMessage::ClientReady);
                self.state = ClientState::Ready;
            }
            ChannelMessage::Snapshot { tick, payload } => match serde_json::from_slice::<WorldSnapshot>(&payload) {
                Ok(snapshot) => {
                    debug!(tick, "snapshot received");
                    self.snaps.push(snapshot);
                }
                Err(e) => warn!(error = %e, "malformed snapshot payload"),
            },
            ChannelMessage::ServerPrint { message } => {
                info!(message = %message, "server message");
                self.server_messages.push(message);
            }
            ChannelMessage::Disconnect { reason } => {
                info!(reason = %reason, "disconnected from server");
                self.disconnect_reason = Some(reason);
                self.state = ClientState::Disconnected;
            }
            other => {
                debug!(?other, "unhandled message");
            }
        }
    }

    /// Loads a map by name from `<maps_dir>/<name>.map`. Used both when the
    /// server announces a map and via the local `map` console command for
    /// testing without a server.
    pub fn load_map(&mut self, map_name: &str) -> anyhow::Result<()> {
        info!(map = %map_name, "loading map");
        let path = self.maps_dir.join(format!("{map_name}.map"));
        let text = std::fs::read_to_string(&path).with_context(|| format!("read map {}", path.display()))?;
        let map = Map::load(map_name.to_string(), &text).with_context(|| format!("parse map {}", path.display()))?;

        if let Some((_, expected_hash)) = self.pending_map {
            if expected_hash != map.hash() {
                warn!(expected = expected_hash, actual = map.hash(), "map hash mismatch");
            }
        }

        info!(map = %map.name(), hash = map.hash(), "map loaded locally");
        self.current_map = Some(map);
        self.snaps = SnapshotBuffer::new(32);
        Ok(())
    }

    /// Advances one client tick: builds and sends an input command.
    pub fn tick(&mut self, input: InputState) -> anyhow::Result<()> {
        if self.state != ClientState::Ready {
            return Ok(());
        }
        self.channel.write(build_command(self.tick, input));
        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "disconnect" => {
                self.channel.disconnect("Disconnected by user.", Duration::from_secs(3), Instant::now());
                self.state = ClientState::Disconnected;
                Ok(vec!["Disconnected".to_string()])
            }
            "status" => {
                let mut out = vec![format!("State: {:?}", self.state), format!("Tick: {}", self.tick)];
                if let Some(map) = &self.current_map {
                    out.push(format!("Map: {}", map.name()));
                }
                out.push(format!("Snapshots buffered: {}", self.snaps.len()));
                Ok(out)
            }
            "map" => {
                if tokens.len() < 2 {
                    return Ok(vec!["Usage: map <mapname>".to_string()]);
                }
                match self.load_map(tokens[1]) {
                    Ok(()) => Ok(vec![format!("Map '{}' loaded locally", tokens[1])]),
                    Err(e) => Ok(vec![format!("Failed to load map: {}", e)]),
                }
            }
            "say" => {
                let msg = tokens[1..].join(" ");
                self.channel.write(ChannelMessage::ClientCommand { command: format!("say {msg}") });
                Ok(vec![])
            }
            "quit" | "exit" => std::process::exit(0),
            _ => self.console.exec(line),
        }
    }
}
