//! Server implementation.
//!
//! This is an authoritative server loop, tick-based like the original
//! engine's. It supports:
//! - Tile-map loading
//! - Console commands (map, status, kick, quit)
//! - Per-client `NetChannel` connections (handshake, map transfer, ready)
//! - Deterministic world simulation and snapshot replication
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use engine_shared::config::EngineConfig;
use engine_shared::console::{Console, CvarFlags, CvarValue};
use engine_shared::map::Map;
use engine_shared::math::{Direction, Vec2};
use engine_shared::net::{ChannelMessage, IpEndpoint, NetChannel, ServerIdentity, Socket, SocketEvent, PROTOCOL_VERSION};
use engine_shared::registry::Id;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::world::{Player, World};

/// One connected client: its transport channel plus whatever world state
/// it has been assigned.
struct ClientSession {
    channel: NetChannel,
    player_id: Option<Id<Player>>,
    ready: bool,
}

/// Server state enum for connection flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No map loaded, waiting for `map` command.
    Idle,
    /// Map is loading.
    LoadingMap,
    /// Map loaded, accepting clients and running simulation.
    Running,
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    pub console: Console,
    world: World,
    clients: HashMap<IpEndpoint, ClientSession>,

    socket: Socket,
    identity: Arc<ServerIdentity>,

    tick: u64,
    state: ServerState,

    /// Currently loaded map.
    map: Option<Map>,
    /// Path to maps directory.
    maps_dir: PathBuf,

    net_timeout: Duration,
    net_throttle_high_water_mark: usize,
    net_throttle_max_period: Duration,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Creates a new server with the given config.
    pub fn new(cfg: EngineConfig, maps_dir: PathBuf) -> anyhow::Result<Self> {
        let addr: IpEndpoint = cfg.server_addr.parse().context("parse server_addr")?;
        let socket = Socket::bind(addr).context("bind server socket")?;

        let mut console = Console::new();
        Self::register_cvars(&mut console);

        let net_timeout = Duration::from_secs(cfg.net_timeout_secs);
        let net_throttle_high_water_mark = cfg.net_throttle_high_water_mark;
        let net_throttle_max_period = Duration::from_millis(cfg.net_throttle_max_period_ms);

        Ok(Self {
            cfg,
            console,
            world: World::new(),
            clients: HashMap::new(),
            socket,
            identity: Arc::new(ServerIdentity::generate()),
            tick: 0,
            state: ServerState::Idle,
            map: None,
            maps_dir,
            net_timeout,
            net_throttle_high_water_mark,
            net_throttle_max_period,
            console_rx: None,
        })
    }

    fn register_cvars(console: &mut Console) {
        console.register_cvar("sv_tickrate", CvarValue::Int(64), "Server tick rate", CvarFlags::NONE);
        console.register_cvar("sv_maxclients", CvarValue::Int(16), "Max connected clients", CvarFlags::NONE);
        console.register_cvar("sv_cheats", CvarValue::Bool(false), "Allow cheat commands", CvarFlags::REPLICATED);
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> IpEndpoint {
        self.socket.local_endpoint()
    }

    /// Returns the current server state.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Loads a map by name from `<maps_dir>/<name>.map` and repopulates the
    /// world from it. Existing clients are reset to not-ready and sent the
    /// new `MapInfo`.
    pub fn load_map(&mut self, map_name: &str) -> anyhow::Result<()> {
        self.state = ServerState::LoadingMap;
        info!(map = %map_name, "Loading map");

        let path = self.maps_dir.join(format!("{map_name}.map"));
        let text = std::fs::read_to_string(&path).with_context(|| format!("read map {}", path.display()))?;
        let map = Map::load(map_name.to_string(), &text).with_context(|| format!("parse map {}", path.display()))?;

        info!(map = %map.name(), hash = map.hash(), width = map.width(), height = map.height(), "Map loaded");

        self.world = World::new();
        self.world.populate_from_map(&map);
        self.map = Some(map);
        self.tick = 0;
        self.state = ServerState::Running;

        for session in self.clients.values_mut() {
            session.ready = false;
            session.player_id = None;
            if let Some(map) = &self.map {
                session.channel.write(ChannelMessage::MapInfo { name: map.name().to_string(), hash: map.hash() });
            }
        }

        Ok(())
    }

    /// Runs the server for a number of ticks, sleeping to the tick rate
    /// between each. Used by tests and by the standalone binary's outer loop.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = tokio::time::Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step()?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step: console commands, socket
    /// polling, per-channel timers, simulation (if running), then
    /// replication.
    pub fn step(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();

        self.process_console_commands()?;
        self.poll_socket(now);
        self.update_channels(now);

        if self.state == ServerState::Running {
            self.world.update(self.map.as_ref().expect("Running implies a loaded map"));
            self.send_snapshots();
        }

        for session in self.clients.values_mut() {
            session.channel.send_packets(&self.socket, now);
        }

        self.tick += 1;
        Ok(())
    }

    fn process_console_commands(&mut self) -> anyhow::Result<()> {
        let lines: Vec<String> = if let Some(rx) = self.console_rx.as_mut() {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line)? {
                println!("{out}");
            }
        }
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
            "map" => {
                if tokens.len() < 2 {
                    return Ok(vec!["Usage: map <mapname>".to_string()]);
                }
                match self.load_map(tokens[1]) {
                    Ok(()) => Ok(vec![format!("Map '{}' loaded", tokens[1])]),
                    Err(e) => Ok(vec![format!("Failed to load map: {}", e)]),
                }
            }
            "status" => {
                let mut out = Vec::new();
                out.push(format!("Server state: {:?}", self.state));
                out.push(format!("Tick: {}", self.tick));
                if let Some(map) = &self.map {
                    out.push(format!("Map: {}", map.name()));
                }
                out.push(format!("Clients: {}", self.clients.len()));
                for (endpoint, session) in &self.clients {
                    out.push(format!(
                        "  {endpoint}: ready={} player={:?}",
                        session.ready, session.player_id
                    ));
                }
                Ok(out)
            }
            "kick" => {
                if tokens.len() < 2 {
                    return Ok(vec!["Usage: kick <address:port>".to_string()]);
                }
                let Ok(endpoint) = tokens[1].parse::<IpEndpoint>() else {
                    return Ok(vec![format!("Not a valid endpoint: {}", tokens[1])]);
                };
                if let Some(session) = self.clients.get_mut(&endpoint) {
                    session.channel.disconnect("Kicked by server console.", Duration::from_secs(3), Instant::now());
                    Ok(vec![format!("Kicked {endpoint}")])
                } else {
                    Ok(vec![format!("No such client: {endpoint}")])
                }
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                std::process::exit(0);
            }
            _ => self.console.exec(line),
        }
    }

    /// Drains every waiting datagram, routing it to an existing client's
    /// channel or creating a fresh one for an unseen sender.
    fn poll_socket(&mut self, now: Instant) {
        let mut buf = [0u8; 2048];
        loop {
            let (len, from) = match self.socket.receive_from(&mut buf) {
                SocketEvent::Ready(v) => v,
                SocketEvent::Wait => break,
                SocketEvent::Failed(e) => {
                    warn!(error = %e, "socket receive failed");
                    break;
                }
            };

            let session = self.clients.entry(from).or_insert_with(|| ClientSession {
                channel: NetChannel::accept(
                    from,
                    self.identity.clone(),
                    self.net_timeout,
                    self.net_throttle_high_water_mark,
                    self.net_throttle_max_period,
                    now,
                ),
                player_id: None,
                ready: false,
            });

            let messages = session.channel.receive_packet(&buf[..len], now);
            for message in messages {
                self.handle_message(from, message);
            }
        }
    }

    fn handle_message(&mut self, from: IpEndpoint, message: ChannelMessage) {
        match message {
            ChannelMessage::Connect { protocol_version } => {
                if protocol_version != PROTOCOL_VERSION {
                    if let Some(session) = self.clients.get_mut(&from) {
                        session.channel.disconnect(
                            format!("Protocol mismatch: server is {PROTOCOL_VERSION}, client is {protocol_version}."),
                            Duration::from_secs(3),
                            Instant::now(),
                        );
                    }
                    return;
                }
                if let Some(map) = &self.map {
                    if let Some(session) = self.clients.get_mut(&from) {
                        session.channel.write(ChannelMessage::MapInfo { name: map.name().to_string(), hash: map.hash() });
                    }
                }
            }
            ChannelMessage::ClientReady => self.on_client_ready(from),
            ChannelMessage::PlayerCommand { tick, r#move, wish_jump } => self.on_player_command(from, tick, r#move, wish_jump),
            ChannelMessage::ClientCommand { command } => {
                debug!(from = %from, command = %command, "client console command");
            }
            other => {
                debug!(from = %from, ?other, "unexpected message from client");
            }
        }
    }

    fn on_client_ready(&mut self, from: IpEndpoint) {
        let Some(map) = &self.map else {
            return;
        };
        let spawn = map.red_spawns().first().copied().unwrap_or(Vec2::ZERO);
        let (player_id, player) = self.world.players.reserve();
        player.position = spawn;
        self.world.commit();

        if let Some(session) = self.clients.get_mut(&from) {
            session.player_id = Some(player_id);
            session.ready = true;
        }
        info!(%from, player = ?player_id, "client ready, player spawned");
    }

    fn on_player_command(&mut self, from: IpEndpoint, _tick: u32, r#move: Vec2, _wish_jump: bool) {
        let Some(player_id) = self.clients.get(&from).and_then(|s| s.player_id) else {
            return;
        };
        let Some(map) = &self.map else {
            return;
        };
        let direction = Direction::between(Vec2::ZERO, r#move);
        if !direction.is_empty() {
            self.world.try_move_player(player_id, map, direction);
        }
    }

    fn send_snapshots(&mut self) {
        for session in self.clients.values_mut() {
            if !session.ready {
                continue;
            }
            let snapshot = self.world.take_snapshot(session.player_id);
            let Ok(payload) = serde_json::to_vec(&snapshot) else {
                continue;
            };
            session.channel.write(ChannelMessage::Snapshot { tick: snapshot.tick as u32, payload });
        }
    }
}

/// A minimal valid map, inlined so tests don't depend on fixture files on
/// disk: a 2x4 tile floor with one spawn of each team.
const TEST_MAP: &str = "[DATA]\nR..B\n....\n[END_DATA]\n[SPAWN_RED] R\n[SPAWN_BLU] B\n";

/// Helper for tests: binds to an ephemeral port and loads [`TEST_MAP`] so
/// the server comes up already `Running`, matching the invariant that
/// `Running` implies a loaded map.
pub fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, EngineConfig)> {
    let cfg = EngineConfig {
        server_addr: "127.0.0.1:0".to_string(),
        tick_hz,
        ..Default::default()
    };
    let mut server = GameServer::new(cfg.clone(), PathBuf::from("maps"))?;
    let map = Map::load("test".to_string(), TEST_MAP).context("load inline test map")?;
    server.world.populate_from_map(&map);
    server.map = Some(map);
    server.state = ServerState::Running;

    let mut cfg = cfg;
    cfg.server_addr = server.local_addr().to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_ephemeral_server_is_running_and_listening() {
        let (server, cfg) = bind_ephemeral(64).unwrap();
        assert_eq!(*server.state(), ServerState::Running);
        assert_ne!(cfg.server_addr, "127.0.0.1:0");
    }

    #[tokio::test]
    async fn server_runs_a_few_ticks_with_no_clients() {
        let (mut server, _cfg) = bind_ephemeral(64).unwrap();
        server.run_for_ticks(3).await.unwrap();
    }

    #[test]
    fn exec_console_status_reports_tick_and_client_count() {
        let (mut server, _cfg) = bind_ephemeral(64).unwrap();
        let out = server.exec_console("status").unwrap();
        assert!(out.iter().any(|l| l.starts_with("Server state:")));
        assert!(out.iter().any(|l| l.starts_with("Clients: 0")));
    }
}
