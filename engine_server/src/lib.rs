//! `engine_server`
//!
//! Server-side systems:
//! - Fixed timestep deterministic simulation ([`world`])
//! - Per-client `NetChannel` connections, console and map loading ([`server`])
//!
//! Networking model: one `NetChannel` per connected client, all sharing a
//! single bound UDP socket.

pub mod server;
pub mod world;

pub use server::GameServer;
