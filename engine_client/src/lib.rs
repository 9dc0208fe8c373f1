//! `engine_client`
//!
//! Client-side systems:
//! - `NetChannel` connection management over a single UDP socket
//! - Input capture and command generation
//! - Snapshot buffering and interpolation for remote entity positions

pub mod client;
pub mod input;
pub mod interp;

pub use client::GameClient;
