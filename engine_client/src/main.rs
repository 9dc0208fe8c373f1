//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p engine_client -- [--addr 127.0.0.1:40000] [--maps-dir maps] [--name Player]
//!
//! The client connects to the server, loads the map it announces, sends
//! input commands, and displays received snapshots.
//!
//! Console commands:
//!   status              - Show client status
//!   map <mapname>       - Load a map locally (for testing without a server)
//!   say <message>       - Send a chat message
//!   disconnect          - Disconnect from server
//!   quit                - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use engine_client::client::{ClientState, GameClient};
use engine_client::input::InputState;
use engine_shared::config::EngineConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--maps-dir" if i + 1 < args.len() => {
                cfg.maps_dir = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = parse_args();
    info!(server = %cfg.server_addr, maps_dir = %cfg.maps_dir, "Starting client");

    let mut client = GameClient::connect(&cfg).context("connect")?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Connecting... type 'status' for info, 'quit' to exit.");
    println!();

    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);

    loop {
        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            match client.exec_console(&line) {
                Ok(output) => {
                    for line in output {
                        println!("{line}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }

        client.poll()?;

        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }

        if client.state == ClientState::Ready {
            // Fake input for now - in a real client this would come from keyboard/mouse.
            let input = InputState::default();
            client.tick(input)?;

            if let Some(snap) = client.snaps.last_snapshot() {
                if snap.tick % 64 == 0 {
                    info!(tick = snap.tick, players = snap.players.len(), "snapshot");
                }
            }
        }

        tokio::time::sleep(tick_interval).await;
    }

    Ok(())
}
