//! Full socket-based integration test for client <-> server communication:
//! handshake, map transfer, input commands and snapshot replication, all
//! over real loopback UDP sockets.

use std::time::Duration;

use engine_client::client::{ClientState, GameClient};
use engine_client::input::InputState;
use engine_server::server::bind_ephemeral;

/// Mirrors the inline map `bind_ephemeral` loads server-side, written to a
/// temp directory so the client's own map load (triggered by the server's
/// `MapInfo`) has something to read.
const TEST_MAP: &str = "[DATA]\nR..B\n....\n[END_DATA]\n[SPAWN_RED] R\n[SPAWN_BLU] B\n";

fn write_test_map_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("engine_tests-maps-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("test.map"), TEST_MAP).unwrap();
    dir
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_server_full_roundtrip() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter("info").with_test_writer().try_init();

    let (mut server, mut cfg) = bind_ephemeral(64)?;
    cfg.maps_dir = write_test_map_dir().display().to_string();

    let mut client = GameClient::connect(&cfg)?;

    // Drive handshake, MapInfo and ClientReady until the client is fully up.
    let mut became_ready = false;
    for _ in 0..400 {
        server.step()?;
        client.poll()?;
        if client.state == ClientState::Ready {
            became_ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(became_ready, "client never reached Ready, stuck at {:?}", client.state);

    // Exchange a batch of ticks: client sends movement, server replicates.
    for tick in 0..30u32 {
        client.tick(InputState { forward: 1, right: 0, jump: false })?;
        server.step()?;
        client.poll()?;
        if tick % 5 == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    let snapshot = client.snaps.last_snapshot().expect("expected at least one snapshot");
    assert!(snapshot.tick > 0);
    assert_eq!(snapshot.players.len(), 1, "exactly the one connected player should be in the snapshot");

    Ok(())
}
