//! Gateway integration tests: real listener, real WebSocket clients.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    yrs::{ReadTxn, StateVector, Text, Transact},
};

use well_pits::{PitRegistry, RegistryConfig};

async fn spawn_gateway(dir: &Path) -> SocketAddr {
    let registry = Arc::new(
        PitRegistry::open(RegistryConfig {
            dir: dir.to_path_buf(),
            ..RegistryConfig::default()
        })
        .await
        .unwrap(),
    );
    let app = well_gateway::server::build_app(registry);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn sample_update() -> Vec<u8> {
    let doc = yrs::Doc::new();
    let text = doc.get_or_insert_text("scene");
    {
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "a wobbly circle");
    }
    doc.transact()
        .encode_state_as_update_v1(&StateVector::default())
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_gateway(dir.path()).await;

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "welld");
}

#[tokio::test]
async fn missing_pit_probe_is_a_delayed_404() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_gateway(dir.path()).await;

    let response = reqwest::Client::new()
        .head(format!("http://{addr}/pit/never-made"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn updates_relay_between_clients_and_save_on_last_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_gateway(dir.path()).await;

    let (mut alice, _) = connect_async(format!("ws://{addr}/ws/doodle")).await.unwrap();
    let (mut bob, _) = connect_async(format!("ws://{addr}/ws/doodle")).await.unwrap();

    // Both clients first get a full-state catch-up frame.
    assert!(matches!(alice.next().await.unwrap().unwrap(), Message::Binary(_)));
    assert!(matches!(bob.next().await.unwrap().unwrap(), Message::Binary(_)));

    let update = sample_update();
    alice
        .send(Message::Binary(update.clone().into()))
        .await
        .unwrap();

    // Bob sees Alice's update; Alice does not get her own frame back.
    match bob.next().await.unwrap().unwrap() {
        Message::Binary(bytes) => assert_eq!(&bytes[..], &update[..]),
        other => panic!("expected a binary update frame, got {other:?}"),
    }

    let stats: serde_json::Value = reqwest::get(format!("http://{addr}/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["totalPits"], 1);
    assert_eq!(stats["pits"][0]["slug"], "doodle");
    assert_eq!(stats["pits"][0]["connections"], 2);

    drop(alice);
    drop(bob);

    // The last detachment saves the pit; poll briefly for the files.
    let snapshot = dir.path().join("doodle.pit");
    for _ in 0..100 {
        if snapshot.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(snapshot.exists());
    assert!(dir.path().join("doodle.meta.json").exists());

    let probe = reqwest::Client::new()
        .head(format!("http://{addr}/pit/doodle"))
        .send()
        .await
        .unwrap();
    assert_eq!(probe.status(), 200);
}

#[tokio::test]
async fn late_joiner_catches_up_from_the_snapshot_frame() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_gateway(dir.path()).await;

    let (mut alice, _) = connect_async(format!("ws://{addr}/ws/mural")).await.unwrap();
    assert!(matches!(alice.next().await.unwrap().unwrap(), Message::Binary(_)));

    let update = sample_update();
    alice
        .send(Message::Binary(update.clone().into()))
        .await
        .unwrap();

    // Give the server a beat to merge before the second client attaches.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut carol, _) = connect_async(format!("ws://{addr}/ws/mural")).await.unwrap();
    match carol.next().await.unwrap().unwrap() {
        Message::Binary(bytes) => assert_eq!(&bytes[..], &update[..]),
        other => panic!("expected the catch-up frame, got {other:?}"),
    }
}

#[tokio::test]
async fn traversal_shaped_slugs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_gateway(dir.path()).await;

    // Dots are outside the slug alphabet, so this never reaches the fs.
    let result = connect_async(format!("ws://{addr}/ws/..%2Fescape")).await;
    assert!(result.is_err());

    let probe = reqwest::Client::new()
        .head(format!("http://{addr}/pit/has.dots"))
        .send()
        .await
        .unwrap();
    assert_eq!(probe.status(), 404);
}
