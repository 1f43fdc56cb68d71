//! Integration tests for durable persistence through the full sync path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use geoboard_core::{FeatureRecord, Geometry};
use geoboard_collab::client::{SyncClient, SyncEvent};
use geoboard_collab::protocol::PeerInfo;
use geoboard_collab::server::{ServerConfig, SyncServer};
use geoboard_collab::storage::RecordStore;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_server_with_storage(path: &std::path::Path) -> String {
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_capacity: 64,
        data_path: Some(path.to_path_buf()),
    };
    let server = Arc::new(SyncServer::new(config));
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("ws://127.0.0.1:{port}")
}

async fn wait_for(
    events: &mut mpsc::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    loop {
        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

fn record(label: &str) -> FeatureRecord {
    FeatureRecord::new(
        Geometry::rectangle([4.0, 52.0], [4.2, 52.1]).unwrap(),
        label,
    )
}

#[tokio::test]
async fn test_mutations_reach_the_durable_document() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("records.json");
    let url = start_server_with_storage(&data_path).await;

    let mut client = SyncClient::new(PeerInfo::new("Alice"), &url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::SnapshotReceived(_))).await;

    let keeper = record("keeper");
    let victim = record("victim");
    client.send_create(&keeper).await.unwrap();
    client.send_create(&victim).await.unwrap();
    client.send_delete(victim.id).await.unwrap();

    // The delete echo proves all three mutations were applied — and each
    // was persisted before its broadcast went out.
    wait_for(&mut events, |e| matches!(e, SyncEvent::RecordDeleted(_))).await;

    let reopened = RecordStore::open(&data_path);
    assert_eq!(reopened.snapshot(), vec![keeper]);
}

#[tokio::test]
async fn test_restarted_server_serves_persisted_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("records.json");

    // First server lifetime: one record is created.
    {
        let url = start_server_with_storage(&data_path).await;
        let mut client = SyncClient::new(PeerInfo::new("Alice"), &url);
        let mut events = client.take_event_rx().unwrap();
        client.connect().await.unwrap();
        wait_for(&mut events, |e| matches!(e, SyncEvent::SnapshotReceived(_))).await;

        let survivor = record("survivor");
        client.send_create(&survivor).await.unwrap();
        wait_for(&mut events, |e| matches!(e, SyncEvent::RecordCreated(_))).await;
        client.disconnect().await;
    }

    // Second server lifetime on the same document: a fresh client's
    // snapshot baseline contains the record.
    let url = start_server_with_storage(&data_path).await;
    let mut client = SyncClient::new(PeerInfo::new("Bob"), &url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    let snapshot = match wait_for(&mut events, |e| {
        matches!(e, SyncEvent::SnapshotReceived(_))
    })
    .await
    {
        SyncEvent::SnapshotReceived(records) => records,
        _ => unreachable!(),
    };

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].label, "survivor");
}

#[tokio::test]
async fn test_update_rewrites_document_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("records.json");
    let url = start_server_with_storage(&data_path).await;

    let mut client = SyncClient::new(PeerInfo::new("Alice"), &url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::SnapshotReceived(_))).await;

    let mut shape = record("before");
    client.send_create(&shape).await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::RecordCreated(_))).await;

    shape.label = "after".to_string();
    shape.geometry = Geometry::rectangle([0.0, 0.0], [1.0, 1.0]).unwrap();
    client.send_update(&shape).await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::RecordUpdated(_))).await;

    let reopened = RecordStore::open(&data_path);
    assert_eq!(reopened.snapshot(), vec![shape]);
}
