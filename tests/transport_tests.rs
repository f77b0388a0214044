//! Integration tests for the unix socket transport

use beacon::protocol::{
    deserialize, serialize_and_frame, ClientMessage, DaemonMessage, PresenceEvent,
    SubscriptionKind, PROTOCOL_VERSION,
};
use beacon::transport::{PresenceTransport, TransportConnector, TransportEvent};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Helper to read a length-prefixed message from the daemon side
async fn read_frame(stream: &mut UnixStream) -> Option<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buffer = vec![0u8; len];
    stream.read_exact(&mut buffer).await.ok()?;
    Some(buffer)
}

/// Helper to write a daemon message to the client
async fn write_daemon_message(stream: &mut UnixStream, msg: &DaemonMessage) {
    let framed = serialize_and_frame(msg).unwrap();
    stream.write_all(&framed).await.unwrap();
    stream.flush().await.unwrap();
}

async fn connect_pair() -> (
    std::sync::Arc<dyn PresenceTransport>,
    mpsc::Receiver<TransportEvent>,
    UnixStream,
    tempfile::TempDir,
) {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("presenced.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let connector = beacon::transport::IpcConnector::new(&socket_path);
    let (events_tx, events_rx) = mpsc::channel(16);

    let transport = connector.connect(events_tx).await.unwrap();
    let (daemon_stream, _addr) = listener.accept().await.unwrap();

    (transport, events_rx, daemon_stream, temp_dir)
}

#[tokio::test]
async fn test_login_reaches_daemon_and_ready_flows_back() {
    let (transport, mut events_rx, mut daemon, _dir) = connect_pair().await;

    transport.login("beacon").await.unwrap();

    let bytes = timeout(Duration::from_secs(2), read_frame(&mut daemon))
        .await
        .expect("daemon should receive a frame")
        .expect("frame should not be empty");
    let msg: ClientMessage = deserialize(&bytes).expect("should deserialize");

    match msg {
        ClientMessage::Login {
            client_id,
            protocol_version,
        } => {
            assert_eq!(client_id, "beacon");
            assert_eq!(protocol_version, PROTOCOL_VERSION);
        }
        _ => panic!("Expected Login message, got {:?}", msg),
    }

    write_daemon_message(
        &mut daemon,
        &DaemonMessage::Ready {
            protocol_version: PROTOCOL_VERSION,
        },
    )
    .await;

    let event = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("should receive event")
        .expect("event channel open");
    assert!(matches!(event, TransportEvent::Ready));
}

#[tokio::test]
async fn test_subscribe_and_inbound_events() {
    let (transport, mut events_rx, mut daemon, _dir) = connect_pair().await;

    transport
        .subscribe(SubscriptionKind::ActivitySpectate)
        .await
        .unwrap();

    let bytes = timeout(Duration::from_secs(2), read_frame(&mut daemon))
        .await
        .expect("daemon should receive a frame")
        .expect("frame should not be empty");
    let msg: ClientMessage = deserialize(&bytes).expect("should deserialize");
    assert!(matches!(
        msg,
        ClientMessage::Subscribe {
            event: SubscriptionKind::ActivitySpectate
        }
    ));

    write_daemon_message(
        &mut daemon,
        &DaemonMessage::Event(PresenceEvent::Spectate {
            secret: "c2VjcmV0".to_string(),
        }),
    )
    .await;

    let event = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("should receive event")
        .expect("event channel open");
    match event {
        TransportEvent::Spectate { secret } => assert_eq!(secret, "c2VjcmV0"),
        _ => panic!("Expected Spectate event, got {:?}", event),
    }
}

#[tokio::test]
async fn test_set_activity_reaches_daemon() {
    let (transport, _events_rx, mut daemon, _dir) = connect_pair().await;

    transport
        .set_activity(beacon::protocol::ActivityPayload {
            details: Some("Working solo".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let bytes = timeout(Duration::from_secs(2), read_frame(&mut daemon))
        .await
        .expect("daemon should receive a frame")
        .expect("frame should not be empty");
    let msg: ClientMessage = deserialize(&bytes).expect("should deserialize");

    match msg {
        ClientMessage::SetActivity { activity } => {
            assert_eq!(activity.details.as_deref(), Some("Working solo"));
        }
        _ => panic!("Expected SetActivity message, got {:?}", msg),
    }
}

#[tokio::test]
async fn test_daemon_close_emits_closed() {
    let (_transport, mut events_rx, daemon, _dir) = connect_pair().await;

    drop(daemon);

    let event = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("should receive event")
        .expect("event channel open");
    assert!(matches!(event, TransportEvent::Closed));
}

#[tokio::test]
async fn test_destroy_before_handshake_is_safe() {
    let (transport, mut events_rx, _daemon, _dir) = connect_pair().await;

    transport.destroy().await.unwrap();

    // Deliberate teardown: the reader stops without a Closed event
    let res = timeout(Duration::from_millis(200), events_rx.recv()).await;
    match res {
        Err(_) => {}           // no event before the timeout
        Ok(None) => {}         // sender dropped with the reader task
        Ok(Some(event)) => panic!("Unexpected event after destroy: {:?}", event),
    }
}

#[tokio::test]
async fn test_garbage_frame_is_skipped() {
    let (_transport, mut events_rx, mut daemon, _dir) = connect_pair().await;

    // A frame that is not a DaemonMessage is logged and skipped
    let garbage = beacon::protocol::frame_message(b"\xc1\xc1\xc1");
    daemon.write_all(&garbage).await.unwrap();
    write_daemon_message(
        &mut daemon,
        &DaemonMessage::Ready {
            protocol_version: PROTOCOL_VERSION,
        },
    )
    .await;

    let event = timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("should receive event")
        .expect("event channel open");
    assert!(matches!(event, TransportEvent::Ready));
}
