use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use eggkit_communication::{ConnectOptions, Transport, WifiOptions, WifiTransport};
use eggkit_core::TransportError;

mod fake_device;
use fake_device::{spawn_fake_device, VERSION_BANNER};

fn options_for(port: u16) -> ConnectOptions {
    ConnectOptions::Wifi(WifiOptions {
        host: Some("127.0.0.1".to_string()),
        port: Some(u32::from(port)),
        ..WifiOptions::default()
    })
}

#[tokio::test]
async fn connect_resolves_with_the_version_banner() {
    let port = spawn_fake_device().await;
    let transport = WifiTransport::new();

    let version = transport.connect(&options_for(port)).await.unwrap();
    assert_eq!(version, VERSION_BANNER);
    assert!(transport.is_connected());

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn connect_by_explicit_url() {
    let port = spawn_fake_device().await;
    let transport = WifiTransport::new();

    let options = ConnectOptions::Wifi(WifiOptions {
        url: Some(format!("ws://127.0.0.1:{port}/")),
        ..WifiOptions::default()
    });
    let version = transport.connect(&options).await.unwrap();
    assert_eq!(version, VERSION_BANNER);

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn expect_ok_commands_round_trip() {
    let port = spawn_fake_device().await;
    let transport = WifiTransport::new();
    transport.connect(&options_for(port)).await.unwrap();

    let lines = transport.send_command_expect_ok("QB", None).await.unwrap();
    assert_eq!(lines, vec!["0"]);

    let moved = transport
        .send_command_expect_ok("SM,1000,100,0", None)
        .await
        .unwrap();
    assert!(moved.is_empty());

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn binary_frames_feed_the_same_framer() {
    let port = spawn_fake_device().await;
    let transport = WifiTransport::new();
    transport.connect(&options_for(port)).await.unwrap();

    let lines = transport.send_command_expect_ok("BIN", None).await.unwrap();
    assert_eq!(lines, vec!["1"]);

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn unknown_command_rejects_at_protocol_level() {
    let port = spawn_fake_device().await;
    let transport = WifiTransport::new();
    transport.connect(&options_for(port)).await.unwrap();

    let err = transport
        .send_command_expect_ok("XY,1", None)
        .await
        .unwrap_err();
    match err {
        TransportError::UnknownCommand { response } => {
            assert!(response.contains("Unknown CMD"));
        }
        other => panic!("expected UnknownCommand, got {other:?}"),
    }

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn remote_close_resets_state() {
    let port = spawn_fake_device().await;
    let transport = Arc::new(WifiTransport::new());
    transport.connect(&options_for(port)).await.unwrap();

    // The device drops the socket; the adapter must sweep itself.
    let _ = transport.send_command_expect_ok("BYE", None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!transport.is_connected());
    let err = transport.send_command("V").await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn connect_to_unreachable_host_fails() {
    let transport = WifiTransport::new();
    // Bind-then-drop leaves a port nobody is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = transport.connect(&options_for(port)).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectFailed { .. }));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn mismatched_options_are_rejected() {
    let transport = WifiTransport::new();
    let err = transport
        .connect(&ConnectOptions::Ble(Default::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::InvalidOptions { .. }));
}
