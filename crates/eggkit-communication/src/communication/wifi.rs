//! Wi-Fi (WebSocket) transport
//!
//! Connects to an EBB bridge exposing the command protocol over a
//! WebSocket. Text frames, binary frames, and fragmented payloads are
//! all treated as UTF-8 byte streams and decoded before framing, so the
//! protocol lines are identical to the serial and BLE paths.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use eggkit_core::{ConnectionState, Result, TransportError};

use super::link::{LineListener, LineListenerHandle, ProtocolLink};
use super::queue::RawWriter;
use super::{ConnectOptions, Transport, TransportKind, WifiOptions};

/// Default TCP port of the EBB WebSocket bridge.
pub const DEFAULT_WIFI_PORT: u32 = 1337;

type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    Message,
>;

/// Resolve the socket URL from connection options.
///
/// An explicit `url` wins (prefixed with `ws://` when it carries no
/// scheme); otherwise the URL is assembled from host/port/secure/path
/// with the port clamped to [1, 65535] (default 1337), the path
/// defaulted to `/`, and the scheme chosen by the secure flag.
pub fn resolve_socket_url(options: &WifiOptions) -> Result<String> {
    if let Some(url) = &options.url {
        if url.starts_with("ws://") || url.starts_with("wss://") {
            return Ok(url.clone());
        }
        return Ok(format!("ws://{url}"));
    }

    let host = options
        .host
        .as_deref()
        .ok_or_else(|| TransportError::InvalidOptions {
            reason: "wifi options need a url or a host".to_string(),
        })?;
    let port = options.port.unwrap_or(DEFAULT_WIFI_PORT).clamp(1, 65_535);
    let scheme = if options.secure { "wss" } else { "ws" };
    let path = match options.path.as_deref() {
        None | Some("") => "/".to_string(),
        Some(p) if p.starts_with('/') => p.to_string(),
        Some(p) => format!("/{p}"),
    };
    Ok(format!("{scheme}://{host}:{port}{path}"))
}

/// Raw writer backed by the WebSocket sink.
struct WifiWriter {
    sink: Arc<tokio::sync::Mutex<Option<WsSink>>>,
}

#[async_trait]
impl RawWriter for WifiWriter {
    async fn write_raw(&self, text: &str) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError::write_failed(e.to_string()))
    }
}

/// Wi-Fi (WebSocket) transport adapter.
pub struct WifiTransport {
    link: Arc<ProtocolLink>,
    state: Arc<RwLock<ConnectionState>>,
    sink: Arc<tokio::sync::Mutex<Option<WsSink>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WifiTransport {
    /// Create a disconnected Wi-Fi transport.
    pub fn new() -> Self {
        Self {
            link: ProtocolLink::new(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            sink: Arc::new(tokio::sync::Mutex::new(None)),
            reader: Mutex::new(None),
        }
    }

    fn spawn_reader(
        &self,
        mut stream: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    ) -> JoinHandle<()> {
        let link = Arc::clone(&self.link);
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => link.ingest_text(&text).await,
                    Some(Ok(Message::Binary(bytes))) => link.ingest_bytes(&bytes).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/raw frames
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket receive failed");
                        break;
                    }
                }
            }

            // Unsolicited close: reset state and reject owned commands.
            if state.read().is_connected() {
                *state.write() = ConnectionState::Disconnected;
                *sink.lock().await = None;
                link.teardown(TransportError::disconnected("websocket closed by remote"));
            }
        })
    }
}

impl Default for WifiTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WifiTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Wifi
    }

    async fn assert_support(&self) -> Result<()> {
        // The WebSocket client is always available on a native host.
        Ok(())
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<String> {
        let ConnectOptions::Wifi(options) = options else {
            return Err(TransportError::InvalidOptions {
                reason: format!("expected wifi options, got {}", options.kind()),
            });
        };

        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                return Err(TransportError::connect_failed("already connected"));
            }
            *state = ConnectionState::Connecting;
        }

        let url = match resolve_socket_url(options) {
            Ok(url) => url,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        // The completed handshake is the open event; errors and
        // premature closes surface here.
        let connected = connect_async(url.as_str()).await;
        let (ws_stream, _) = match connected {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(TransportError::connect_failed(format!(
                    "websocket connect to {url} failed: {e}"
                )));
            }
        };

        let (sink, stream) = ws_stream.split();
        *self.sink.lock().await = Some(sink);
        self.link.attach_writer(Arc::new(WifiWriter {
            sink: Arc::clone(&self.sink),
        }));
        *self.reader.lock() = Some(self.spawn_reader(stream));
        *self.state.write() = ConnectionState::Connected;

        let version = match self.link.send_command(crate::ebb::VERSION_QUERY).await {
            Ok(version) => version,
            Err(e) => {
                let _ = self.disconnect().await;
                return Err(e);
            }
        };

        tracing::info!(%url, %version, "websocket link established");
        Ok(version)
    }

    async fn disconnect(&self) -> Result<()> {
        *self.state.write() = ConnectionState::Disconnected;
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            // Best-effort close frame; the sweep below is what matters.
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "websocket close failed");
            }
        }
        self.link
            .teardown(TransportError::disconnected("websocket link closed"));
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn send_command(&self, text: &str) -> Result<String> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.link.send_command(text).await
    }

    async fn send_command_expect_ok(
        &self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.link.send_command_expect_ok(text, timeout).await
    }

    fn register_line_listener(&self, listener: Arc<dyn LineListener>) -> LineListenerHandle {
        self.link.register_line_listener(listener)
    }

    fn unregister_line_listener(&self, handle: &LineListenerHandle) {
        self.link.unregister_line_listener(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_url_passes_through() {
        let options = WifiOptions {
            url: Some("wss://plotter.local:9000/ebb".to_string()),
            ..WifiOptions::default()
        };
        assert_eq!(
            resolve_socket_url(&options).unwrap(),
            "wss://plotter.local:9000/ebb"
        );
    }

    #[test]
    fn bare_url_gets_a_scheme() {
        let options = WifiOptions {
            url: Some("192.168.4.1:1337".to_string()),
            ..WifiOptions::default()
        };
        assert_eq!(
            resolve_socket_url(&options).unwrap(),
            "ws://192.168.4.1:1337"
        );
    }

    #[test]
    fn host_fields_assemble_with_defaults() {
        let options = WifiOptions::for_host("192.168.4.1");
        assert_eq!(
            resolve_socket_url(&options).unwrap(),
            "ws://192.168.4.1:1337/"
        );
    }

    #[test]
    fn port_is_clamped_and_path_normalized() {
        let options = WifiOptions {
            host: Some("plotter.local".to_string()),
            port: Some(700_000),
            secure: true,
            path: Some("ebb".to_string()),
            ..WifiOptions::default()
        };
        assert_eq!(
            resolve_socket_url(&options).unwrap(),
            "wss://plotter.local:65535/ebb"
        );

        let low = WifiOptions {
            host: Some("plotter.local".to_string()),
            port: Some(0),
            ..WifiOptions::default()
        };
        assert_eq!(
            resolve_socket_url(&low).unwrap(),
            "ws://plotter.local:1/"
        );
    }

    #[test]
    fn missing_host_and_url_is_invalid() {
        let err = resolve_socket_url(&WifiOptions::default()).unwrap_err();
        assert!(matches!(err, TransportError::InvalidOptions { .. }));
    }
}
