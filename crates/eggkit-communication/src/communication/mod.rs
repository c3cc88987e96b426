//! Transport abstraction for EggBot links
//!
//! Three interchangeable transports carry the same CR-terminated
//! command / newline-terminated response protocol: Serial/USB, BLE
//! (Nordic-UART-style GATT), and WebSocket over Wi-Fi. They differ only
//! in connection establishment and raw I/O; framing, queueing, and
//! response classification are shared via [`ProtocolLink`].

pub mod ble;
pub mod controller;
pub mod framing;
pub mod link;
pub mod queue;
pub mod serial;
pub mod wifi;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use eggkit_core::{ConnectionState, Result};

pub use framing::{LineFramer, Utf8StreamDecoder};
pub use link::{LineListener, LineListenerHandle, ProtocolLink};
pub use queue::{CommandQueue, CommandReply, RawWriter, ResponseMode, DEFAULT_COMMAND_TIMEOUT};

/// The transport kinds a controller can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// USB CDC serial link (default)
    #[default]
    Serial,
    /// Bluetooth Low Energy GATT link
    Ble,
    /// WebSocket link over Wi-Fi
    Wifi,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Ble => write!(f, "ble"),
            Self::Wifi => write!(f, "wifi"),
        }
    }
}

/// Serial connection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialOptions {
    /// Port name, e.g. `/dev/ttyACM0` or `COM4`
    pub port: String,
    /// Baud rate; the EBB CDC interface ignores the value but one must
    /// be negotiated
    pub baud_rate: u32,
}

impl SerialOptions {
    /// Options for `port` at the default EBB baud rate.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: serial::DEFAULT_BAUD_RATE,
        }
    }
}

/// BLE connection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleOptions {
    /// Prefer a device whose advertised name contains this substring
    pub name_hint: Option<String>,
    /// How long to scan before giving up
    pub scan_timeout_ms: u64,
}

impl Default for BleOptions {
    fn default() -> Self {
        Self {
            name_hint: None,
            scan_timeout_ms: 10_000,
        }
    }
}

/// Wi-Fi (WebSocket) connection options.
///
/// Either an explicit `url` or a `host` must be given; the remaining
/// fields default per [`wifi::resolve_socket_url`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiOptions {
    /// Explicit socket URL; overrides the other fields
    pub url: Option<String>,
    /// Device hostname or IP
    pub host: Option<String>,
    /// TCP port, clamped to [1, 65535]; defaults to 1337
    pub port: Option<u32>,
    /// Use `wss://` instead of `ws://`
    pub secure: bool,
    /// URL path; defaults to `/`
    pub path: Option<String>,
}

impl WifiOptions {
    /// Options for a plain `ws://host:1337/` connection.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }
}

/// Connection options, tagged by transport kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectOptions {
    /// Serial connection options
    Serial(SerialOptions),
    /// BLE connection options
    Ble(BleOptions),
    /// Wi-Fi connection options
    Wifi(WifiOptions),
}

impl ConnectOptions {
    /// The transport kind these options belong to.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Serial(_) => TransportKind::Serial,
            Self::Ble(_) => TransportKind::Ble,
            Self::Wifi(_) => TransportKind::Wifi,
        }
    }
}

/// Uniform async contract implemented by every transport adapter.
///
/// `connect` resolves with the firmware version banner obtained by
/// issuing the EBB version query over the freshly opened link.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which kind this adapter implements.
    fn kind(&self) -> TransportKind;

    /// Fail fast when the required OS capability is absent.
    async fn assert_support(&self) -> Result<()>;

    /// Open the physical link and return the firmware version banner.
    async fn connect(&self, options: &ConnectOptions) -> Result<String>;

    /// Tear the link down, rejecting every owned command. Idempotent;
    /// cleanup-path errors are swallowed.
    async fn disconnect(&self) -> Result<()>;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Whether commands may currently be enqueued.
    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Send a line-mode command; resolves with the first response line.
    async fn send_command(&self, text: &str) -> Result<String>;

    /// Send an expect-OK command; resolves with every line before the
    /// OK sentinel.
    async fn send_command_expect_ok(
        &self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>>;

    /// Register a listener for every protocol line this adapter frames.
    fn register_line_listener(&self, listener: Arc<dyn LineListener>) -> LineListenerHandle;

    /// Unregister a previously registered line listener.
    fn unregister_line_listener(&self, handle: &LineListenerHandle);
}

pub use ble::BleTransport;
pub use controller::PlotterController;
pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use wifi::WifiTransport;
