//! Plotter controller: one merged control surface over the transports
//!
//! Holds one adapter per transport kind and a single selected kind
//! (serial by default), routing every public operation to the active
//! adapter. Controllers are explicitly constructed and caller-owned so
//! independent connections can coexist and tests get fresh instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use eggkit_core::{Result, TransportError};

use crate::ebb;

use super::ble::BleTransport;
use super::link::{LineListener, LineListenerHandle};
use super::serial::SerialTransport;
use super::wifi::WifiTransport;
use super::{ConnectOptions, Transport, TransportKind};

type ListenerMap = Arc<RwLock<HashMap<String, Arc<dyn LineListener>>>>;

/// Forwards every adapter's lines into the controller-level registry.
///
/// One relay is registered on each adapter at construction; only the
/// connected adapter produces lines, so listeners survive transport
/// switches without re-registration.
struct LineRelay {
    listeners: ListenerMap,
}

impl LineListener for LineRelay {
    fn on_line(&self, line: &str) {
        let listeners: Vec<_> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener.on_line(line);
        }
    }
}

/// Transport-agnostic EggBot control surface.
pub struct PlotterController {
    kind: RwLock<TransportKind>,
    serial: Arc<SerialTransport>,
    ble: Arc<BleTransport>,
    wifi: Arc<WifiTransport>,
    listeners: ListenerMap,
}

impl PlotterController {
    /// Create a controller with the serial transport selected.
    pub fn new() -> Self {
        let serial = Arc::new(SerialTransport::new());
        let ble = Arc::new(BleTransport::new());
        let wifi = Arc::new(WifiTransport::new());
        let listeners: ListenerMap = Arc::new(RwLock::new(HashMap::new()));

        for adapter in [
            Arc::clone(&serial) as Arc<dyn Transport>,
            Arc::clone(&ble) as Arc<dyn Transport>,
            Arc::clone(&wifi) as Arc<dyn Transport>,
        ] {
            adapter.register_line_listener(Arc::new(LineRelay {
                listeners: Arc::clone(&listeners),
            }));
        }

        Self {
            kind: RwLock::new(TransportKind::default()),
            serial,
            ble,
            wifi,
            listeners,
        }
    }

    fn adapter(&self, kind: TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::Serial => Arc::clone(&self.serial) as Arc<dyn Transport>,
            TransportKind::Ble => Arc::clone(&self.ble) as Arc<dyn Transport>,
            TransportKind::Wifi => Arc::clone(&self.wifi) as Arc<dyn Transport>,
        }
    }

    fn active(&self) -> Arc<dyn Transport> {
        self.adapter(*self.kind.read())
    }

    /// The currently selected transport kind.
    pub fn transport_kind(&self) -> TransportKind {
        *self.kind.read()
    }

    /// Select a different transport kind.
    ///
    /// A no-op returning `false` when `kind` is already active;
    /// otherwise the current adapter is disconnected first (rejecting
    /// its pending commands) and `true` is returned.
    pub async fn switch_transport_kind(&self, kind: TransportKind) -> Result<bool> {
        if *self.kind.read() == kind {
            return Ok(false);
        }
        let current = self.active();
        if current.is_connected() {
            current.disconnect().await?;
        }
        *self.kind.write() = kind;
        tracing::info!(%kind, "transport kind switched");
        Ok(true)
    }

    /// Probe whether a transport kind is usable, without side effects.
    pub async fn is_transport_supported(&self, kind: TransportKind) -> bool {
        self.adapter(kind).assert_support().await.is_ok()
    }

    /// Connect the active adapter; resolves with the firmware version.
    ///
    /// The options variant must match the selected kind.
    pub async fn connect(&self, options: &ConnectOptions) -> Result<String> {
        let kind = self.transport_kind();
        if options.kind() != kind {
            return Err(TransportError::InvalidOptions {
                reason: format!(
                    "options are for the {} transport but {kind} is selected",
                    options.kind()
                ),
            });
        }
        self.active().connect(options).await
    }

    /// Disconnect the active adapter.
    pub async fn disconnect(&self) -> Result<()> {
        self.active().disconnect().await
    }

    /// Whether the active adapter is connected.
    pub fn is_connected(&self) -> bool {
        self.active().is_connected()
    }

    /// Send a line-mode command on the active adapter.
    pub async fn send_command(&self, text: &str) -> Result<String> {
        self.active().send_command(text).await
    }

    /// Send an expect-OK command on the active adapter.
    pub async fn send_command_expect_ok(
        &self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        self.active().send_command_expect_ok(text, timeout).await
    }

    /// Advisory stop: forward the emergency-stop command to the device.
    ///
    /// Queued commands are neither removed nor altered; a caller that
    /// wants to abort unresolved work must disconnect instead.
    pub async fn stop(&self) -> Result<Vec<String>> {
        self.send_command_expect_ok(ebb::EMERGENCY_STOP, None).await
    }

    /// Tear down every adapter regardless of which one is active.
    ///
    /// Per-adapter failures are logged and swallowed so one failure
    /// cannot block cleanup of the others.
    pub async fn disconnect_all(&self) {
        for kind in [TransportKind::Serial, TransportKind::Ble, TransportKind::Wifi] {
            if let Err(e) = self.adapter(kind).disconnect().await {
                tracing::warn!(%kind, error = %e, "disconnect failed");
            }
        }
    }

    /// Reconnect the serial transport to a previously granted port.
    ///
    /// Only serial carries reconnect semantics; for BLE (where device
    /// selection must stay user-initiated) and Wi-Fi this is a
    /// controlled no-op returning `false`.
    pub async fn reconnect_if_known(&self) -> Result<bool> {
        match self.transport_kind() {
            TransportKind::Serial => self.serial.reconnect_if_known().await,
            TransportKind::Ble | TransportKind::Wifi => Ok(false),
        }
    }

    /// Register a listener for every protocol line, across transport
    /// switches.
    pub fn register_line_listener(&self, listener: Arc<dyn LineListener>) -> LineListenerHandle {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().insert(id.clone(), listener);
        LineListenerHandle(id)
    }

    /// Unregister a previously registered line listener.
    pub fn unregister_line_listener(&self, handle: &LineListenerHandle) {
        let _ = self.listeners.write().remove(&handle.0);
    }

    /// Number of controller-level line listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl Default for PlotterController {
    fn default() -> Self {
        Self::new()
    }
}
