//! Bluetooth Low Energy transport
//!
//! Talks to an EBB bridge exposing a Nordic-UART-style GATT profile:
//! one primary service with an RX characteristic for command writes and
//! a TX characteristic whose notifications carry response bytes.
//!
//! Connection establishment is multi-stage (scan, GATT connect, service
//! resolution, characteristic resolution, notification subscription)
//! and every failure is tagged with the stage it happened in. The write
//! primitive (with/without response) is resolved once at connect time
//! from the RX characteristic's properties. Reconnection is never
//! automatic; BLE device selection is user-initiated by policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use eggkit_core::{BleStage, ConnectionState, Result, TransportError};

use super::link::{LineListener, LineListenerHandle, ProtocolLink};
use super::queue::RawWriter;
use super::{BleOptions, ConnectOptions, Transport, TransportKind};

/// Primary UART service advertised by the bridge.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// RX characteristic: receives command writes.
pub const UART_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// TX characteristic: notifications carry response bytes.
pub const UART_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Poll interval while waiting for a scan hit.
const SCAN_POLL: Duration = Duration::from_millis(200);

fn stage_error(stage: BleStage, reason: impl std::fmt::Display) -> TransportError {
    TransportError::ConnectStage {
        stage,
        reason: reason.to_string(),
    }
}

/// Pick the write primitive once, at connect time.
fn write_type_for(characteristic: &Characteristic) -> WriteType {
    if characteristic
        .properties
        .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
    {
        WriteType::WithoutResponse
    } else {
        WriteType::WithResponse
    }
}

/// Everything needed to write to and tear down a live GATT connection.
struct BleSession {
    peripheral: Peripheral,
    rx_char: Characteristic,
    tx_char: Characteristic,
    write_type: WriteType,
}

type SharedSession = Arc<Mutex<Option<BleSession>>>;

/// Raw writer backed by the RX characteristic.
struct BleWriter {
    session: SharedSession,
}

#[async_trait]
impl RawWriter for BleWriter {
    async fn write_raw(&self, text: &str) -> Result<()> {
        let (peripheral, rx_char, write_type) = {
            let guard = self.session.lock();
            let session = guard.as_ref().ok_or(TransportError::NotConnected)?;
            (
                session.peripheral.clone(),
                session.rx_char.clone(),
                session.write_type,
            )
        };
        peripheral
            .write(&rx_char, text.as_bytes(), write_type)
            .await
            .map_err(|e| TransportError::write_failed(e.to_string()))
    }
}

/// BLE transport adapter.
pub struct BleTransport {
    link: Arc<ProtocolLink>,
    state: Arc<RwLock<ConnectionState>>,
    session: SharedSession,
    notify_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Create a disconnected BLE transport.
    pub fn new() -> Self {
        Self {
            link: ProtocolLink::new(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            session: Arc::new(Mutex::new(None)),
            notify_task: Mutex::new(None),
        }
    }

    async fn central() -> Result<Adapter> {
        let manager = Manager::new()
            .await
            .map_err(|e| stage_error(BleStage::Request, e))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| stage_error(BleStage::Request, e))?;
        adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Unsupported {
                kind: TransportKind::Ble.to_string(),
                reason: "no Bluetooth adapter present".to_string(),
            })
    }

    /// Scan until a peripheral advertising the UART service (and
    /// matching the name hint, when given) shows up.
    async fn wait_for_device(central: &Adapter, options: &BleOptions) -> Result<Peripheral> {
        let deadline = Instant::now() + Duration::from_millis(options.scan_timeout_ms);
        loop {
            let peripherals = central
                .peripherals()
                .await
                .map_err(|e| stage_error(BleStage::Request, e))?;
            for peripheral in peripherals {
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                if !props.services.contains(&UART_SERVICE_UUID) {
                    continue;
                }
                if let Some(hint) = &options.name_hint {
                    let name = props.local_name.unwrap_or_default();
                    if !name.to_lowercase().contains(&hint.to_lowercase()) {
                        continue;
                    }
                }
                return Ok(peripheral);
            }
            if Instant::now() >= deadline {
                return Err(stage_error(
                    BleStage::Request,
                    "no device advertising the UART service found",
                ));
            }
            tokio::time::sleep(SCAN_POLL).await;
        }
    }

    async fn establish(&self, options: &BleOptions) -> Result<String> {
        let central = Self::central().await?;

        central
            .start_scan(ScanFilter {
                services: vec![UART_SERVICE_UUID],
            })
            .await
            .map_err(|e| stage_error(BleStage::Request, e))?;
        let found = Self::wait_for_device(&central, options).await;
        if let Err(e) = central.stop_scan().await {
            tracing::debug!(error = %e, "stop_scan failed");
        }
        let peripheral = found?;

        peripheral
            .connect()
            .await
            .map_err(|e| stage_error(BleStage::Gatt, e))?;

        // From here on, failures must release the GATT connection.
        match self.resolve_and_subscribe(&peripheral).await {
            Ok(version) => Ok(version),
            Err(e) => {
                if let Err(cleanup) = peripheral.disconnect().await {
                    tracing::debug!(error = %cleanup, "peripheral disconnect failed");
                }
                Err(e)
            }
        }
    }

    async fn resolve_and_subscribe(&self, peripheral: &Peripheral) -> Result<String> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| stage_error(BleStage::Service, e))?;
        let service = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == UART_SERVICE_UUID)
            .ok_or_else(|| stage_error(BleStage::Service, "UART service not found"))?;

        let rx_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == UART_RX_CHAR_UUID)
            .cloned()
            .ok_or_else(|| {
                stage_error(BleStage::Characteristics, "RX characteristic not found")
            })?;
        let tx_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == UART_TX_CHAR_UUID)
            .cloned()
            .ok_or_else(|| {
                stage_error(BleStage::Characteristics, "TX characteristic not found")
            })?;
        let write_type = write_type_for(&rx_char);

        peripheral
            .subscribe(&tx_char)
            .await
            .map_err(|e| stage_error(BleStage::Notify, e))?;
        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| stage_error(BleStage::Notify, e))?;

        *self.session.lock() = Some(BleSession {
            peripheral: peripheral.clone(),
            rx_char,
            tx_char,
            write_type,
        });
        self.link.attach_writer(Arc::new(BleWriter {
            session: Arc::clone(&self.session),
        }));

        let link = Arc::clone(&self.link);
        let state = Arc::clone(&self.state);
        let session = Arc::clone(&self.session);
        *self.notify_task.lock() = Some(tokio::spawn(async move {
            let mut notifications = notifications;
            while let Some(notification) = notifications.next().await {
                if notification.uuid == UART_TX_CHAR_UUID {
                    link.ingest_bytes(&notification.value).await;
                }
            }
            // The stream ends when the GATT link drops. If we did not
            // initiate it, reset state and reject owned commands.
            if state.read().is_connected() {
                tracing::warn!("GATT link lost");
                *state.write() = ConnectionState::Disconnected;
                *session.lock() = None;
                link.teardown(TransportError::disconnected("GATT link lost"));
            }
        }));

        *self.state.write() = ConnectionState::Connected;
        self.link.send_command(crate::ebb::VERSION_QUERY).await
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn assert_support(&self) -> Result<()> {
        Self::central().await.map(|_| ())
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<String> {
        let ConnectOptions::Ble(options) = options else {
            return Err(TransportError::InvalidOptions {
                reason: format!("expected ble options, got {}", options.kind()),
            });
        };

        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                return Err(TransportError::connect_failed("already connected"));
            }
            *state = ConnectionState::Connecting;
        }

        match self.establish(options).await {
            Ok(version) => {
                tracing::info!(%version, "BLE link established");
                Ok(version)
            }
            Err(e) => {
                let _ = self.disconnect().await;
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        *self.state.write() = ConnectionState::Disconnected;
        if let Some(handle) = self.notify_task.lock().take() {
            handle.abort();
        }
        let session = self.session.lock().take();
        if let Some(session) = session {
            // Best-effort GATT cleanup; races with a remote disconnect
            // are expected and swallowed.
            if let Err(e) = session.peripheral.unsubscribe(&session.tx_char).await {
                tracing::debug!(error = %e, "unsubscribe failed");
            }
            if let Err(e) = session.peripheral.disconnect().await {
                tracing::debug!(error = %e, "peripheral disconnect failed");
            }
        }
        self.link
            .teardown(TransportError::disconnected("BLE link closed"));
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
