//! Serial port transport
//!
//! Direct USB CDC connection to the EBB controller board. The EBB
//! enumerates as a USB modem (`/dev/ttyACM*`, `COM*`,
//! `/dev/cu.usbmodem*`) with Microchip VID `0x04D8` / PID `0xFD92`.
//!
//! Supports:
//! - Port enumeration and discovery with USB metadata
//! - EBB candidate detection for transparent reconnect
//! - Blocking read/write with a short poll timeout behind a spawned
//!   receive loop

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use eggkit_core::{ConnectionState, Result, TransportError};

use super::link::{LineListener, LineListenerHandle, ProtocolLink};
use super::queue::RawWriter;
use super::{ConnectOptions, SerialOptions, Transport, TransportKind};

/// Default EBB baud rate. The CDC interface ignores the value, but a
/// rate must be negotiated to open the port.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// USB vendor ID of the EBB (Microchip).
pub const EBB_USB_VID: u16 = 0x04D8;

/// USB product ID of the EBB.
pub const EBB_USB_PID: u16 = 0xFD92;

/// Poll delay between empty reads in the receive loop.
const POLL_DELAY: Duration = Duration::from_millis(5);

/// Blocking read timeout configured on the open port.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Whether this port carries the EBB's USB identity.
    ///
    /// Used as the "safe candidate" predicate for transparent
    /// reconnection.
    pub fn is_ebb(&self) -> bool {
        self.vid == Some(EBB_USB_VID) && self.pid == Some(EBB_USB_PID)
    }
}

/// List available serial ports on the system
///
/// Returns candidate ports with information about each. Filters to the
/// patterns a plotter board can appear under:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => {
            let port_infos: Vec<SerialPortInfo> = ports
                .iter()
                .filter(|port| is_candidate_port(&port.port_name))
                .map(|port| {
                    let info = SerialPortInfo::new(&port.port_name, port_description(port));

                    match &port.port_type {
                        serialport::SerialPortType::UsbPort(usb_info) => {
                            let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                            if let Some(ref mfg) = usb_info.manufacturer {
                                info = info.with_manufacturer(mfg);
                            }
                            if let Some(ref serial) = usb_info.serial_number {
                                info = info.with_serial_number(serial);
                            }
                            info
                        }
                        _ => info,
                    }
                })
                .collect();

            Ok(port_infos)
        }
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(TransportError::connect_failed(format!(
                "Failed to enumerate ports: {e}"
            )))
        }
    }
}

/// Check if a port name matches plotter-board patterns
fn is_candidate_port(port_name: &str) -> bool {
    // Windows COM ports
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    // Linux USB and ACM devices
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }

    // macOS serial and modem devices
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }

    false
}

/// Get a user-friendly description for a port
fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Trait for serial port I/O operations
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

type SharedPort = Arc<Mutex<Option<Box<dyn ReadWrite>>>>;

/// Raw writer backed by the shared port handle.
struct SerialWriter {
    port: SharedPort,
}

#[async_trait]
impl RawWriter for SerialWriter {
    async fn write_raw(&self, text: &str) -> Result<()> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
        port.write_all(text.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::write_failed(e.to_string()))
    }
}

/// Serial transport adapter.
pub struct SerialTransport {
    link: Arc<ProtocolLink>,
    state: Arc<RwLock<ConnectionState>>,
    port: SharedPort,
    reader: Mutex<Option<JoinHandle<()>>>,
    last_options: RwLock<Option<SerialOptions>>,
}

impl SerialTransport {
    /// Create a disconnected serial transport.
    pub fn new() -> Self {
        Self {
            link: ProtocolLink::new(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            port: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            last_options: RwLock::new(None),
        }
    }

    /// Reconnect to a previously granted port when exactly one safe
    /// candidate (an EBB by USB identity) is present.
    ///
    /// Returns `false` without touching anything when no prior
    /// connection exists, the transport is already connected, or the
    /// candidate set is not a singleton.
    pub async fn reconnect_if_known(&self) -> Result<bool> {
        if self.is_connected() {
            return Ok(false);
        }
        let Some(mut options) = self.last_options.read().clone() else {
            return Ok(false);
        };

        let candidates: Vec<SerialPortInfo> =
            list_ports()?.into_iter().filter(|p| p.is_ebb()).collect();
        if candidates.len() != 1 {
            tracing::debug!(
                candidates = candidates.len(),
                "skipping reconnect, no single safe candidate"
            );
            return Ok(false);
        }

        options.port = candidates[0].port_name.clone();
        self.connect(&ConnectOptions::Serial(options)).await?;
        Ok(true)
    }

    fn spawn_reader(&self) -> JoinHandle<()> {
        let link = Arc::clone(&self.link);
        let state = Arc::clone(&self.state);
        let port = Arc::clone(&self.port);

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let read = {
                    let mut guard = port.lock();
                    match guard.as_mut() {
                        Some(p) => p.read(&mut buf),
                        None => break,
                    }
                };
                match read {
                    Ok(0) => tokio::time::sleep(POLL_DELAY).await,
                    Ok(n) => link.ingest_bytes(&buf[..n]).await,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::TimedOut
                                | io::ErrorKind::WouldBlock
                                | io::ErrorKind::Interrupted
                        ) =>
                    {
                        tokio::time::sleep(POLL_DELAY).await;
                    }
                    Err(e) => {
                        // Unsolicited loss of the port (unplug, driver error).
                        tracing::warn!(error = %e, "serial read failed, tearing down");
                        if state.read().is_connected() {
                            *state.write() = ConnectionState::Disconnected;
                            *port.lock() = None;
                            link.teardown(TransportError::disconnected(format!(
                                "serial read failed: {e}"
                            )));
                        }
                        break;
                    }
                }
            }
        })
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn assert_support(&self) -> Result<()> {
        serialport::available_ports()
            .map(|_| ())
            .map_err(|e| TransportError::Unsupported {
                kind: TransportKind::Serial.to_string(),
                reason: e.to_string(),
            })
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<String> {
        let ConnectOptions::Serial(options) = options else {
            return Err(TransportError::InvalidOptions {
                reason: format!("expected serial options, got {}", options.kind()),
            });
        };

        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                return Err(TransportError::connect_failed("already connected"));
            }
            *state = ConnectionState::Connecting;
        }

        let opened = serialport::new(&options.port, options.baud_rate)
            .timeout(READ_TIMEOUT)
            .open_native();
        let port = match opened {
            Ok(port) => port,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                tracing::warn!("Failed to open serial port {}: {}", options.port, e);
                return Err(TransportError::connect_failed(format!(
                    "Failed to open port {}: {e}",
                    options.port
                )));
            }
        };

        *self.port.lock() = Some(Box::new(port));
        self.link.attach_writer(Arc::new(SerialWriter {
            port: Arc::clone(&self.port),
        }));
        *self.reader.lock() = Some(self.spawn_reader());
        *self.state.write() = ConnectionState::Connected;
        *self.last_options.write() = Some(options.clone());

        // The version banner doubles as the link health check.
        let version = match self.link.send_command(crate::ebb::VERSION_QUERY).await {
            Ok(version) => version,
            Err(e) => {
                let _ = self.disconnect().await;
                return Err(e);
            }
        };

        tracing::info!(port = %options.port, %version, "serial link established");
        Ok(version)
    }

    async fn disconnect(&self) -> Result<()> {
        *self.state.write() = ConnectionState::Disconnected;
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        // Dropping the handle closes the port.
        *self.port.lock() = None;
        self.link
            .teardown(TransportError::disconnected("serial link closed"));
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
