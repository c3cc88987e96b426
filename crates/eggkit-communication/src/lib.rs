//! # EggKit Communication
//!
//! Transport adapters and the EBB command protocol for EggKit.
//! Supports Serial/USB, BLE (Nordic-UART-style GATT), and WebSocket
//! connections, all carrying the same CR-terminated command /
//! newline-terminated response protocol through one shared framing and
//! queueing layer.

pub mod communication;
pub mod ebb;

pub use communication::{
    serial::{list_ports, SerialPortInfo, SerialTransport},
    BleOptions, BleTransport, CommandQueue, CommandReply, ConnectOptions, LineFramer,
    LineListener, LineListenerHandle, PlotterController, ProtocolLink, RawWriter, ResponseMode,
    SerialOptions, Transport, TransportKind, Utf8StreamDecoder, WifiOptions, WifiTransport,
    DEFAULT_COMMAND_TIMEOUT,
};

pub use ebb::{FirmwareVersion, PenState};
