//! # EggKit
//!
//! A Rust-based sender for EggBot-class rotary plotters with support
//! for:
//! - The EBB ASCII command protocol (`SM`, `SP`, `SC`, `EM`, `QB`, ...)
//! - Serial (USB), Bluetooth LE, and WebSocket connectivity
//! - Strict one-at-a-time command dispatch with per-command timeouts
//!
//! ## Architecture
//!
//! EggKit is organized as a workspace with multiple crates:
//!
//! 1. **eggkit-core** - Error taxonomy and connection-state model
//! 2. **eggkit-communication** - Framing, queueing, transports, EBB
//!    commands
//! 3. **eggkit** - Facade crate and console binary
//!
//! The transport layer guarantees that commands settle in submission
//! order, that at most one command is in flight per connection, and
//! that a disconnect rejects every owned command exactly once.

pub use eggkit_communication::ebb;

pub use eggkit_core::{BleStage, ConnectionState, Result, TransportError};

pub use eggkit_communication::{
    list_ports, BleOptions, BleTransport, CommandReply, ConnectOptions, FirmwareVersion,
    LineFramer, LineListener, LineListenerHandle, PenState, PlotterController, ProtocolLink,
    ResponseMode, SerialOptions, SerialPortInfo, SerialTransport, Transport, TransportKind,
    Utf8StreamDecoder, WifiOptions, WifiTransport, DEFAULT_COMMAND_TIMEOUT,
};

/// Initialize tracing for the binary.
///
/// Respects `RUST_LOG`, defaulting to `info`.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    Ok(())
}
