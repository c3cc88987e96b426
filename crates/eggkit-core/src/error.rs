//! Error handling for EggKit
//!
//! Provides the error taxonomy shared by every transport and by the
//! command queue:
//! - Connection errors (staged for BLE, flat for serial/WebSocket)
//! - Capability errors (transport not usable on this system)
//! - Command errors (write failures, timeouts, protocol rejections)
//! - Teardown errors (the disconnect sweep)
//!
//! All error types use `thiserror` for ergonomic error handling. The
//! enum is `Clone` so a single teardown error can be fanned out to every
//! in-flight command.

use thiserror::Error;

/// Stage of the BLE connection sequence that failed.
///
/// BLE connection establishment is multi-step; reporting the stage lets
/// a host application tell a chooser cancellation apart from a GATT
/// handshake failure or a missing characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleStage {
    /// Scanning for / selecting a device advertising the UART service
    Request,
    /// Establishing the GATT connection
    Gatt,
    /// Resolving the primary UART service
    Service,
    /// Resolving the RX/TX characteristics
    Characteristics,
    /// Subscribing to TX notifications
    Notify,
}

impl std::fmt::Display for BleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Gatt => write!(f, "gatt"),
            Self::Service => write!(f, "service"),
            Self::Characteristics => write!(f, "characteristics"),
            Self::Notify => write!(f, "notify"),
        }
    }
}

/// Transport and command error type
///
/// Every public operation on a transport or on the controller either
/// resolves with a typed success value or rejects with one of these
/// variants.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The transport cannot be used on this system
    #[error("{kind} transport unsupported: {reason}")]
    Unsupported {
        /// The transport kind that was probed.
        kind: String,
        /// Why the capability is absent.
        reason: String,
    },

    /// A stage of the BLE connection sequence failed
    #[error("BLE connect failed at {stage} stage: {reason}")]
    ConnectStage {
        /// The stage that failed.
        stage: BleStage,
        /// The underlying failure.
        reason: String,
    },

    /// Connection establishment failed
    #[error("Connection failed: {reason}")]
    ConnectFailed {
        /// The underlying failure.
        reason: String,
    },

    /// A command was issued while the transport is not connected
    #[error("Not connected")]
    NotConnected,

    /// The underlying transport write rejected or threw
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The underlying failure.
        reason: String,
    },

    /// No settling response line arrived within the command timeout
    #[error("No response within {timeout_ms}ms")]
    ResponseTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The device rejected the command at the protocol level
    #[error("Device rejected command: {response}")]
    UnknownCommand {
        /// Accumulated response lines including the rejection line,
        /// joined by newlines.
        response: String,
    },

    /// The connection was torn down while commands were in flight
    #[error("Disconnected: {reason}")]
    Disconnected {
        /// Why the connection went away.
        reason: String,
    },

    /// Connection options do not fit the selected transport
    #[error("Invalid connection options: {reason}")]
    InvalidOptions {
        /// What was wrong with the options.
        reason: String,
    },
}

impl TransportError {
    /// Connection-failure constructor used by the non-BLE adapters.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            reason: reason.into(),
        }
    }

    /// Write-failure constructor.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Teardown-sweep constructor.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_name_the_stage() {
        let err = TransportError::ConnectStage {
            stage: BleStage::Characteristics,
            reason: "RX characteristic missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "BLE connect failed at characteristics stage: RX characteristic missing"
        );
    }

    #[test]
    fn timeout_error_carries_the_timeout() {
        let err = TransportError::ResponseTimeout { timeout_ms: 1200 };
        assert_eq!(err.to_string(), "No response within 1200ms");
    }

    #[test]
    fn teardown_error_is_cloneable() {
        let err = TransportError::disconnected("link lost");
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
