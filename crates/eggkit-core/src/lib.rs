//! # EggKit Core
//!
//! Core types and utilities for EggKit.
//! Provides the error taxonomy and connection-state model shared by the
//! transport adapters, the command queue, and the controller.

pub mod error;
pub mod state;

pub use error::{BleStage, Result, TransportError};
pub use state::ConnectionState;
