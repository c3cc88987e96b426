//! EBB firmware command set
//!
//! Typed builders for the ASCII commands understood by the EiBotBoard
//! firmware, plus firmware-version parsing. The builders produce bare
//! command text; the queue appends the carriage-return terminator.

pub mod commands;
pub mod version;

pub use commands::{
    configure, enable_motors, move_steppers, set_pen, PenState, EMERGENCY_STOP, QUERY_BUTTON,
    QUERY_PEN, TOGGLE_PEN, VERSION_QUERY,
};
pub use version::FirmwareVersion;
