//! EBB command builders
//!
//! Each builder formats one command of the EBB ASCII set. Query
//! commands with no parameters are plain constants.

use serde::{Deserialize, Serialize};

/// `V`: firmware version query. Answers with a single banner line.
pub const VERSION_QUERY: &str = "V";

/// `ES`: emergency stop. Aborts any motion in progress on the board.
pub const EMERGENCY_STOP: &str = "ES";

/// `QB`: query whether the PRG button was pressed since the last poll.
pub const QUERY_BUTTON: &str = "QB";

/// `QP`: query the current pen state.
pub const QUERY_PEN: &str = "QP";

/// `TP`: toggle the pen between its up and down positions.
pub const TOGGLE_PEN: &str = "TP";

/// Pen position for the `SP` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenState {
    /// Servo to the pen-up position
    Up,
    /// Servo to the pen-down position
    Down,
}

impl PenState {
    fn as_value(&self) -> u8 {
        match self {
            Self::Up => 1,
            Self::Down => 0,
        }
    }
}

/// `SM,<duration>,<axis1>[,<axis2>]`: move both steppers over
/// `duration_ms`, stepping each motor by the given signed step counts.
pub fn move_steppers(duration_ms: u32, axis1_steps: i32, axis2_steps: i32) -> String {
    format!("SM,{duration_ms},{axis1_steps},{axis2_steps}")
}

/// `SP,<value>[,<duration>]`: raise or lower the pen, optionally
/// delaying subsequent commands by `duration_ms` while the servo moves.
pub fn set_pen(state: PenState, duration_ms: Option<u16>) -> String {
    match duration_ms {
        Some(duration) => format!("SP,{},{duration}", state.as_value()),
        None => format!("SP,{}", state.as_value()),
    }
}

/// `SC,<parameter>,<value>`: configure a servo or stepper parameter
/// (servo min/max positions, rates, PRG button modes).
pub fn configure(parameter: u8, value: u16) -> String {
    format!("SC,{parameter},{value}")
}

/// `EM,<enable1>,<enable2>`: enable or disable the stepper drivers.
///
/// Non-zero values select the microstep mode (1 = 1/16 step through
/// 5 = full step); zero disables the motor.
pub fn enable_motors(motor1_mode: u8, motor2_mode: u8) -> String {
    format!("EM,{motor1_mode},{motor2_mode}")
}
