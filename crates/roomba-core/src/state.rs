//! Cleaning and charging estimate derived from the latest sensor frame

use crate::sensor::{ChargeState, SensorFrame};

/// Net battery current below this means the motors are running
pub const CLEANING_CURRENT_THRESHOLD_MA: i16 = -400;

/// Dock is charging the battery. False for an invalid frame.
pub fn is_charging(frame: &SensorFrame) -> bool {
    frame.charge_state().is_some_and(ChargeState::is_charging)
}

/// Vacuum draws enough current to be cleaning and is not on the dock
pub fn is_cleaning(frame: &SensorFrame) -> bool {
    if !frame.is_valid() || is_charging(frame) {
        return false;
    }
    frame
        .current_ma()
        .is_some_and(|ma| ma < CLEANING_CURRENT_THRESHOLD_MA)
}

pub fn charge_state_label(frame: &SensorFrame) -> &'static str {
    frame.charge_state().map_or("Unknown", ChargeState::label)
}

/// Point-in-time view of the estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStatus {
    pub cleaning: bool,
    pub charging: bool,
    /// A valid frame backs the flags
    pub trusted: bool,
    pub charge_state: &'static str,
    /// Milliseconds since the frame was read
    pub age_ms: Option<u64>,
}

impl DeviceStatus {
    pub fn from_frame(frame: &SensorFrame, now_ms: u64) -> Self {
        Self {
            cleaning: is_cleaning(frame),
            charging: is_charging(frame),
            trusted: frame.is_valid(),
            charge_state: charge_state_label(frame),
            age_ms: frame
                .is_valid()
                .then(|| frame.read_at_ms())
                .flatten()
                .map(|at| now_ms.saturating_sub(at)),
        }
    }
}
