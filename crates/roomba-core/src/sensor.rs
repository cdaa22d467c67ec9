//! Sensor packet decoding
//!
//! The bridge reads sensor group 3 (ten bytes) from the vacuum:
//!
//! ```text
//! byte  0     charging state
//! bytes 1-2   voltage, mV, unsigned big-endian
//! bytes 3-4   current, mA, signed big-endian
//! byte  5     temperature, °C, signed
//! bytes 6-7   battery charge, mAh, unsigned big-endian
//! bytes 8-9   battery capacity, mAh, unsigned big-endian
//! ```
//!
//! A frame is only trusted when exactly [`FRAME_LEN`] bytes arrived for the
//! most recent query. Every reading is `None` otherwise.

/// Sensor group requested for the status frame
pub const SENSOR_GROUP_ID: u8 = 3;

/// Byte count of a sensor group 3 reply
pub const FRAME_LEN: usize = 10;

/// A cached frame younger than this is reused for non-forced refreshes
pub const MIN_REFRESH_INTERVAL_MS: u64 = 2_000;

/// Charging state reported in byte 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    NotCharging,
    Reconditioning,
    Full,
    Trickle,
    Waiting,
    Fault,
}

impl ChargeState {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChargeState::NotCharging),
            1 => Some(ChargeState::Reconditioning),
            2 => Some(ChargeState::Full),
            3 => Some(ChargeState::Trickle),
            4 => Some(ChargeState::Waiting),
            5 => Some(ChargeState::Fault),
            _ => None,
        }
    }

    /// States in which the dock is driving the battery
    pub fn is_charging(self) -> bool {
        matches!(
            self,
            ChargeState::Reconditioning | ChargeState::Full | ChargeState::Trickle | ChargeState::Fault
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ChargeState::NotCharging => "Not charging",
            ChargeState::Reconditioning => "Reconditioning",
            ChargeState::Full => "Full",
            ChargeState::Trickle => "Trickle",
            ChargeState::Waiting => "Waiting",
            ChargeState::Fault => "Fault",
        }
    }
}

/// Last sensor group reply plus its validity and read time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorFrame {
    bytes: [u8; FRAME_LEN],
    valid: bool,
    read_at_ms: Option<u64>,
}

impl SensorFrame {
    /// Build a valid frame from raw bytes
    pub fn from_bytes(bytes: [u8; FRAME_LEN], now_ms: u64) -> Self {
        Self {
            bytes,
            valid: true,
            read_at_ms: Some(now_ms),
        }
    }

    /// Take the bytes of a group reply. Anything but exactly [`FRAME_LEN`]
    /// bytes invalidates the frame.
    pub fn accept(&mut self, reply: &[u8], now_ms: u64) -> bool {
        if reply.len() == FRAME_LEN {
            self.bytes.copy_from_slice(reply);
            self.valid = true;
            self.read_at_ms = Some(now_ms);
        } else {
            self.bytes = [0; FRAME_LEN];
            self.valid = false;
        }
        self.valid
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn read_at_ms(&self) -> Option<u64> {
        self.read_at_ms
    }

    /// Valid and read less than `min_interval_ms` ago
    pub fn is_fresh(&self, now_ms: u64, min_interval_ms: u64) -> bool {
        self.valid
            && self
                .read_at_ms
                .is_some_and(|at| now_ms.saturating_sub(at) < min_interval_ms)
    }

    pub fn raw(&self) -> Option<&[u8; FRAME_LEN]> {
        self.valid.then_some(&self.bytes)
    }

    pub fn charge_state_byte(&self) -> Option<u8> {
        self.raw().map(|b| b[0])
    }

    pub fn charge_state(&self) -> Option<ChargeState> {
        self.charge_state_byte().and_then(ChargeState::from_byte)
    }

    pub fn voltage_mv(&self) -> Option<u16> {
        self.raw().map(|b| u16::from_be_bytes([b[1], b[2]]))
    }

    pub fn current_ma(&self) -> Option<i16> {
        self.raw().map(|b| i16::from_be_bytes([b[3], b[4]]))
    }

    pub fn temperature_c(&self) -> Option<i8> {
        self.raw().map(|b| b[5] as i8)
    }

    pub fn charge_mah(&self) -> Option<u16> {
        self.raw().map(|b| u16::from_be_bytes([b[6], b[7]]))
    }

    pub fn capacity_mah(&self) -> Option<u16> {
        self.raw().map(|b| u16::from_be_bytes([b[8], b[9]]))
    }

    /// Charge relative to capacity, unknown unless both are non-zero
    pub fn battery_percent(&self) -> Option<f32> {
        match (self.charge_mah(), self.capacity_mah()) {
            (Some(charge), Some(capacity)) if charge > 0 && capacity > 0 => {
                Some(charge as f32 * 100.0 / capacity as f32)
            }
            _ => None,
        }
    }
}

/// Interpret a single-packet reply: one byte is sign-extended, two bytes
/// combine as `high * 256 + low`. Any other length is a failed read.
pub fn decode_scalar(reply: &[u8]) -> Option<i32> {
    match *reply {
        [value] => Some(value as i8 as i32),
        [high, low] => Some(high as i32 * 256 + low as i32),
        _ => None,
    }
}
