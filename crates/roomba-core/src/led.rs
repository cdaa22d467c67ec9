//! Status LED patterns
//!
//! Offline: 100 ms on, 100 ms off. Connected: 100 ms flash every 5 s.
//! A command holds the LED on for 300 ms before the pattern resumes.

pub const OFFLINE_BLINK_MS: u64 = 100;
pub const HEARTBEAT_ON_MS: u64 = 100;
pub const HEARTBEAT_OFF_MS: u64 = 5_000;
pub const ACTIVITY_FLASH_MS: u64 = 300;

#[derive(Debug)]
pub struct StatusLed {
    effect: bool,
    brightness: u8,
    on: bool,
    next_toggle_ms: u64,
    flash_until_ms: Option<u64>,
}

impl StatusLed {
    pub fn new(effect: bool, brightness: u8) -> Self {
        Self {
            effect,
            brightness: brightness.min(100),
            on: false,
            next_toggle_ms: 0,
            flash_until_ms: None,
        }
    }

    pub fn configure(&mut self, effect: bool, brightness: u8) {
        self.effect = effect;
        self.brightness = brightness.min(100);
    }

    /// Duty cycle in percent used while the LED is lit
    pub fn on_level(&self) -> u8 {
        if self.effect {
            self.brightness
        } else {
            100
        }
    }

    /// Acknowledge a command
    pub fn flash(&mut self, now_ms: u64) {
        self.flash_until_ms = Some(now_ms + ACTIVITY_FLASH_MS);
    }

    /// Duty cycle in percent for `now_ms`
    pub fn poll(&mut self, now_ms: u64, connected: bool) -> u8 {
        if let Some(until) = self.flash_until_ms {
            if now_ms < until {
                return self.on_level();
            }
            self.flash_until_ms = None;
            self.on = false;
            self.next_toggle_ms = now_ms;
        }

        if now_ms >= self.next_toggle_ms {
            self.on = !self.on;
            let period = match (connected, self.on) {
                (false, _) => OFFLINE_BLINK_MS,
                (true, true) => HEARTBEAT_ON_MS,
                (true, false) => HEARTBEAT_OFF_MS,
            };
            self.next_toggle_ms = now_ms + period;
        }

        if self.on {
            self.on_level()
        } else {
            0
        }
    }
}
