//! Push button classification
//!
//! A press fires [`ButtonEvent::ShortPress`] on its leading edge. Holding it
//! for [`LONG_PRESS_MS`] fires [`ButtonEvent::LongPress`] once per hold.

pub const LONG_PRESS_MS: u64 = 10_000;
/// Contact bounce window; a re-press this soon after a release is the same press
pub const DEBOUNCE_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Default)]
pub struct Button {
    pressed: bool,
    press_started_ms: Option<u64>,
    released_at_ms: Option<u64>,
    long_press_fired: bool,
}

impl Button {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feed one raw sample (`true` = pressed)
    pub fn poll(&mut self, pressed: bool, now_ms: u64) -> Option<ButtonEvent> {
        if !pressed {
            if self.pressed {
                self.pressed = false;
                self.released_at_ms = Some(now_ms);
            }
            return None;
        }

        if !self.pressed {
            self.pressed = true;
            let bounce = self
                .released_at_ms
                .is_some_and(|at| now_ms.saturating_sub(at) < DEBOUNCE_MS);
            if !bounce || self.press_started_ms.is_none() {
                self.press_started_ms = Some(now_ms);
                self.long_press_fired = false;
                return Some(ButtonEvent::ShortPress);
            }
        }

        let held_ms = self
            .press_started_ms
            .map_or(0, |start| now_ms.saturating_sub(start));
        if !self.long_press_fired && held_ms >= LONG_PRESS_MS {
            self.long_press_fired = true;
            return Some(ButtonEvent::LongPress);
        }
        None
    }
}
