//! Local display state machine
//!
//! Screens are numbered `1..=NUM_SCREENS`; index 0 means nothing was shown
//! yet. The display drops into power-save after [`SCREEN_TIMEOUT_MS`]
//! without a screen action. A modal message replaces the normal screens and
//! suppresses the periodic refresh until the next screen action.

use core::fmt::Write as _;

use heapless::String;
use log::debug;

pub const NUM_SCREENS: u8 = 5;
pub const SCREEN_TIMEOUT_MS: u64 = 30_000;
pub const SCREEN_UPDATE_INTERVAL_MS: u64 = 1_000;
pub const DISPLAY_TITLE: &str = "RoombaESP";

pub const LINE_WIDTH: usize = 32;
pub type Line = String<LINE_WIDTH>;

/// Panel driver seen by the state machine
pub trait DisplayBackend {
    fn set_power_save(&mut self, enabled: bool);
    fn draw(&mut self, header: &str, lines: &[Line]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    Uninitialized,
    Active(u8),
    PowerSave,
    Modal,
}

pub struct Screens<D> {
    backend: D,
    index: u8,
    power_save: bool,
    modal: bool,
    last_activation_ms: u64,
    last_refresh_ms: Option<u64>,
}

impl<D: DisplayBackend> Screens<D> {
    /// Starts uninitialized and already in power-save
    pub fn new(backend: D) -> Self {
        let mut screens = Self {
            backend,
            index: 0,
            power_save: false,
            modal: false,
            last_activation_ms: 0,
            last_refresh_ms: None,
        };
        screens.reset();
        screens
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.modal = false;
        self.last_refresh_ms = None;
        self.enter_power_save();
    }

    pub fn state(&self) -> ScreenState {
        if self.power_save {
            ScreenState::PowerSave
        } else if self.modal {
            ScreenState::Modal
        } else if self.index == 0 {
            ScreenState::Uninitialized
        } else {
            ScreenState::Active(self.index)
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn is_power_save(&self) -> bool {
        self.power_save
    }

    pub fn is_modal(&self) -> bool {
        self.modal
    }

    pub fn backend(&self) -> &D {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut D {
        &mut self.backend
    }

    /// Inactivity check. Only flips the panel into power-save; a modal
    /// message stays stored until the next screen action replaces it.
    pub fn tick(&mut self, now_ms: u64) {
        if !self.power_save && now_ms.saturating_sub(self.last_activation_ms) >= SCREEN_TIMEOUT_MS {
            debug!("Display idle, entering power-save");
            self.enter_power_save();
        }
    }

    /// Due for a content rebuild. Never while in power-save, while a modal
    /// message is shown or before the first screen.
    pub fn need_refresh(&mut self, now_ms: u64) -> bool {
        if self.power_save || self.modal || self.index == 0 {
            return false;
        }
        match self.last_refresh_ms {
            Some(at) if now_ms.saturating_sub(at) < SCREEN_UPDATE_INTERVAL_MS => false,
            _ => {
                self.last_refresh_ms = Some(now_ms);
                true
            }
        }
    }

    /// Short press. Advances when awake; in power-save only wakes the panel
    /// on the current screen.
    pub fn next_screen(&mut self, now_ms: u64) -> u8 {
        if self.power_save {
            self.wake();
            if self.index == 0 {
                self.index = 1;
            }
        } else {
            self.index = self.index % NUM_SCREENS + 1;
        }
        self.activate(now_ms);
        self.index
    }

    /// Jump to screen `n`, clamped to the valid range
    pub fn show_screen(&mut self, n: u8, now_ms: u64) {
        self.index = n.clamp(1, NUM_SCREENS);
        if self.power_save {
            self.wake();
        }
        self.activate(now_ms);
    }

    /// Show a message over the screens until the next screen action
    pub fn display_msg_force(&mut self, lines: &[Line], now_ms: u64) {
        if self.power_save {
            self.wake();
        }
        self.modal = true;
        self.last_activation_ms = now_ms;
        self.backend.draw(DISPLAY_TITLE, lines);
    }

    /// Draw screen content under the `RoombaESP (n/N)` header
    pub fn display(&mut self, lines: &[Line]) {
        let mut header: Line = String::new();
        if self.modal || self.index == 0 {
            let _ = header.push_str(DISPLAY_TITLE);
        } else {
            let _ = write!(header, "{} ({}/{})", DISPLAY_TITLE, self.index, NUM_SCREENS);
        }
        self.backend.draw(&header, lines);
    }

    fn activate(&mut self, now_ms: u64) {
        self.modal = false;
        self.last_activation_ms = now_ms;
        self.last_refresh_ms = None;
    }

    fn wake(&mut self) {
        self.power_save = false;
        self.backend.set_power_save(false);
    }

    fn enter_power_save(&mut self) {
        self.power_save = true;
        self.backend.set_power_save(true);
    }
}
