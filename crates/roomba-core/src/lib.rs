//! Board-agnostic core of the Roomba WiFi bridge
//!
//! Everything that talks to the vacuum or decides what the bridge shows and
//! publishes lives here, written against `embedded-hal`, `embedded-io` and
//! `embedded-storage` traits so it can run on the ESP32 and on the host:
//!
//! - Versioned configuration record kept in NOR flash
//! - Non-blocking serial engine for the Open Interface command set
//! - Sensor frame decoding and the derived cleaning/charging estimate
//! - Status publication scheduling and payload serialization
//! - Display screen state machine and screen content
//! - Button debouncing and status LED patterns

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod app;
pub mod button;
pub mod config;
pub mod led;
pub mod protocol;
pub mod render;
pub mod screens;
pub mod sensor;
pub mod state;
pub mod status;

#[cfg(test)]
pub(crate) mod mock;
