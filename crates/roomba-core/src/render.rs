//! Content of the five display screens

use core::fmt::{self, Write as _};

use heapless::String;

use crate::config::ConfigSource;
use crate::screens::{Line, NUM_SCREENS};
use crate::sensor::SensorFrame;
use crate::state;
use crate::status::LinkStatus;

pub const SCREEN_LINES: usize = 5;
pub const UNKNOWN: &str = "unknown";
/// Shown for a clean that never happened
pub const NEVER: &str = "---";

pub type ScreenLines = [Line; SCREEN_LINES];

/// Everything a screen may show, gathered once per refresh
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot<'a> {
    pub link: &'a LinkStatus,
    pub frame: &'a SensorFrame,
    pub hostname: &'a str,
    pub mqtt_server: &'a str,
    pub version: &'a str,
    pub config_source: ConfigSource,
    pub uptime_ms: u64,
    pub last_clean_ms: Option<u64>,
}

/// Lines for screen `index` (1-based). Out of range renders blank.
pub fn render_screen(index: u8, snap: &StatusSnapshot) -> ScreenLines {
    let mut lines = ScreenLines::default();
    let [a, b, c, d, e] = &mut lines;
    match index {
        1 => connectivity(snap, [a, b, c, d, e]),
        2 => sensors(snap, [a, b, c, d, e]),
        3 => battery(snap, [a, b, c, d, e]),
        4 => activity(snap, [a, b, c, d, e]),
        NUM_SCREENS => firmware(snap, [a, b, c, d, e]),
        _ => {}
    }
    lines
}

fn connectivity(snap: &StatusSnapshot, [wifi, ip, signal, bus, time]: [&mut Line; SCREEN_LINES]) {
    let link = snap.link;
    let _ = write!(Truncate(wifi), "WiFi: {}", online(link.wifi_connected));
    let _ = match link.ip {
        Some([a, b, c, d]) => write!(Truncate(ip), "IP: {}.{}.{}.{}", a, b, c, d),
        None => write!(Truncate(ip), "IP: {}", NEVER),
    };
    let _ = match link.rssi_dbm {
        Some(dbm) => write!(Truncate(signal), "Signal: {}% ({} dBm)", signal_quality(dbm), dbm),
        None => write!(Truncate(signal), "Signal: {}", UNKNOWN),
    };
    let _ = write!(Truncate(bus), "MQTT: {}", online(link.bus_connected));
    let _ = match link.clock {
        Some(clock) => write!(
            Truncate(time),
            "Time: {:02}:{:02}:{:02}",
            clock.hour,
            clock.minute,
            clock.second
        ),
        None => write!(Truncate(time), "Time: {}", UNKNOWN),
    };
}

fn sensors(snap: &StatusSnapshot, [cleaning, charging, charge_state, voltage, temperature]: [&mut Line; SCREEN_LINES]) {
    let frame = snap.frame;
    if frame.is_valid() {
        let _ = write!(Truncate(cleaning), "Cleaning: {}", yes_no(state::is_cleaning(frame)));
        let _ = write!(Truncate(charging), "Charging: {}", yes_no(state::is_charging(frame)));
    } else {
        let _ = write!(Truncate(cleaning), "Cleaning: {}", UNKNOWN);
        let _ = write!(Truncate(charging), "Charging: {}", UNKNOWN);
    }
    let _ = write!(Truncate(charge_state), "State: {}", state::charge_state_label(frame));
    let _ = match frame.voltage_mv() {
        Some(mv) => write!(Truncate(voltage), "Voltage: {:.2} V", mv as f32 / 1000.0),
        None => write!(Truncate(voltage), "Voltage: {}", UNKNOWN),
    };
    let _ = match frame.temperature_c() {
        Some(c) => write!(Truncate(temperature), "Temp: {} C", c),
        None => write!(Truncate(temperature), "Temp: {}", UNKNOWN),
    };
}

fn battery(snap: &StatusSnapshot, [percent, charge, capacity, current, charge_state]: [&mut Line; SCREEN_LINES]) {
    let frame = snap.frame;
    let _ = match frame.battery_percent() {
        Some(p) => write!(Truncate(percent), "Battery: {:.1} %", p),
        None => write!(Truncate(percent), "Battery: {}", UNKNOWN),
    };
    let _ = match frame.charge_mah() {
        Some(mah) => write!(Truncate(charge), "Charge: {} mAh", mah),
        None => write!(Truncate(charge), "Charge: {}", UNKNOWN),
    };
    let _ = match frame.capacity_mah() {
        Some(mah) => write!(Truncate(capacity), "Capacity: {} mAh", mah),
        None => write!(Truncate(capacity), "Capacity: {}", UNKNOWN),
    };
    let _ = match frame.current_ma() {
        Some(ma) => write!(Truncate(current), "Current: {} mA", ma),
        None => write!(Truncate(current), "Current: {}", UNKNOWN),
    };
    let _ = write!(Truncate(charge_state), "State: {}", state::charge_state_label(frame));
}

fn activity(snap: &StatusSnapshot, [clean_label, clean, uptime_label, uptime, _]: [&mut Line; SCREEN_LINES]) {
    let _ = clean_label.push_str("Last clean:");
    let _ = match snap.last_clean_ms {
        Some(at) => write!(
            Truncate(clean),
            " {} ago",
            format_duration(snap.uptime_ms.saturating_sub(at))
        ),
        None => write!(Truncate(clean), " {}", NEVER),
    };
    let _ = uptime_label.push_str("Uptime:");
    let _ = write!(Truncate(uptime), " {}", format_duration(snap.uptime_ms));
}

fn firmware(snap: &StatusSnapshot, [version, host, source, server, _]: [&mut Line; SCREEN_LINES]) {
    let _ = write!(Truncate(version), "Firmware: {}", snap.version);
    let _ = write!(Truncate(host), "Host: {}", snap.hostname);
    let _ = write!(Truncate(source), "Config: {}", snap.config_source.label());
    let _ = write!(Truncate(server), "MQTT: {}", snap.mqtt_server);
}

fn online(up: bool) -> &'static str {
    if up {
        "connected"
    } else {
        "offline"
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// `DD:HH:MM:SS`
pub fn format_duration(ms: u64) -> String<16> {
    let secs = ms / 1000;
    let mut out = String::new();
    let _ = write!(
        out,
        "{:02}:{:02}:{:02}:{:02}",
        secs / 86_400,
        secs / 3_600 % 24,
        secs / 60 % 60,
        secs % 60
    );
    out
}

/// Link quality percent from RSSI
pub fn signal_quality(dbm: i8) -> u8 {
    match dbm {
        ..=-100 => 0,
        -50.. => 100,
        _ => (2 * (dbm as i16 + 100)) as u8,
    }
}

/// Writes until the line is full and drops the rest
struct Truncate<'a>(&'a mut Line);

impl fmt::Write for Truncate<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screens::LINE_WIDTH;
    use crate::status::WallClock;

    const KNOWN: [u8; 10] = [2, 0x10, 0x00, 0xFF, 0x38, 0x14, 0x02, 0x58, 0x09, 0xC4];

    fn render(index: u8, link: &LinkStatus, frame: &SensorFrame) -> ScreenLines {
        let snap = StatusSnapshot {
            link,
            frame,
            hostname: "den",
            mqtt_server: "broker.lan",
            version: "1.2.0",
            config_source: ConfigSource::Persisted,
            uptime_ms: 90_061_000,
            last_clean_ms: Some(90_000_000),
        };
        render_screen(index, &snap)
    }

    #[test]
    fn test_duration_format() {
        assert_eq!(format_duration(0), "00:00:00:00");
        assert_eq!(format_duration(90_061_000), "01:01:01:01");
        assert_eq!(format_duration(999), "00:00:00:00");
    }

    #[test]
    fn test_signal_quality() {
        assert_eq!(signal_quality(-120), 0);
        assert_eq!(signal_quality(-100), 0);
        assert_eq!(signal_quality(-75), 50);
        assert_eq!(signal_quality(-50), 100);
        assert_eq!(signal_quality(-30), 100);
    }

    #[test]
    fn test_connectivity_screen() {
        let link = LinkStatus {
            wifi_connected: true,
            ip: Some([192, 168, 1, 20]),
            rssi_dbm: Some(-61),
            bus_connected: false,
            clock: Some(WallClock {
                hour: 7,
                minute: 5,
                second: 9,
            }),
        };
        let lines = render(1, &link, &SensorFrame::default());
        assert_eq!(lines[0], "WiFi: connected");
        assert_eq!(lines[1], "IP: 192.168.1.20");
        assert_eq!(lines[2], "Signal: 78% (-61 dBm)");
        assert_eq!(lines[3], "MQTT: offline");
        assert_eq!(lines[4], "Time: 07:05:09");
    }

    #[test]
    fn test_sensor_screens_with_valid_frame() {
        let frame = SensorFrame::from_bytes(KNOWN, 0);
        let link = LinkStatus::default();

        let lines = render(2, &link, &frame);
        assert_eq!(lines[0], "Cleaning: no");
        assert_eq!(lines[1], "Charging: yes");
        assert_eq!(lines[2], "State: Full");
        assert_eq!(lines[3], "Voltage: 4.10 V");
        assert_eq!(lines[4], "Temp: 20 C");

        let lines = render(3, &link, &frame);
        assert_eq!(lines[0], "Battery: 24.0 %");
        assert_eq!(lines[1], "Charge: 600 mAh");
        assert_eq!(lines[2], "Capacity: 2500 mAh");
        assert_eq!(lines[3], "Current: -200 mA");
    }

    #[test]
    fn test_invalid_frame_renders_unknown() {
        let link = LinkStatus::default();
        let frame = SensorFrame::default();
        for index in [2, 3] {
            for line in render(index, &link, &frame).iter().filter(|l| !l.is_empty()) {
                assert!(line.to_lowercase().ends_with(UNKNOWN), "{}", line);
            }
        }
    }

    #[test]
    fn test_activity_and_firmware_screens() {
        let link = LinkStatus::default();
        let frame = SensorFrame::default();

        let lines = render(4, &link, &frame);
        assert_eq!(lines[1], " 00:00:01:01 ago");
        assert_eq!(lines[3], " 01:01:01:01");

        let lines = render(5, &link, &frame);
        assert_eq!(lines[0], "Firmware: 1.2.0");
        assert_eq!(lines[1], "Host: den");
        assert_eq!(lines[2], "Config: persisted");
        assert_eq!(lines[3], "MQTT: broker.lan");
    }

    #[test]
    fn test_never_cleaned() {
        let link = LinkStatus::default();
        let frame = SensorFrame::default();
        let snap = StatusSnapshot {
            link: &link,
            frame: &frame,
            hostname: "den",
            mqtt_server: "",
            version: "1.2.0",
            config_source: ConfigSource::Default,
            uptime_ms: 5_000,
            last_clean_ms: None,
        };
        assert_eq!(render_screen(4, &snap)[1], " ---");
    }

    #[test]
    fn test_long_values_are_truncated() {
        let link = LinkStatus::default();
        let frame = SensorFrame::default();
        let host = "h".repeat(64);
        let snap = StatusSnapshot {
            link: &link,
            frame: &frame,
            hostname: &host,
            mqtt_server: "",
            version: "1.2.0",
            config_source: ConfigSource::Default,
            uptime_ms: 0,
            last_clean_ms: None,
        };
        let lines = render_screen(5, &snap);
        assert_eq!(lines[1].len(), LINE_WIDTH);
        assert!(lines[1].starts_with("Host: hhh"));
    }
}
