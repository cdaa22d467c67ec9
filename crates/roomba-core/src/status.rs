//! Status publication and inbound bus commands
//!
//! Status is published as a retained JSON object on
//! `<prefix><hostname>/status`. Publications are triggered by an operator
//! action, an inbound bus command or the periodic timer; only the timer is
//! gated by the schedule kept in [`StatusDispatcher`].

use core::fmt::Write as _;

use heapless::{String, Vec};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::state::DeviceStatus;

pub const TOPIC_MAX: usize = 128;
pub const STATUS_PAYLOAD_MAX: usize = 256;

/// Published by the broker on the status topic when the bridge drops off
pub const LAST_WILL_PAYLOAD: &str = r#"{"device":"disconnected"}"#;

pub type Topic = String<TOPIC_MAX>;
pub type Payload = Vec<u8, STATUS_PAYLOAD_MAX>;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    TopicTooLong,
    PayloadTooLarge,
    InvalidCommand,
}

/// Why a publication happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTrigger {
    Operator,
    BusCommand,
    Periodic,
}

impl StatusTrigger {
    pub fn label(self) -> &'static str {
        match self {
            StatusTrigger::Operator => "operator",
            StatusTrigger::BusCommand => "mqtt",
            StatusTrigger::Periodic => "periodic",
        }
    }
}

/// Network side of the bridge as last reported by the firmware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub wifi_connected: bool,
    pub ip: Option<[u8; 4]>,
    pub rssi_dbm: Option<i8>,
    pub bus_connected: bool,
    pub clock: Option<WallClock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    cleaning: bool,
    charging: bool,
    trigger: &'a str,
    note: &'a str,
    version: &'a str,
    rssi: Option<i8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: Topic,
    pub payload: Payload,
    pub retain: bool,
    pub trigger: StatusTrigger,
}

pub fn status_topic(prefix: &str, hostname: &str) -> Result<Topic, Error> {
    let mut topic = Topic::new();
    write!(topic, "{}{}/status", prefix, hostname).map_err(|_| Error::TopicTooLong)?;
    Ok(topic)
}

/// Broadcast and per-device command topics
pub fn command_topics(prefix: &str, hostname: &str) -> Result<[Topic; 2], Error> {
    let mut broadcast = Topic::new();
    write!(broadcast, "{}cmd", prefix).map_err(|_| Error::TopicTooLong)?;
    let mut device = Topic::new();
    write!(device, "{}{}/cmd", prefix, hostname).map_err(|_| Error::TopicTooLong)?;
    Ok([broadcast, device])
}

/// Schedules periodic publications and serializes the status payload
#[derive(Debug)]
pub struct StatusDispatcher {
    interval_ms: u64,
    next_publish_ms: Option<u64>,
    max_message_size: usize,
    version: &'static str,
}

impl StatusDispatcher {
    pub fn new(interval_secs: u16, max_message_size: usize, version: &'static str) -> Self {
        Self {
            interval_ms: interval_secs as u64 * 1000,
            next_publish_ms: None,
            max_message_size: max_message_size.min(STATUS_PAYLOAD_MAX),
            version,
        }
    }

    /// First periodic publication is due right away; a zero interval
    /// disables the timer
    pub fn start(&mut self, now_ms: u64) {
        self.next_publish_ms = (self.interval_ms > 0).then_some(now_ms);
    }

    pub fn set_interval(&mut self, interval_secs: u16, now_ms: u64) {
        self.interval_ms = interval_secs as u64 * 1000;
        self.next_publish_ms = (self.interval_ms > 0).then_some(now_ms + self.interval_ms);
    }

    pub fn next_publish_ms(&self) -> Option<u64> {
        self.next_publish_ms
    }

    /// True once per elapsed period. Taking the slot arms the next one a full
    /// interval later; [`publish`](Self::publish) moves it to the actual
    /// publication time.
    pub fn take_periodic(&mut self, now_ms: u64) -> bool {
        match self.next_publish_ms {
            Some(due) if now_ms >= due => {
                self.next_publish_ms = Some(now_ms + self.interval_ms);
                true
            }
            _ => false,
        }
    }

    /// Build the retained status publication. The next periodic slot is
    /// rescheduled even if serialization fails.
    pub fn publish(
        &mut self,
        trigger: StatusTrigger,
        topic: &str,
        status: &DeviceStatus,
        note: &str,
        rssi: Option<i8>,
        now_ms: u64,
    ) -> Result<Publication, Error> {
        self.next_publish_ms = (self.interval_ms > 0).then_some(now_ms + self.interval_ms);

        let payload = StatusPayload {
            cleaning: status.cleaning,
            charging: status.charging,
            trigger: trigger.label(),
            note,
            version: self.version,
            rssi,
        };

        let mut buf = [0u8; STATUS_PAYLOAD_MAX];
        let len = serde_json_core::to_slice(&payload, &mut buf[..self.max_message_size])
            .map_err(|_| {
                warn!("Status payload exceeds {} bytes", self.max_message_size);
                Error::PayloadTooLarge
            })?;

        let publication = Publication {
            topic: Topic::try_from(topic).map_err(|_| Error::TopicTooLong)?,
            payload: Payload::from_slice(&buf[..len]).map_err(|_| Error::PayloadTooLarge)?,
            retain: true,
            trigger,
        };
        debug!("Status publication ({}) {} bytes", trigger.label(), len);
        Ok(publication)
    }
}

/// Key whose value is irrelevant, only its presence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Presence(pub bool);

impl<'de> Deserialize<'de> for Presence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(Presence(true))
    }
}

/// Inbound JSON command. Each key is absent, false or true.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct BusCommand {
    #[serde(default)]
    pub clean: Option<bool>,
    #[serde(default)]
    pub dock: Option<bool>,
    #[serde(default)]
    pub status: Presence,
}

impl BusCommand {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        serde_json_core::from_slice::<BusCommand>(bytes)
            .map(|(command, _)| command)
            .map_err(|_| Error::InvalidCommand)
    }
}
