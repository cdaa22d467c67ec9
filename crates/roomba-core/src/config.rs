//! Persistent configuration record
//!
//! A single fixed-layout record lives in a reserved slot of NOR flash. The
//! first byte is a schema version tag; a record whose tag does not match
//! [`CONFIG_VERSION`] is treated as absent and the compiled-in defaults are
//! used instead. There is no per-field migration.
//!
//! Text fields keep the widths of the on-flash layout: short fields hold 29
//! bytes and long fields 49 bytes, NUL padded to 30/50. Longer input is
//! truncated on write at a character boundary.

use embedded_storage::nor_flash::NorFlash;
use heapless::String;

/// Version tag the current build expects in flash
pub const CONFIG_VERSION: u8 = 2;

/// On-flash width of short text fields, including the NUL terminator
pub const SHORT_FIELD_WIDTH: usize = 30;
/// On-flash width of long text fields, including the NUL terminator
pub const LONG_FIELD_WIDTH: usize = 50;

pub type ShortText = String<{ SHORT_FIELD_WIDTH - 1 }>;
pub type LongText = String<{ LONG_FIELD_WIDTH - 1 }>;

/// Encoded record length in bytes
pub const RECORD_LEN: usize = 1 // version
    + 3 * SHORT_FIELD_WIDTH     // admin username, admin password, note
    + 1                         // telnet
    + 4 * SHORT_FIELD_WIDTH     // ssid, psk, hostname, mqtt server
    + 2                         // mqtt port
    + 3 * LONG_FIELD_WIDTH      // mqtt user, mqtt password, mqtt prefix
    + 2                         // publish interval
    + 1                         // led effect
    + 1; // led brightness

/// Bytes reserved for the record in flash
pub const RECORD_SLOT_SIZE: usize = 512;

const _: () = assert!(RECORD_LEN <= RECORD_SLOT_SIZE);

#[derive(Debug)]
pub enum Error {
    /// Slot offset or size does not match the flash geometry
    Alignment,
    /// Underlying flash operation failed
    Flash,
}

/// Where the in-memory record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read back from flash with a matching version tag
    Persisted,
    /// Compiled-in defaults, nothing valid in flash
    Default,
}

impl ConfigSource {
    pub fn label(self) -> &'static str {
        match self {
            ConfigSource::Persisted => "persisted",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRecord {
    pub admin_username: ShortText,
    pub admin_password: ShortText,
    pub note: ShortText,
    pub telnet: bool,
    pub wifi_ssid: ShortText,
    pub wifi_psk: ShortText,
    pub hostname: ShortText,
    pub mqtt_server: ShortText,
    pub mqtt_port: u16,
    pub mqtt_user: LongText,
    pub mqtt_password: LongText,
    pub mqtt_prefix: LongText,
    /// Seconds between periodic status publications, 0 disables them
    pub publish_interval_secs: u16,
    pub led_effect: bool,
    /// Status LED brightness, 0..=100
    pub led_brightness: u8,
}

impl Default for ConfigurationRecord {
    fn default() -> Self {
        Self {
            admin_username: text("admin"),
            admin_password: text("admin"),
            note: String::new(),
            telnet: false,
            wifi_ssid: String::new(),
            wifi_psk: String::new(),
            hostname: text("roomba"),
            mqtt_server: String::new(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_password: String::new(),
            mqtt_prefix: text("roomba/"),
            publish_interval_secs: 60,
            led_effect: false,
            led_brightness: 50,
        }
    }
}

/// Build a bounded text value, truncating at a character boundary
pub fn text<const N: usize>(value: &str) -> String<N> {
    let mut out = String::new();
    set_text(&mut out, value);
    out
}

/// Overwrite `field` with `value`, dropping whatever does not fit
pub fn set_text<const N: usize>(field: &mut String<N>, value: &str) {
    field.clear();
    for c in value.chars() {
        if field.push(c).is_err() {
            break;
        }
    }
}

impl ConfigurationRecord {
    /// Serialize into the fixed on-flash layout, version tag first
    pub fn encode(&self, buf: &mut [u8; RECORD_LEN]) {
        let mut w = Writer { buf, pos: 0 };
        w.put_u8(CONFIG_VERSION);
        w.put_text(&self.admin_username, SHORT_FIELD_WIDTH);
        w.put_text(&self.admin_password, SHORT_FIELD_WIDTH);
        w.put_text(&self.note, SHORT_FIELD_WIDTH);
        w.put_u8(self.telnet as u8);
        w.put_text(&self.wifi_ssid, SHORT_FIELD_WIDTH);
        w.put_text(&self.wifi_psk, SHORT_FIELD_WIDTH);
        w.put_text(&self.hostname, SHORT_FIELD_WIDTH);
        w.put_text(&self.mqtt_server, SHORT_FIELD_WIDTH);
        w.put_u16(self.mqtt_port);
        w.put_text(&self.mqtt_user, LONG_FIELD_WIDTH);
        w.put_text(&self.mqtt_password, LONG_FIELD_WIDTH);
        w.put_text(&self.mqtt_prefix, LONG_FIELD_WIDTH);
        w.put_u16(self.publish_interval_secs);
        w.put_u8(self.led_effect as u8);
        w.put_u8(self.led_brightness);
    }

    /// Parse a record, returning `None` for a foreign version tag or
    /// corrupted text
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_LEN || buf[0] != CONFIG_VERSION {
            return None;
        }

        let mut r = Reader { buf, pos: 1 };
        Some(Self {
            admin_username: r.text(SHORT_FIELD_WIDTH)?,
            admin_password: r.text(SHORT_FIELD_WIDTH)?,
            note: r.text(SHORT_FIELD_WIDTH)?,
            telnet: r.u8() != 0,
            wifi_ssid: r.text(SHORT_FIELD_WIDTH)?,
            wifi_psk: r.text(SHORT_FIELD_WIDTH)?,
            hostname: r.text(SHORT_FIELD_WIDTH)?,
            mqtt_server: r.text(SHORT_FIELD_WIDTH)?,
            mqtt_port: r.u16(),
            mqtt_user: r.text(LONG_FIELD_WIDTH)?,
            mqtt_password: r.text(LONG_FIELD_WIDTH)?,
            mqtt_prefix: r.text(LONG_FIELD_WIDTH)?,
            publish_interval_secs: r.u16(),
            led_effect: r.u8() != 0,
            led_brightness: r.u8().min(100),
        })
    }
}

struct Writer<'a> {
    buf: &'a mut [u8; RECORD_LEN],
    pos: usize,
}

impl Writer<'_> {
    fn put_u8(&mut self, value: u8) {
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    fn put_u16(&mut self, value: u16) {
        self.buf[self.pos..self.pos + 2].copy_from_slice(&value.to_le_bytes());
        self.pos += 2;
    }

    fn put_text(&mut self, value: &str, width: usize) {
        let field = &mut self.buf[self.pos..self.pos + width];
        field.fill(0);
        let len = value.len().min(width - 1);
        field[..len].copy_from_slice(&value.as_bytes()[..len]);
        self.pos += width;
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn u8(&mut self) -> u8 {
        let value = self.buf[self.pos];
        self.pos += 1;
        value
    }

    fn u16(&mut self) -> u16 {
        let value = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        value
    }

    fn text<const N: usize>(&mut self, width: usize) -> Option<String<N>> {
        let field = &self.buf[self.pos..self.pos + width];
        self.pos += width;
        let len = field.iter().position(|&b| b == 0)?;
        let value = core::str::from_utf8(&field[..len]).ok()?;
        let mut out = String::new();
        out.push_str(value).ok()?;
        Some(out)
    }
}

/// Flash-backed owner of the single configuration record
pub struct ConfigStore<F> {
    flash: F,
    offset: u32,
    defaults: ConfigurationRecord,
    record: ConfigurationRecord,
    source: ConfigSource,
}

impl<F: NorFlash> ConfigStore<F> {
    /// `offset` must be aligned to the flash erase size; the slot owns the
    /// whole erase sector(s) it starts in
    pub fn new(flash: F, offset: u32, defaults: ConfigurationRecord) -> Self {
        Self {
            flash,
            offset,
            record: defaults.clone(),
            defaults,
            source: ConfigSource::Default,
        }
    }

    /// Read the persisted record, falling back to defaults on any mismatch
    pub fn load(&mut self) -> ConfigSource {
        let mut slot = [0u8; RECORD_SLOT_SIZE];
        let decoded = match self.flash.read(self.offset, &mut slot) {
            Ok(()) => ConfigurationRecord::decode(&slot),
            Err(e) => {
                log::warn!("Config read failed: {:?}", e);
                None
            }
        };

        match decoded {
            Some(record) => {
                log::info!("Loaded config version {} from flash", CONFIG_VERSION);
                self.record = record;
                self.source = ConfigSource::Persisted;
            }
            None => {
                log::info!("No valid config in flash, using defaults");
                self.record = self.defaults.clone();
                self.source = ConfigSource::Default;
            }
        }

        self.source
    }

    /// Write the in-memory record back to flash. Rebooting afterwards is up
    /// to the caller.
    pub fn save(&mut self) -> Result<(), Error> {
        let mut encoded = [0u8; RECORD_LEN];
        self.record.encode(&mut encoded);

        let mut slot = [0u8; RECORD_SLOT_SIZE];
        slot[..RECORD_LEN].copy_from_slice(&encoded);

        self.write_slot(&slot)?;
        log::info!("Config saved");
        Ok(())
    }

    /// Zero the slot so the next boot starts from defaults
    pub fn erase(&mut self) -> Result<(), Error> {
        self.write_slot(&[0u8; RECORD_SLOT_SIZE])?;
        log::warn!("Config erased");
        Ok(())
    }

    pub fn record(&self) -> &ConfigurationRecord {
        &self.record
    }

    /// Replace the in-memory record; nothing is written until [`save`](Self::save)
    pub fn replace(&mut self, record: ConfigurationRecord) {
        self.record = record;
    }

    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Give the flash back
    pub fn into_inner(self) -> F {
        self.flash
    }

    fn write_slot(&mut self, slot: &[u8; RECORD_SLOT_SIZE]) -> Result<(), Error> {
        if self.offset as usize % F::ERASE_SIZE != 0 || RECORD_SLOT_SIZE % F::WRITE_SIZE != 0 {
            return Err(Error::Alignment);
        }

        let span = RECORD_SLOT_SIZE.div_ceil(F::ERASE_SIZE) * F::ERASE_SIZE;
        self.flash
            .erase(self.offset, self.offset + span as u32)
            .map_err(|e| {
                log::error!("Config erase failed at {:#x}: {:?}", self.offset, e);
                Error::Flash
            })?;
        self.flash.write(self.offset, slot).map_err(|e| {
            log::error!("Config write failed at {:#x}: {:?}", self.offset, e);
            Error::Flash
        })
    }
}
