use roomba_core::config::{text, ConfigurationRecord};

/// Compiled-in configuration, used until a record has been saved to flash
pub struct Defaults {
    // Wi-Fi SSID to connect to
    pub wifi_ssid: &'static str,

    // Wi-Fi pre-shared key (password)
    pub wifi_psk: &'static str,

    // Device name (DHCP hostname, MQTT client id and topic segment)
    pub hostname: &'static str,

    // Credentials of the web configuration UI
    pub admin_username: &'static str,
    pub admin_password: &'static str,

    // MQTT broker hostname or IP address
    pub mqtt_server: &'static str,

    // MQTT port (usually 1883)
    pub mqtt_port: u16,

    // MQTT credentials, empty to connect anonymously
    pub mqtt_username: &'static str,
    pub mqtt_password: &'static str,

    // Prefix of every MQTT topic
    pub mqtt_prefix: &'static str,

    // Periodic status interval in seconds, 0 disables it
    pub publish_interval_seconds: u16,

    // Dim the status LED to `led_brightness` percent when set
    pub led_effect: bool,
    pub led_brightness: u8,
}

impl Defaults {
    pub fn to_record(&self) -> ConfigurationRecord {
        ConfigurationRecord {
            admin_username: text(self.admin_username),
            admin_password: text(self.admin_password),
            wifi_ssid: text(self.wifi_ssid),
            wifi_psk: text(self.wifi_psk),
            hostname: text(self.hostname),
            mqtt_server: text(self.mqtt_server),
            mqtt_port: self.mqtt_port,
            mqtt_user: text(self.mqtt_username),
            mqtt_password: text(self.mqtt_password),
            mqtt_prefix: text(self.mqtt_prefix),
            publish_interval_secs: self.publish_interval_seconds,
            led_effect: self.led_effect,
            led_brightness: self.led_brightness,
            ..ConfigurationRecord::default()
        }
    }
}

// default values are generated at compile time
include!(concat!(env!("OUT_DIR"), "/config.rs"));
