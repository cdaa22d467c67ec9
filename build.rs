use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

#[derive(Deserialize)]
struct RawDefaults {
    wifi_ssid: String,
    wifi_psk: String,
    hostname: String,
    admin_username: String,
    admin_password: String,
    mqtt_server: String,
    mqtt_port: u16,
    mqtt_username: String,
    mqtt_password: String,
    mqtt_prefix: String,
    publish_interval_seconds: u16,
    led_effect: bool,
    led_brightness: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed=cfg.toml");
    println!("cargo:rerun-if-changed=cfg.toml.example");

    // Local overrides win, the checked-in example keeps fresh clones building
    let source = if Path::new("cfg.toml").exists() {
        "cfg.toml"
    } else {
        println!("cargo:warning=cfg.toml not found, using cfg.toml.example");
        "cfg.toml.example"
    };

    let toml_str = fs::read_to_string(source)?;
    let raw: RawDefaults = toml::from_str(&toml_str)?;

    if raw.led_brightness > 100 {
        return Err("led_brightness must be a percentage (0-100)".into());
    }

    let code = format!(
        r#"
        pub const DEFAULTS: Defaults = Defaults {{
            wifi_ssid: {ssid:?},
            wifi_psk: {psk:?},
            hostname: {host:?},
            admin_username: {au:?},
            admin_password: {apw:?},
            mqtt_server: {ms:?},
            mqtt_port: {mp},
            mqtt_username: {mu:?},
            mqtt_password: {mpw:?},
            mqtt_prefix: {mt:?},
            publish_interval_seconds: {intv},
            led_effect: {fx},
            led_brightness: {lb},
        }};
    "#,
        ssid = raw.wifi_ssid,
        psk = raw.wifi_psk,
        host = raw.hostname,
        au = raw.admin_username,
        apw = raw.admin_password,
        ms = raw.mqtt_server,
        mp = raw.mqtt_port,
        mu = raw.mqtt_username,
        mpw = raw.mqtt_password,
        mt = raw.mqtt_prefix,
        intv = raw.publish_interval_seconds,
        fx = raw.led_effect,
        lb = raw.led_brightness,
    );

    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("config.rs");
    fs::write(dest_path, code)?;
    Ok(())
}
