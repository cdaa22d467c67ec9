use core::sync::atomic::{AtomicI32, Ordering};

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{with_timeout, Duration, Timer};

use esp_hal::rng::Rng;
use esp_radio::{
    wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState},
    Controller,
};

use core::str::FromStr;
use heapless::String;
use log::{info, warn};
use roomba_core::config::ShortText;
use static_cell::StaticCell;

const WIFI_CONNECT_TIMEOUT_SECS: u64 = 30;
const WIFI_RECONNECT_DELAY_MS: u64 = 5_000;
const RSSI_POLL_INTERVAL_SECS: u64 = 10;
const RSSI_UNKNOWN: i32 = i32::MIN;

static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();
static RSSI: AtomicI32 = AtomicI32::new(RSSI_UNKNOWN);

/// Signal strength of the current association
pub fn rssi_dbm() -> Option<i8> {
    match RSSI.load(Ordering::Relaxed) {
        RSSI_UNKNOWN => None,
        dbm => Some(dbm.clamp(i8::MIN as i32, 0) as i8),
    }
}

pub struct Credentials {
    pub ssid: ShortText,
    pub psk: ShortText,
}

pub struct Wifi {
    pub stack: Stack<'static>,
}

#[derive(Debug)]
pub enum Error {
    WifiInitFailed,
    HostnameTooLong,
    SpawnFailed,
}

impl Wifi {
    pub fn new(
        init: &'static Controller<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        rng: Rng,
        spawner: Spawner,
        hostname: &str,
        credentials: Credentials,
    ) -> Result<Self, Error> {
        let (controller, interfaces) =
            esp_radio::wifi::new(init, wifi, Default::default()).map_err(|_| Error::WifiInitFailed)?;

        let mut dhcp_config = embassy_net::DhcpConfig::default();
        dhcp_config.hostname = Some(String::<32>::from_str(hostname).map_err(|_| Error::HostnameTooLong)?);

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, config, resources, seed);

        spawner
            .spawn(connection(controller, credentials))
            .map_err(|_| Error::SpawnFailed)?;
        spawner.spawn(net_task(runner)).map_err(|_| Error::SpawnFailed)?;

        Ok(Self { stack })
    }
}

/// Keeps the station associated, retrying forever
#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>, credentials: Credentials) {
    info!(
        "Start connection task, device capabilities: {:?}",
        controller.capabilities()
    );
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            let disconnected = controller.wait_for_event(WifiEvent::StaDisconnected);
            let poll = Timer::after(Duration::from_secs(RSSI_POLL_INTERVAL_SECS));
            match select(disconnected, poll).await {
                Either::First(_) => {
                    warn!("Wifi disconnected");
                    RSSI.store(RSSI_UNKNOWN, Ordering::Relaxed);
                    Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                }
                Either::Second(_) => {
                    if let Ok(dbm) = controller.rssi() {
                        RSSI.store(dbm, Ordering::Relaxed);
                    }
                    continue;
                }
            }
        }

        if credentials.ssid.is_empty() {
            warn!("No WiFi SSID configured");
            Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
            continue;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            info!("Connecting to wifi with SSID: {:?}", credentials.ssid.as_str());
            let client_config = ClientConfig::default()
                .with_ssid(credentials.ssid.as_str().into())
                .with_password(credentials.psk.as_str().into());
            let config = ModeConfig::Client(client_config);
            if let Err(e) = controller.set_config(&config) {
                log::error!("Failed to set WiFi config: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Starting wifi");
            if let Err(e) = controller.start_async().await {
                log::error!("Failed to start WiFi: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Wifi started!");
        }

        info!("About to connect to {:?}...", credentials.ssid.as_str());
        match with_timeout(Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS), controller.connect_async()).await {
            Ok(Ok(_)) => {
                info!("Wifi connected!");
                if let Ok(dbm) = controller.rssi() {
                    RSSI.store(dbm, Ordering::Relaxed);
                }
            }
            Ok(Err(e)) => {
                info!("Failed to connect to wifi: {e:?}");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
            Err(_) => {
                info!("Wifi connection timed out");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
