#![no_std]
#![no_main]

use static_cell::StaticCell;

use embassy_executor::Spawner;
use embassy_net::Stack;
use embassy_time::{Duration, Instant, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{self as hal};
use esp_println::logger::init_logger;
use esp_storage::FlashStorage;

use hal::{
    clock::CpuClock,
    gpio::{DriveMode, Input, InputConfig, Level, Output, OutputConfig, Pull},
    i2c::master::I2c,
    rng::Rng,
    time::Rate,
    timer::timg::TimerGroup,
    uart::Uart,
    Blocking,
};

use roomba_core::app::{Action, App};
use roomba_core::button::DEBOUNCE_MS;
use roomba_core::config::ConfigStore;
use roomba_core::protocol::SerialEngine;
use roomba_core::screens::Screens;
use roomba_core::status::LinkStatus;

extern crate alloc;

pub mod config;
pub mod constants;
mod display;
mod led;
mod mqtt;
pub mod transport;
mod wifi;

use config::DEFAULTS;
use constants::*;
use display::Oled;
use mqtt::{BrokerSettings, INBOUND, OUTBOUND};
use wifi::{Credentials, Wifi};

type Bridge = App<Uart<'static, Blocking>, Output<'static>, FlashStorage<'static>, Oled>;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    init_logger(log::LevelFilter::Info);
    log::info!("Roomba bridge {}", VERSION);

    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));

    esp_alloc::heap_allocator!(size: HEAP_DRAM_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let uart_config = hal::uart::Config::default()
        .with_baudrate(ROOMBA_BAUD_RATE)
        .with_stop_bits(hal::uart::StopBits::_1)
        .with_data_bits(hal::uart::DataBits::_8)
        .with_parity(hal::uart::Parity::None);

    let uart = Uart::new(peripherals.UART2, uart_config)
        .expect("Failed to initialize Roomba UART")
        .with_tx(peripherals.GPIO17)
        .with_rx(peripherals.GPIO16);

    // BRC is pulled up on the Roomba side, only ever pulled low from here
    let wake_line = Output::new(
        peripherals.GPIO4,
        Level::High,
        OutputConfig::default().with_drive_mode(DriveMode::OpenDrain),
    );

    let button = Input::new(peripherals.GPIO0, InputConfig::default().with_pull(Pull::Up));

    let i2c_config = hal::i2c::master::Config::default().with_frequency(Rate::from_khz(400));
    let i2c = I2c::new(peripherals.I2C0, i2c_config)
        .expect("Failed to initialize I2C")
        .with_sda(peripherals.GPIO21)
        .with_scl(peripherals.GPIO22);
    let oled = Oled::new(i2c).expect("Failed to initialize display");

    let store = ConfigStore::new(
        FlashStorage::new(peripherals.FLASH),
        CONFIG_FLASH_OFFSET,
        DEFAULTS.to_record(),
    );

    let mut app: Bridge = App::new(
        store,
        SerialEngine::new(uart, wake_line),
        Screens::new(oled),
        VERSION,
        MQTT_MAX_MESSAGE_SIZE,
    );
    let source = app.boot(now_ms());
    log::info!("Configuration source: {}", source.label());

    let record = app.config().clone();

    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi controller"));
    let credentials = Credentials {
        ssid: record.wifi_ssid.clone(),
        psk: record.wifi_psk.clone(),
    };
    let wifi = Wifi::new(
        radio,
        peripherals.WIFI,
        Rng::new(),
        spawner,
        &record.hostname,
        credentials,
    )
    .expect("Failed to start Wi-Fi");

    spawner.spawn(led::led_task(peripherals.LEDC, peripherals.GPIO2)).ok();

    match (app.status_topic(), app.command_topics()) {
        (Ok(status_topic), Ok(command_topics)) => {
            let settings = BrokerSettings {
                server: record.mqtt_server.clone(),
                port: record.mqtt_port,
                username: record.mqtt_user.clone(),
                password: record.mqtt_password.clone(),
                client_id: record.hostname.clone(),
                status_topic,
                command_topics,
            };
            spawner.spawn(mqtt::mqtt_task(wifi.stack, settings)).ok();
        }
        (Err(e), _) | (_, Err(e)) => log::error!("MQTT disabled, invalid topic: {:?}", e),
    }

    control_loop(app, button, wifi.stack).await
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

fn link_status(stack: Stack<'static>) -> LinkStatus {
    LinkStatus {
        wifi_connected: stack.is_link_up(),
        ip: stack.config_v4().map(|config| config.address.address().octets()),
        rssi_dbm: wifi::rssi_dbm(),
        bus_connected: mqtt::is_connected(),
        clock: None,
    }
}

/// Drives the application context; never returns
async fn control_loop(mut app: Bridge, button: Input<'static>, stack: Stack<'static>) -> ! {
    let mut led_level = None;

    loop {
        let now = now_ms();

        if let Some(Action::Restart) = app.handle_button(button.is_low(), now) {
            restart().await;
        }

        while let Ok(message) = INBOUND.try_receive() {
            app.handle_bus_message(&message, now);
        }

        app.set_link_status(link_status(stack), now);

        for action in app.poll(now) {
            match action {
                Action::Publish(publication) => {
                    if OUTBOUND.try_send(publication).is_err() {
                        log::warn!("Publish queue full, dropping status");
                    }
                }
                Action::Restart => restart().await,
            }
        }

        app.display_tick(now);

        let level = app.led_level(now);
        if led_level != Some(level) {
            led_level = Some(level);
            led::LED_LEVEL.signal(level);
        }

        // Slow down while the button is held so contact bounce settles
        let tick = if button.is_low() { DEBOUNCE_MS } else { LOOP_TICK_MS };
        Timer::after(Duration::from_millis(tick)).await;
    }
}

async fn restart() -> ! {
    log::warn!("Restarting");
    // Let the log line drain
    Timer::after(Duration::from_millis(100)).await;
    hal::system::software_reset()
}
