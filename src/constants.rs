/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM (internal memory)
pub const HEAP_DRAM_SIZE: usize = 72 * 1024;

/// Flash offset of the persisted configuration record
pub const CONFIG_FLASH_OFFSET: u32 = 0x9000;

/// Size of the TCP socket receive buffer
pub const RX_BUFFER_SIZE: usize = 2048;
/// Size of the TCP socket transmit buffer
pub const TX_BUFFER_SIZE: usize = 2048;

/// Size of the MQTT client receive buffer for application data
pub const MQTT_RX_BUFFER_SIZE: usize = 1024;
/// Size of the MQTT client transmit buffer for application data
pub const MQTT_TX_BUFFER_SIZE: usize = 1024;
/// Largest status message handed to the broker
pub const MQTT_MAX_MESSAGE_SIZE: usize = 256;
/// Broker keep-alive in seconds
pub const MQTT_KEEP_ALIVE_SECS: u16 = 30;
/// Minimum delay between two broker connection attempts
pub const MQTT_RECONNECT_INTERVAL_MS: u64 = 2_000;

/// Baud rate of the Roomba Open Interface port
pub const ROOMBA_BAUD_RATE: u32 = 115_200;

/// Period of the control loop
pub const LOOP_TICK_MS: u64 = 10;

/// I2C address of the SSD1306 panel
pub const DISPLAY_I2C_ADDRESS: u8 = 0x3C;

/// Status LED PWM frequency
pub const LED_PWM_FREQUENCY_KHZ: u32 = 24;
