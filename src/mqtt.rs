use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select3, Either3};
use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::{Read, Write};
use heapless::Vec;
use rust_mqtt::{
    client::{
        client::MqttClient,
        client_config::{ClientConfig, MqttVersion},
    },
    packet::v5::publish_packet::QualityOfService,
    utils::rng_generator::CountingRng,
};

use roomba_core::config::{LongText, ShortText};
use roomba_core::status::{Publication, Topic, LAST_WILL_PAYLOAD};

use crate::constants::{
    MQTT_KEEP_ALIVE_SECS, MQTT_MAX_MESSAGE_SIZE, MQTT_RECONNECT_INTERVAL_MS, MQTT_RX_BUFFER_SIZE,
    MQTT_TX_BUFFER_SIZE, RX_BUFFER_SIZE, TX_BUFFER_SIZE,
};
use crate::transport;

/// Subscriptions plus headroom for broker properties
const MQTT_MAX_PROPERTIES: usize = 5;
const QUEUE_DEPTH: usize = 4;

pub type InboundMessage = Vec<u8, MQTT_MAX_MESSAGE_SIZE>;

/// Command payloads received from the broker
pub static INBOUND: Channel<CriticalSectionRawMutex, InboundMessage, QUEUE_DEPTH> = Channel::new();
/// Status messages waiting to be published
pub static OUTBOUND: Channel<CriticalSectionRawMutex, Publication, QUEUE_DEPTH> = Channel::new();

static CONNECTED: AtomicBool = AtomicBool::new(false);

pub fn is_connected() -> bool {
    CONNECTED.load(Ordering::Relaxed)
}

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    Transport(transport::Error),
    ConnectionFailed,
    SubscribeFailed,
    PublishMessageFailed,
    ReceiveFailed,
    PingFailed,
}

/// Everything needed to (re)connect, copied out of the configuration record
pub struct BrokerSettings {
    pub server: ShortText,
    pub port: u16,
    pub username: LongText,
    pub password: LongText,
    pub client_id: ShortText,
    pub status_topic: Topic,
    pub command_topics: [Topic; 2],
}

#[embassy_executor::task]
pub async fn mqtt_task(stack: Stack<'static>, settings: BrokerSettings) {
    if settings.server.is_empty() {
        log::warn!("No MQTT server configured, status publishing disabled");
        return;
    }

    let mut rx_buffer = [0u8; RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TX_BUFFER_SIZE];
    let mut mqtt_rx = [0u8; MQTT_RX_BUFFER_SIZE];
    let mut mqtt_tx = [0u8; MQTT_TX_BUFFER_SIZE];

    loop {
        stack.wait_config_up().await;
        let attempt = Instant::now();

        if let Err(e) = session(stack, &settings, &mut rx_buffer, &mut tx_buffer, &mut mqtt_rx, &mut mqtt_tx).await {
            log::warn!("MQTT session ended: {:?}", e);
        }
        CONNECTED.store(false, Ordering::Relaxed);

        // At most one attempt per reconnect interval
        let retry_at = attempt + Duration::from_millis(MQTT_RECONNECT_INTERVAL_MS);
        Timer::at(retry_at).await;
    }
}

async fn session(
    stack: Stack<'static>,
    settings: &BrokerSettings,
    rx_buffer: &mut [u8],
    tx_buffer: &mut [u8],
    mqtt_rx: &mut [u8],
    mqtt_tx: &mut [u8],
) -> Result<(), Error> {
    let socket = transport::connect(stack, rx_buffer, tx_buffer, &settings.server, settings.port)
        .await
        .map_err(Error::Transport)?;

    let mut config = ClientConfig::<MQTT_MAX_PROPERTIES, _>::new(
        MqttVersion::MQTTv5,
        CountingRng(Instant::now().as_ticks()),
    );
    config.add_max_subscribe_qos(QualityOfService::QoS0);
    config.add_client_id(&settings.client_id);
    if !settings.username.is_empty() {
        config.add_username(&settings.username);
        config.add_password(&settings.password);
    }
    config.add_will(&settings.status_topic, LAST_WILL_PAYLOAD.as_bytes(), true);
    config.keep_alive = MQTT_KEEP_ALIVE_SECS;
    config.max_packet_size = MQTT_RX_BUFFER_SIZE as u32;

    let mut client = MqttClient::<_, MQTT_MAX_PROPERTIES, _>::new(
        socket,
        mqtt_tx,
        MQTT_TX_BUFFER_SIZE,
        mqtt_rx,
        MQTT_RX_BUFFER_SIZE,
        config,
    );

    client.connect_to_broker().await.map_err(|e| {
        log::error!("MQTT connect_to_broker failed: {:?}", e);
        Error::ConnectionFailed
    })?;
    log::info!("MQTT connected to {}:{}", settings.server.as_str(), settings.port);

    for topic in settings.command_topics.iter() {
        client.subscribe_to_topic(topic).await.map_err(|e| {
            log::error!("Subscribe to {} failed: {:?}", topic.as_str(), e);
            Error::SubscribeFailed
        })?;
        log::info!("Subscribed to {}", topic.as_str());
    }
    CONNECTED.store(true, Ordering::Relaxed);

    run(&mut client).await
}

enum Event {
    Message(InboundMessage),
    Publish(Publication),
    Ping,
}

async fn run<T, const MAX_PROPERTIES: usize, R>(
    client: &mut MqttClient<'_, T, MAX_PROPERTIES, R>,
) -> Result<(), Error>
where
    T: Read + Write,
    R: rand_core::RngCore,
{
    let ping_every = Duration::from_secs(MQTT_KEEP_ALIVE_SECS as u64 / 2);
    let mut next_ping = Instant::now() + ping_every;

    // A receive cut short by a publish, or a command landing while a ping
    // waits for its PINGRESP, ends the session; mqtt_task reconnects within
    // MQTT_RECONNECT_INTERVAL_MS and the broker keeps the retained status.
    loop {
        let event = match select3(client.receive_message(), OUTBOUND.receive(), Timer::at(next_ping)).await {
            Either3::First(Ok((topic, payload))) => {
                log::debug!("Message on {} ({} bytes)", topic, payload.len());
                match InboundMessage::from_slice(payload) {
                    Ok(message) => Event::Message(message),
                    Err(_) => {
                        log::warn!("Dropping oversized message on {}", topic);
                        continue;
                    }
                }
            }
            Either3::First(Err(e)) => {
                log::error!("MQTT receive failed: {:?}", e);
                return Err(Error::ReceiveFailed);
            }
            Either3::Second(publication) => Event::Publish(publication),
            Either3::Third(_) => Event::Ping,
        };

        match event {
            Event::Message(message) => {
                if INBOUND.try_send(message).is_err() {
                    log::warn!("Command queue full, dropping message");
                }
            }
            Event::Publish(publication) => publish(client, &publication).await?,
            Event::Ping => {
                client.send_ping().await.map_err(|e| {
                    log::error!("MQTT ping failed: {:?}", e);
                    Error::PingFailed
                })?;
                next_ping = Instant::now() + ping_every;
            }
        }
    }
}

async fn publish<T, const MAX_PROPERTIES: usize, R>(
    client: &mut MqttClient<'_, T, MAX_PROPERTIES, R>,
    publication: &Publication,
) -> Result<(), Error>
where
    T: Read + Write,
    R: rand_core::RngCore,
{
    client
        .send_message(
            &publication.topic,
            &publication.payload,
            QualityOfService::QoS0,
            publication.retain,
        )
        .await
        .map_err(|e| {
            log::error!("Failed to publish message: {:?}", e);
            Error::PublishMessageFailed
        })?;
    log::debug!("Published {} bytes to {}", publication.payload.len(), publication.topic.as_str());
    Ok(())
}
