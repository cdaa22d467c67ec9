//! Application context
//!
//! [`App`] owns every component of the bridge and is driven from a single
//! loop: feed it the button level, inbound bus messages and link changes,
//! call [`App::poll`] and [`App::display_tick`] regularly and forward the
//! returned [`Action`]s.

use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use embedded_storage::nor_flash::NorFlash;
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::button::{Button, ButtonEvent};
use crate::config::{self, ConfigSource, ConfigStore, ConfigurationRecord};
use crate::led::StatusLed;
use crate::protocol::{self, Command, EngineEvent, SerialEngine};
use crate::render::{render_screen, StatusSnapshot};
use crate::screens::{DisplayBackend, Line, Screens};
use crate::sensor::SensorFrame;
use crate::state::{self, DeviceStatus};
use crate::status::{self, BusCommand, LinkStatus, Publication, StatusDispatcher, StatusTrigger, Topic};

/// Screen shown when the broker connection comes up
pub const CONNECTED_SCREEN: u8 = 1;

const MAX_ACTIONS: usize = 4;

/// Work the firmware has to carry out on behalf of the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Publish(Publication),
    /// Configuration was erased, reboot into defaults
    Restart,
}

pub type Actions = Vec<Action, MAX_ACTIONS>;

pub struct App<S, W, F, D> {
    config: ConfigStore<F>,
    engine: SerialEngine<S, W>,
    screens: Screens<D>,
    button: Button,
    dispatcher: StatusDispatcher,
    led: StatusLed,
    link: LinkStatus,
    last_clean_ms: Option<u64>,
    last_scalar: Option<(u8, Option<i32>)>,
    version: &'static str,
}

impl<S, W, F, D> App<S, W, F, D>
where
    S: Read + Write + ReadReady,
    W: OutputPin,
    F: NorFlash,
    D: DisplayBackend,
{
    pub fn new(
        config: ConfigStore<F>,
        engine: SerialEngine<S, W>,
        screens: Screens<D>,
        version: &'static str,
        max_message_size: usize,
    ) -> Self {
        let record = config.record();
        let dispatcher = StatusDispatcher::new(record.publish_interval_secs, max_message_size, version);
        let led = StatusLed::new(record.led_effect, record.led_brightness);
        Self {
            config,
            engine,
            screens,
            button: Button::new(),
            dispatcher,
            led,
            link: LinkStatus::default(),
            last_clean_ms: None,
            last_scalar: None,
            version,
        }
    }

    /// Load the configuration and arm the periodic publication timer
    pub fn boot(&mut self, now_ms: u64) -> ConfigSource {
        let source = self.config.load();
        let record = self.config.record();
        self.dispatcher.set_interval(record.publish_interval_secs, now_ms);
        self.dispatcher.start(now_ms);
        self.led.configure(record.led_effect, record.led_brightness);

        if source == ConfigSource::Default {
            warn!("Running with default configuration");
            let lines = [text_line("Default config"), text_line("Configure via web UI")];
            self.screens.display_msg_force(&lines, now_ms);
        }
        source
    }

    /// Queue a vacuum command. With a trigger the resulting state is
    /// published once the vacuum has settled.
    pub fn command(
        &mut self,
        command: Command,
        trigger: Option<StatusTrigger>,
        now_ms: u64,
    ) -> Result<(), protocol::Error> {
        self.engine.command(command, trigger).map_err(|e| {
            warn!("Dropping {} command: {:?}", command.name(), e);
            e
        })?;
        self.led.flash(now_ms);
        Ok(())
    }

    pub fn request_sensor_frame(&mut self, force: bool) -> Result<(), protocol::Error> {
        self.engine.query_group_frame(force, None)
    }

    pub fn request_scalar(&mut self, packet_id: u8) -> Result<(), protocol::Error> {
        self.engine.query_scalar_packet(packet_id)
    }

    /// Result of the most recent scalar query as `(packet id, value)`
    pub fn last_scalar(&self) -> Option<(u8, Option<i32>)> {
        self.last_scalar
    }

    /// Apply an inbound JSON command
    pub fn handle_bus_message(&mut self, payload: &[u8], now_ms: u64) {
        let command = match BusCommand::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring bus message: {:?}", e);
                return;
            }
        };
        debug!("Bus command {:?}", command);

        let trigger = Some(StatusTrigger::BusCommand);
        match command.clean {
            Some(true) => {
                let _ = self.command(Command::Clean, trigger, now_ms);
            }
            Some(false) => {
                let _ = self.command(Command::Stop, trigger, now_ms);
            }
            None => {}
        }
        if command.dock == Some(true) {
            let _ = self.command(Command::Dock, trigger, now_ms);
        }
        if command.status.0 {
            if let Err(e) = self.engine.query_group_frame(true, trigger) {
                warn!("Status request dropped: {:?}", e);
            }
        }
    }

    /// Feed the raw button level. A long press erases the configuration
    /// and asks for a restart.
    pub fn handle_button(&mut self, pressed: bool, now_ms: u64) -> Option<Action> {
        match self.button.poll(pressed, now_ms)? {
            ButtonEvent::ShortPress => {
                let screen = self.screens.next_screen(now_ms);
                debug!("Button pressed, screen {}", screen);
                None
            }
            ButtonEvent::LongPress => {
                warn!("Button held, erasing configuration");
                if let Err(e) = self.config.erase() {
                    error!("Config erase failed: {:?}", e);
                }
                Some(Action::Restart)
            }
        }
    }

    /// Advance the serial engine and the publication schedule
    pub fn poll(&mut self, now_ms: u64) -> Actions {
        let mut actions = Actions::new();

        for event in self.engine.poll(now_ms) {
            match event {
                EngineEvent::CommandSent(Command::Clean) => self.last_clean_ms = Some(now_ms),
                EngineEvent::CommandSent(_) => {}
                EngineEvent::FrameUpdated { valid } => debug!("Sensor frame updated, valid: {}", valid),
                EngineEvent::ScalarRead { packet_id, value } => {
                    self.last_scalar = Some((packet_id, value));
                }
                EngineEvent::PublishRequested(trigger) => {
                    if let Some(publication) = self.publish(trigger, now_ms) {
                        let _ = actions.push(Action::Publish(publication));
                    }
                }
                EngineEvent::Failed(job) => {
                    warn!("Serial job failed: {:?}", job);
                    // Report what is known so the schedule keeps running
                    if let Some(trigger) = job.publish_trigger() {
                        if let Some(publication) = self.publish(trigger, now_ms) {
                            let _ = actions.push(Action::Publish(publication));
                        }
                    }
                }
            }
        }

        if self.link.bus_connected && self.dispatcher.take_periodic(now_ms) {
            // Refresh first unless the cached frame is still fresh
            if let Err(e) = self.engine.query_group_frame(false, Some(StatusTrigger::Periodic)) {
                warn!("Periodic refresh skipped: {:?}", e);
                if let Some(publication) = self.publish(StatusTrigger::Periodic, now_ms) {
                    let _ = actions.push(Action::Publish(publication));
                }
            }
        }

        actions
    }

    fn publish(&mut self, trigger: StatusTrigger, now_ms: u64) -> Option<Publication> {
        let record = self.config.record();
        let status = DeviceStatus::from_frame(self.engine.frame(), now_ms);
        let result = status::status_topic(&record.mqtt_prefix, &record.hostname).and_then(|topic| {
            self.dispatcher
                .publish(trigger, &topic, &status, &record.note, self.link.rssi_dbm, now_ms)
        });
        match result {
            Ok(publication) => {
                info!("Publish status ({})", trigger.label());
                Some(publication)
            }
            Err(e) => {
                warn!("Status publish failed: {:?}", e);
                None
            }
        }
    }

    /// Power-save timeout and periodic screen redraw
    pub fn display_tick(&mut self, now_ms: u64) {
        self.screens.tick(now_ms);
        if !self.screens.need_refresh(now_ms) {
            return;
        }
        let record = self.config.record();
        let snapshot = StatusSnapshot {
            link: &self.link,
            frame: self.engine.frame(),
            hostname: &record.hostname,
            mqtt_server: &record.mqtt_server,
            version: self.version,
            config_source: self.config.source(),
            uptime_ms: now_ms,
            last_clean_ms: self.last_clean_ms,
        };
        let lines = render_screen(self.screens.index(), &snapshot);
        self.screens.display(&lines);
    }

    /// Status LED duty cycle in percent
    pub fn led_level(&mut self, now_ms: u64) -> u8 {
        self.led.poll(now_ms, self.link.wifi_connected)
    }

    /// Current estimate; also schedules a refresh if the frame went stale
    pub fn is_cleaning(&mut self) -> bool {
        if let Err(e) = self.engine.query_group_frame(false, None) {
            debug!("Refresh not queued: {:?}", e);
        }
        state::is_cleaning(self.engine.frame())
    }

    pub fn is_charging(&self) -> bool {
        state::is_charging(self.engine.frame())
    }

    pub fn charge_state_label(&self) -> &'static str {
        state::charge_state_label(self.engine.frame())
    }

    pub fn frame(&self) -> &SensorFrame {
        self.engine.frame()
    }

    pub fn config(&self) -> &ConfigurationRecord {
        self.config.record()
    }

    pub fn config_source(&self) -> ConfigSource {
        self.config.source()
    }

    /// Store a new configuration; the caller reboots afterwards
    pub fn replace_config(&mut self, record: ConfigurationRecord) -> Result<(), config::Error> {
        self.config.replace(record);
        self.config.save()
    }

    pub fn link(&self) -> &LinkStatus {
        &self.link
    }

    pub fn set_link_status(&mut self, link: LinkStatus, now_ms: u64) {
        let connected = !self.link.bus_connected && link.bus_connected;
        self.link = link;
        if connected {
            self.on_bus_connected(now_ms);
        }
    }

    pub fn on_bus_connected(&mut self, now_ms: u64) {
        info!("Bus connected");
        self.screens.show_screen(CONNECTED_SCREEN, now_ms);
    }

    pub fn status_topic(&self) -> Result<Topic, status::Error> {
        let record = self.config.record();
        status::status_topic(&record.mqtt_prefix, &record.hostname)
    }

    pub fn command_topics(&self) -> Result<[Topic; 2], status::Error> {
        let record = self.config.record();
        status::command_topics(&record.mqtt_prefix, &record.hostname)
    }

    pub fn last_clean_ms(&self) -> Option<u64> {
        self.last_clean_ms
    }

    pub fn is_serial_idle(&self) -> bool {
        self.engine.is_idle()
    }

    pub fn screens(&self) -> &Screens<D> {
        &self.screens
    }

    pub fn engine_mut(&mut self) -> &mut SerialEngine<S, W> {
        &mut self.engine
    }
}

fn text_line(text: &str) -> Line {
    config::text(text)
}
