//! Open Interface serial engine
//!
//! Every command or query is queued as a [`Job`], expanded into a short plan
//! of [`Step`]s (drive the wake line, write a byte, wait, read) and executed
//! by [`SerialEngine::poll`]. Waits are deadlines checked against the caller's
//! clock, so the engine never sleeps and the rest of the firmware keeps
//! running while the vacuum settles.
//!
//! Byte sequences and delays:
//!
//! ```text
//! wake           BRC low, 50 ms, BRC released, 400 ms
//! control mode   128, 500 ms
//! command        wake, control mode, opcode
//! group query    drain RX, wake, control mode, 142, 50 ms, 3, 50 ms, read
//! scalar query   drain RX, wake, control mode, 142, 50 ms, id, 50 ms, read
//! ```
//!
//! A command carrying a [`StatusTrigger`] additionally waits 1000 ms, runs a
//! forced group query and asks for a status publication.

use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use heapless::{Deque, Vec};
use log::{debug, info, warn};

use crate::sensor::{decode_scalar, SensorFrame, MIN_REFRESH_INTERVAL_MS, SENSOR_GROUP_ID};
use crate::status::StatusTrigger;

pub mod opcode {
    pub const RESET: u8 = 7;
    pub const START: u8 = 128;
    pub const POWER: u8 = 133;
    pub const SPOT: u8 = 134;
    pub const CLEAN: u8 = 135;
    pub const MAX: u8 = 136;
    pub const SENSORS: u8 = 142;
    pub const DOCK: u8 = 143;
    pub const STOP: u8 = 173;
}

pub const WAKE_PULSE_MS: u64 = 50;
pub const WAKE_SETTLE_MS: u64 = 400;
pub const CONTROL_MODE_SETTLE_MS: u64 = 500;
pub const SENSOR_REQUEST_GAP_MS: u64 = 50;
pub const SENSOR_REPLY_WAIT_MS: u64 = 50;
/// Delay between a triggered command and the sensor read that reports it
pub const STATUS_SETTLE_MS: u64 = 1_000;

pub const JOB_QUEUE_DEPTH: usize = 4;
const MAX_STEPS: usize = 24;
const MAX_EVENTS: usize = 4;
const READ_BUFFER_LEN: usize = 16;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Job queue is full
    Busy,
    Serial,
    WakeLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Wake,
    /// Enter externally controlled mode
    Start,
    Stop,
    Clean,
    Max,
    Spot,
    Dock,
    PowerOff,
    Reset,
}

impl Command {
    /// Action opcode sent after the wake and control mode preamble
    pub fn opcode(self) -> Option<u8> {
        match self {
            Command::Wake | Command::Start => None,
            Command::Stop => Some(opcode::STOP),
            Command::Clean => Some(opcode::CLEAN),
            Command::Max => Some(opcode::MAX),
            Command::Spot => Some(opcode::SPOT),
            Command::Dock => Some(opcode::DOCK),
            Command::PowerOff => Some(opcode::POWER),
            Command::Reset => Some(opcode::RESET),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Wake => "WAKE",
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Clean => "CLEAN",
            Command::Max => "MAX",
            Command::Spot => "SPOT",
            Command::Dock => "DOCK",
            Command::PowerOff => "POWER",
            Command::Reset => "RESET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Command {
        command: Command,
        trigger: Option<StatusTrigger>,
    },
    GroupQuery {
        force: bool,
        publish: Option<StatusTrigger>,
    },
    ScalarQuery {
        packet_id: u8,
    },
}

impl Job {
    /// Trigger of the status publication this job ends with
    pub fn publish_trigger(&self) -> Option<StatusTrigger> {
        match *self {
            Job::Command { trigger, .. } => trigger,
            Job::GroupQuery { publish, .. } => publish,
            Job::ScalarQuery { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Waking,
    ControlMode,
    Sending,
    Settling,
    AwaitingReply,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// The command's last byte went out
    CommandSent(Command),
    /// A group query finished; `valid` reflects the cached frame
    FrameUpdated { valid: bool },
    ScalarRead { packet_id: u8, value: Option<i32> },
    PublishRequested(StatusTrigger),
    Failed(Job),
}

pub type Events = Vec<EngineEvent, MAX_EVENTS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    WakeLow,
    WakeRelease,
    Write(u8, EngineState),
    Wait(EngineState, u64),
    DrainRx,
    /// Skip the rest of the group query if the cached frame is fresh
    CheckCache,
    ReadFrame,
    ReadScalar(u8),
    Finish(Command),
    Publish(StatusTrigger),
}

pub struct SerialEngine<S, W> {
    serial: S,
    wake_line: W,
    state: EngineState,
    queue: Deque<Job, JOB_QUEUE_DEPTH>,
    current: Option<Job>,
    steps: Deque<Step, MAX_STEPS>,
    wait_until: Option<u64>,
    frame: SensorFrame,
}

impl<S, W> SerialEngine<S, W>
where
    S: Read + Write + ReadReady,
    W: OutputPin,
{
    pub fn new(serial: S, wake_line: W) -> Self {
        Self {
            serial,
            wake_line,
            state: EngineState::Idle,
            queue: Deque::new(),
            current: None,
            steps: Deque::new(),
            wait_until: None,
            frame: SensorFrame::default(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Nothing running and nothing queued
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn frame(&self) -> &SensorFrame {
        &self.frame
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn wake_line(&self) -> &W {
        &self.wake_line
    }

    pub fn submit(&mut self, job: Job) -> Result<(), Error> {
        self.queue.push_back(job).map_err(|_| Error::Busy)
    }

    /// Queue a command; with a trigger the vacuum's state is read back and
    /// published once the command has settled
    pub fn command(&mut self, command: Command, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.submit(Job::Command { command, trigger })
    }

    pub fn wake(&mut self) -> Result<(), Error> {
        self.command(Command::Wake, None)
    }

    pub fn enter_control_mode(&mut self) -> Result<(), Error> {
        self.command(Command::Start, None)
    }

    pub fn stop(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::Stop, trigger)
    }

    pub fn clean(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::Clean, trigger)
    }

    pub fn max(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::Max, trigger)
    }

    pub fn spot(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::Spot, trigger)
    }

    pub fn dock(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::Dock, trigger)
    }

    pub fn power_off(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::PowerOff, trigger)
    }

    pub fn reset(&mut self, trigger: Option<StatusTrigger>) -> Result<(), Error> {
        self.command(Command::Reset, trigger)
    }

    /// Read sensor group 3 unless `force` is false and the cached frame is
    /// still fresh
    pub fn query_group_frame(
        &mut self,
        force: bool,
        publish: Option<StatusTrigger>,
    ) -> Result<(), Error> {
        self.submit(Job::GroupQuery { force, publish })
    }

    pub fn query_scalar_packet(&mut self, packet_id: u8) -> Result<(), Error> {
        self.submit(Job::ScalarQuery { packet_id })
    }

    /// Run every step whose deadline has passed
    pub fn poll(&mut self, now_ms: u64) -> Events {
        let mut events = Events::new();

        while !events.is_full() {
            if let Some(deadline) = self.wait_until {
                if now_ms < deadline {
                    break;
                }
                self.wait_until = None;
            }

            let Some(step) = self.steps.pop_front() else {
                if let Some(job) = self.current.take() {
                    debug!("Serial job {:?} complete", job);
                    self.state = EngineState::Complete;
                } else if matches!(self.state, EngineState::Complete | EngineState::Failed) {
                    self.state = EngineState::Idle;
                }
                match self.queue.pop_front() {
                    Some(job) => {
                        self.begin(job);
                        continue;
                    }
                    None => break,
                }
            };

            if let Err(e) = self.run(step, now_ms, &mut events) {
                if let Some(job) = self.current.take() {
                    warn!("Serial job {:?} failed: {:?}", job, e);
                    let _ = events.push(EngineEvent::Failed(job));
                }
                self.steps.clear();
                self.wait_until = None;
                self.state = EngineState::Failed;
                break;
            }
        }

        events
    }

    fn begin(&mut self, job: Job) {
        self.steps.clear();
        match job {
            Job::Command { command, trigger } => {
                info!("Send command {} to Roomba", command.name());
                self.plan_command(command);
                if let Some(trigger) = trigger {
                    self.push_step(Step::Wait(EngineState::Settling, STATUS_SETTLE_MS));
                    self.plan_group_query(true);
                    self.push_step(Step::Publish(trigger));
                }
            }
            Job::GroupQuery { force, publish } => {
                info!("Send command SENSORS {} to Roomba", SENSOR_GROUP_ID);
                self.plan_group_query(force);
                if let Some(trigger) = publish {
                    self.push_step(Step::Publish(trigger));
                }
            }
            Job::ScalarQuery { packet_id } => {
                info!("Send command SENSORS {} to Roomba", packet_id);
                self.push_step(Step::DrainRx);
                self.plan_wake();
                self.plan_control_mode();
                self.plan_sensor_request(packet_id);
                self.push_step(Step::ReadScalar(packet_id));
            }
        }
        self.current = Some(job);
    }

    fn plan_command(&mut self, command: Command) {
        match command {
            Command::Wake => self.plan_wake(),
            Command::Start => self.plan_control_mode(),
            _ => {
                self.plan_wake();
                self.plan_control_mode();
                if let Some(op) = command.opcode() {
                    self.push_step(Step::Write(op, EngineState::Sending));
                }
            }
        }
        self.push_step(Step::Finish(command));
    }

    fn plan_wake(&mut self) {
        self.push_step(Step::WakeLow);
        self.push_step(Step::Wait(EngineState::Waking, WAKE_PULSE_MS));
        self.push_step(Step::WakeRelease);
        self.push_step(Step::Wait(EngineState::Waking, WAKE_SETTLE_MS));
    }

    fn plan_control_mode(&mut self) {
        self.push_step(Step::Write(opcode::START, EngineState::ControlMode));
        self.push_step(Step::Wait(EngineState::ControlMode, CONTROL_MODE_SETTLE_MS));
    }

    fn plan_sensor_request(&mut self, packet_id: u8) {
        self.push_step(Step::Write(opcode::SENSORS, EngineState::Sending));
        self.push_step(Step::Wait(EngineState::Sending, SENSOR_REQUEST_GAP_MS));
        self.push_step(Step::Write(packet_id, EngineState::Sending));
        self.push_step(Step::Wait(EngineState::AwaitingReply, SENSOR_REPLY_WAIT_MS));
    }

    fn plan_group_query(&mut self, force: bool) {
        if !force {
            self.push_step(Step::CheckCache);
        }
        self.push_step(Step::DrainRx);
        self.plan_wake();
        self.plan_control_mode();
        self.plan_sensor_request(SENSOR_GROUP_ID);
        self.push_step(Step::ReadFrame);
    }

    fn push_step(&mut self, step: Step) {
        if self.steps.push_back(step).is_err() {
            warn!("Serial plan overflow, dropping {:?}", step);
        }
    }

    fn run(&mut self, step: Step, now_ms: u64, events: &mut Events) -> Result<(), Error> {
        match step {
            Step::WakeLow => {
                self.state = EngineState::Waking;
                self.wake_line.set_low().map_err(|_| Error::WakeLine)?;
            }
            Step::WakeRelease => {
                self.wake_line.set_high().map_err(|_| Error::WakeLine)?;
            }
            Step::Write(byte, state) => {
                self.state = state;
                self.serial.write_all(&[byte]).map_err(|_| Error::Serial)?;
            }
            Step::Wait(state, ms) => {
                self.state = state;
                self.wait_until = Some(now_ms + ms);
            }
            Step::DrainRx => {
                let mut scratch = [0u8; READ_BUFFER_LEN];
                let stale = self.read_available(&mut scratch)?;
                if stale > 0 {
                    debug!("Dropped {} stale bytes", stale);
                }
            }
            Step::CheckCache => {
                if self.frame.is_fresh(now_ms, MIN_REFRESH_INTERVAL_MS) {
                    debug!("Sensor frame is fresh, skipping query");
                    while let Some(skipped) = self.steps.pop_front() {
                        if skipped == Step::ReadFrame {
                            break;
                        }
                    }
                    let _ = events.push(EngineEvent::FrameUpdated { valid: true });
                }
            }
            Step::ReadFrame => {
                self.state = EngineState::AwaitingReply;
                let mut buf = [0u8; READ_BUFFER_LEN];
                let count = self.read_available(&mut buf)?;
                let valid = self.frame.accept(&buf[..count.min(buf.len())], now_ms);
                if !valid {
                    warn!("Sensor group read returned {} bytes", count);
                }
                let _ = events.push(EngineEvent::FrameUpdated { valid });
            }
            Step::ReadScalar(packet_id) => {
                self.state = EngineState::AwaitingReply;
                let mut buf = [0u8; READ_BUFFER_LEN];
                let count = self.read_available(&mut buf)?;
                let value = decode_scalar(&buf[..count.min(buf.len())]);
                if value.is_none() {
                    warn!("Sensor packet {} read returned {} bytes", packet_id, count);
                }
                let _ = events.push(EngineEvent::ScalarRead { packet_id, value });
            }
            Step::Finish(command) => {
                let _ = events.push(EngineEvent::CommandSent(command));
            }
            Step::Publish(trigger) => {
                let _ = events.push(EngineEvent::PublishRequested(trigger));
            }
        }
        Ok(())
    }

    /// Read everything waiting on the line; bytes past `buf` are counted but
    /// dropped
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut total = 0;
        let mut overflow = [0u8; READ_BUFFER_LEN];
        while self.serial.read_ready().map_err(|_| Error::Serial)? {
            let target = if total < buf.len() {
                &mut buf[total..]
            } else {
                &mut overflow[..]
            };
            let n = self.serial.read(target).map_err(|_| Error::Serial)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSerial, MockWakeLine};

    const KNOWN: [u8; 10] = [2, 0x10, 0x00, 0xFF, 0x38, 0x14, 0x02, 0x58, 0x09, 0xC4];

    fn engine() -> SerialEngine<MockSerial, MockWakeLine> {
        SerialEngine::new(MockSerial::new(), MockWakeLine::default())
    }

    /// Poll every millisecond from `start` until the engine goes idle
    fn run_to_idle(
        engine: &mut SerialEngine<MockSerial, MockWakeLine>,
        start: u64,
    ) -> (u64, std::vec::Vec<EngineEvent>) {
        let mut events = std::vec::Vec::new();
        let mut now = start;
        loop {
            events.extend(engine.poll(now));
            if engine.is_idle() {
                return (now, events);
            }
            now += 1;
            assert!(now - start < 10_000, "engine never went idle");
        }
    }

    #[test]
    fn test_wake_pulse_timing() {
        let mut engine = engine();
        engine.wake().unwrap();

        engine.poll(0);
        assert_eq!(engine.wake_line().levels, [false]);
        assert_eq!(engine.state(), EngineState::Waking);

        engine.poll(WAKE_PULSE_MS - 1);
        assert_eq!(engine.wake_line().levels, [false]);

        engine.poll(WAKE_PULSE_MS);
        assert_eq!(engine.wake_line().levels, [false, true]);

        assert!(engine.poll(WAKE_PULSE_MS + WAKE_SETTLE_MS - 1).is_empty());
        let events = engine.poll(WAKE_PULSE_MS + WAKE_SETTLE_MS);
        assert_eq!(events.as_slice(), [EngineEvent::CommandSent(Command::Wake)]);
        assert_eq!(engine.state(), EngineState::Complete);
        assert!(engine.serial_mut().written.is_empty());

        engine.poll(WAKE_PULSE_MS + WAKE_SETTLE_MS + 1);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_control_mode_writes_start_only() {
        let mut engine = engine();
        engine.enter_control_mode().unwrap();

        let events = engine.poll(0);
        assert!(events.is_empty());
        assert_eq!(engine.serial_mut().written, [opcode::START]);
        assert_eq!(engine.state(), EngineState::ControlMode);

        let events = engine.poll(CONTROL_MODE_SETTLE_MS);
        assert_eq!(events.as_slice(), [EngineEvent::CommandSent(Command::Start)]);
        assert!(engine.wake_line().levels.is_empty());
    }

    #[test]
    fn test_clean_sequence_bytes_and_delays() {
        let mut engine = engine();
        engine.clean(None).unwrap();

        engine.poll(0);
        engine.poll(WAKE_PULSE_MS);
        let control_at = WAKE_PULSE_MS + WAKE_SETTLE_MS;
        engine.poll(control_at - 1);
        assert!(engine.serial_mut().written.is_empty());

        engine.poll(control_at);
        assert_eq!(engine.serial_mut().written, [opcode::START]);

        let opcode_at = control_at + CONTROL_MODE_SETTLE_MS;
        assert!(engine.poll(opcode_at - 1).is_empty());
        let events = engine.poll(opcode_at);
        assert_eq!(engine.serial_mut().written, [opcode::START, opcode::CLEAN]);
        assert_eq!(events.as_slice(), [EngineEvent::CommandSent(Command::Clean)]);
        assert_eq!(engine.wake_line().levels, [false, true]);
    }

    #[test]
    fn test_every_compound_command_opcode() {
        let cases = [
            (Command::Stop, 173),
            (Command::Clean, 135),
            (Command::Max, 136),
            (Command::Spot, 134),
            (Command::Dock, 143),
            (Command::PowerOff, 133),
            (Command::Reset, 7),
        ];
        for (command, byte) in cases {
            let mut engine = engine();
            engine.command(command, None).unwrap();
            run_to_idle(&mut engine, 0);
            assert_eq!(engine.serial_mut().written, [opcode::START, byte], "{:?}", command);
        }
    }

    #[test]
    fn test_group_query_accepts_full_frame() {
        let mut engine = engine();
        engine.serial_mut().inject(&[0xAA, 0xBB]);
        engine.serial_mut().reply_to(SENSOR_GROUP_ID, &KNOWN);
        engine.query_group_frame(true, None).unwrap();

        let (_, events) = run_to_idle(&mut engine, 0);

        assert_eq!(
            engine.serial_mut().written,
            [opcode::START, opcode::SENSORS, SENSOR_GROUP_ID]
        );
        assert_eq!(events, [EngineEvent::FrameUpdated { valid: true }]);
        let frame = engine.frame();
        assert_eq!(frame.voltage_mv(), Some(4096));
        assert_eq!(frame.current_ma(), Some(-200));
        assert!(engine.serial_mut().rx.is_empty());
    }

    #[test]
    fn test_group_query_short_reply_is_invalid() {
        let mut engine = engine();
        engine.serial_mut().reply_to(SENSOR_GROUP_ID, &KNOWN[..7]);
        engine.query_group_frame(true, None).unwrap();

        let (_, events) = run_to_idle(&mut engine, 0);

        assert_eq!(events, [EngineEvent::FrameUpdated { valid: false }]);
        assert!(!engine.frame().is_valid());
        assert_eq!(engine.frame().charge_mah(), None);
    }

    #[test]
    fn test_reply_waits_before_reading() {
        let mut engine = engine();
        engine.query_group_frame(true, None).unwrap();
        let id_at = WAKE_PULSE_MS + WAKE_SETTLE_MS + CONTROL_MODE_SETTLE_MS + SENSOR_REQUEST_GAP_MS;

        engine.poll(0);
        engine.poll(WAKE_PULSE_MS);
        engine.poll(WAKE_PULSE_MS + WAKE_SETTLE_MS);
        engine.poll(id_at - SENSOR_REQUEST_GAP_MS);
        engine.poll(id_at);
        assert_eq!(engine.state(), EngineState::AwaitingReply);

        // Reply trickles in after the request
        engine.serial_mut().inject(&KNOWN);
        assert!(engine.poll(id_at + SENSOR_REPLY_WAIT_MS - 1).is_empty());
        let events = engine.poll(id_at + SENSOR_REPLY_WAIT_MS);
        assert_eq!(events.as_slice(), [EngineEvent::FrameUpdated { valid: true }]);
    }

    #[test]
    fn test_fresh_cache_skips_query() {
        let mut engine = engine();
        engine.serial_mut().reply_to(SENSOR_GROUP_ID, &KNOWN);
        engine.query_group_frame(true, None).unwrap();
        let (done, _) = run_to_idle(&mut engine, 0);
        let written = engine.serial_mut().written.len();

        engine.query_group_frame(false, None).unwrap();
        let events = engine.poll(done + 1);
        assert_eq!(events.as_slice(), [EngineEvent::FrameUpdated { valid: true }]);
        assert_eq!(engine.serial_mut().written.len(), written);

        // Stale cache goes back to the vacuum
        engine.query_group_frame(false, None).unwrap();
        run_to_idle(&mut engine, done + MIN_REFRESH_INTERVAL_MS);
        assert!(engine.serial_mut().written.len() > written);
    }

    #[test]
    fn test_scalar_query_decodes_reply() {
        let mut engine = engine();
        engine.serial_mut().reply_to(22, &[0x3F, 0x52]);
        engine.query_scalar_packet(22).unwrap();

        let (_, events) = run_to_idle(&mut engine, 0);

        assert_eq!(engine.serial_mut().written, [opcode::START, opcode::SENSORS, 22]);
        assert_eq!(
            events,
            [EngineEvent::ScalarRead {
                packet_id: 22,
                value: Some(0x3F * 256 + 0x52)
            }]
        );
    }

    #[test]
    fn test_scalar_query_bad_length_fails_soft() {
        let mut engine = engine();
        engine.serial_mut().reply_to(21, &[1, 2, 3]);
        engine.query_scalar_packet(21).unwrap();

        let (_, events) = run_to_idle(&mut engine, 0);

        assert_eq!(
            events,
            [EngineEvent::ScalarRead {
                packet_id: 21,
                value: None
            }]
        );
        assert!(engine.serial_mut().rx.is_empty());
    }

    #[test]
    fn test_triggered_command_reads_back_and_publishes() {
        let mut engine = engine();
        engine.serial_mut().reply_to(SENSOR_GROUP_ID, &KNOWN);
        engine.dock(Some(StatusTrigger::Operator)).unwrap();

        let (done, events) = run_to_idle(&mut engine, 0);

        assert_eq!(
            events,
            [
                EngineEvent::CommandSent(Command::Dock),
                EngineEvent::FrameUpdated { valid: true },
                EngineEvent::PublishRequested(StatusTrigger::Operator),
            ]
        );
        assert_eq!(
            engine.serial_mut().written,
            [
                opcode::START,
                opcode::DOCK,
                opcode::START,
                opcode::SENSORS,
                SENSOR_GROUP_ID
            ]
        );
        let command = WAKE_PULSE_MS + WAKE_SETTLE_MS + CONTROL_MODE_SETTLE_MS;
        let query = command + SENSOR_REQUEST_GAP_MS + SENSOR_REPLY_WAIT_MS;
        assert_eq!(done, command + STATUS_SETTLE_MS + query);
    }

    #[test]
    fn test_jobs_run_in_order_and_queue_is_bounded() {
        let mut engine = engine();
        engine.stop(None).unwrap();
        for _ in 1..JOB_QUEUE_DEPTH {
            engine.wake().unwrap();
        }
        assert_eq!(engine.wake(), Err(Error::Busy));

        // First job starts, freeing a slot
        engine.poll(0);
        engine.dock(None).unwrap();

        let (_, events) = run_to_idle(&mut engine, 1);
        assert_eq!(events.first(), Some(&EngineEvent::CommandSent(Command::Stop)));
        assert_eq!(events.last(), Some(&EngineEvent::CommandSent(Command::Dock)));
        assert_eq!(events.len(), JOB_QUEUE_DEPTH + 1);
    }

    #[test]
    fn test_read_fault_fails_job_and_next_job_runs() {
        let mut engine = engine();
        engine.serial_mut().fail_reads(1);
        engine.query_group_frame(true, Some(StatusTrigger::Periodic)).unwrap();
        engine.spot(None).unwrap();

        let failed = Job::GroupQuery {
            force: true,
            publish: Some(StatusTrigger::Periodic),
        };
        assert_eq!(engine.poll(0).as_slice(), [EngineEvent::Failed(failed)]);
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(failed.publish_trigger(), Some(StatusTrigger::Periodic));

        let (_, events) = run_to_idle(&mut engine, 1);
        assert_eq!(events, [EngineEvent::CommandSent(Command::Spot)]);
        assert_eq!(engine.serial_mut().written, [opcode::START, opcode::SPOT]);
        assert!(!engine.frame().is_valid());

        engine.poll(WAKE_PULSE_MS + WAKE_SETTLE_MS + CONTROL_MODE_SETTLE_MS + 10);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_wake_line_fault_fails_command() {
        let wake_line = MockWakeLine {
            broken: true,
            ..Default::default()
        };
        let mut engine = SerialEngine::new(MockSerial::new(), wake_line);
        engine.clean(Some(StatusTrigger::BusCommand)).unwrap();

        let events = engine.poll(0);
        assert_eq!(
            events.as_slice(),
            [EngineEvent::Failed(Job::Command {
                command: Command::Clean,
                trigger: Some(StatusTrigger::BusCommand),
            })]
        );
        assert!(engine.serial_mut().written.is_empty());
        assert!(engine.is_idle());

        engine.poll(1);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_not_idle_while_job_runs() {
        let mut engine = engine();
        assert!(engine.is_idle());
        engine.spot(None).unwrap();
        assert!(!engine.is_idle());
        engine.poll(0);
        assert!(!engine.is_idle());
        run_to_idle(&mut engine, 1);
        assert!(engine.is_idle());
    }
}
