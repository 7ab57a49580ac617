//! Simulated device session for the host emulator.
//!
//! Drives the exact `logger-core` attached loop against virtual
//! collaborators: a deterministic motion waveform, a scripted battery level,
//! an in-memory storage journal, and a byte-capturing transport. Time is a
//! virtual tick counter advanced a fixed amount per loop iteration, so runs
//! are reproducible.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant as HostInstant};

use logger_core::clock::{RtcSnapshot, TICKS_PER_SECOND};
use logger_core::command::CommandEngine;
use logger_core::devices::{
    BatteryMonitor, BatteryReading, CommandLine, HostTransport, LedSink, MotionSensor,
    NoopWatchdog, StorageControl, TransportError,
};
use logger_core::led::LedColor;
use logger_core::session::{AttachedLoop, DevicePorts, ExitReason, LoopConfig, StepOutcome};

/// Virtual ticks consumed by one loop iteration.
const TICKS_PER_ITERATION: u32 = 64;

/// Iterations advanced after each plain command line.
const ITERATIONS_PER_COMMAND: u32 = 256;

/// Battery level the simulation boots with (below the mid-charge threshold).
const INITIAL_BATTERY_LEVEL: u16 = 520;

pub const HELP_TEXT: &[&str] = &[
    "Plain lines go to the device console (try `status`, `stream`, `rate 200`).",
    "!advance <n>   run <n> loop iterations",
    "!seconds <n>   run whole simulated seconds",
    "!battery <lvl> set the simulated battery ADC level",
    "!unplug        drop the bus-present signal",
    "!led           show the current LED color",
    "!help          this text",
];

struct SimTransport {
    bus_present: bool,
    detached: bool,
    inbox: VecDeque<CommandLine>,
    outbox: Vec<u8>,
}

impl SimTransport {
    fn new() -> Self {
        Self {
            bus_present: true,
            detached: false,
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    fn push_line(&mut self, line: &str) -> Result<(), LineTooLong> {
        let mut buffer = CommandLine::new();
        buffer.push_str(line).map_err(|_| LineTooLong)?;
        self.inbox.push_back(buffer);
        Ok(())
    }

    fn drain_output(&mut self) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.outbox).into_owned();
        self.outbox.clear();
        text.lines()
            .map(|line| line.trim_end().to_owned())
            .collect()
    }
}

pub struct LineTooLong;

impl HostTransport for SimTransport {
    fn service(&mut self) {}

    fn bus_present(&self) -> bool {
        self.bus_present
    }

    fn is_configured(&self) -> bool {
        self.bus_present && !self.detached
    }

    fn is_suspended(&self) -> bool {
        false
    }

    fn poll_line(&mut self) -> Option<CommandLine> {
        self.inbox.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.detached {
            return Err(TransportError::Disconnected);
        }
        self.outbox.extend_from_slice(bytes);
        Ok(())
    }

    fn detach(&mut self) {
        self.detached = true;
    }
}

/// Deterministic triangle waveform standing in for the accelerometer.
struct WaveMotion {
    phase: u32,
}

impl WaveMotion {
    fn new() -> Self {
        Self { phase: 0 }
    }

    fn triangle(phase: u32) -> i16 {
        let step = (phase % 512) as i32;
        let value = if step < 256 { step } else { 511 - step };
        ((value - 128) * 16) as i16
    }
}

impl MotionSensor for WaveMotion {
    fn sample(&mut self) -> Option<[i16; 3]> {
        self.phase = self.phase.wrapping_add(7);
        Some([
            Self::triangle(self.phase),
            Self::triangle(self.phase.wrapping_add(170)),
            Self::triangle(self.phase.wrapping_add(340)),
        ])
    }
}

struct ScriptedBattery {
    level: Rc<Cell<u16>>,
}

impl BatteryMonitor for ScriptedBattery {
    fn sample_now(&mut self) {}

    fn latest(&self) -> BatteryReading {
        BatteryReading::new(self.level.get())
    }
}

#[derive(Default)]
struct MemStorage {
    inactivity: u8,
}

impl StorageControl for MemStorage {
    fn set_usb_mounted(&mut self, _mounted: bool) {}

    fn increment_inactivity(&mut self) -> u8 {
        self.inactivity = self.inactivity.saturating_add(1);
        self.inactivity
    }

    fn flush(&mut self, _urgent: bool) {
        self.inactivity = 0;
    }

    fn shutdown(&mut self) {
        self.flush(false);
    }
}

#[derive(Default)]
struct ConsoleLed {
    last: Option<LedColor>,
}

impl LedSink for ConsoleLed {
    fn set(&mut self, color: LedColor) {
        self.last = Some(color);
    }
}

type SimLoop = AttachedLoop<
    SimTransport,
    WaveMotion,
    WaveMotion,
    MemStorage,
    ScriptedBattery,
    CommandEngine,
    NoopWatchdog,
    ConsoleLed,
>;

/// Interactive emulator session.
pub struct Session {
    device: SimLoop,
    battery_level: Rc<Cell<u16>>,
    ticks: u32,
    ended: Option<ExitReason>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    /// Creates a session; `with_gyro` fits the secondary motion sensor.
    pub fn new(with_gyro: bool, transcript_path: Option<&Path>) -> io::Result<Self> {
        let battery_level = Rc::new(Cell::new(INITIAL_BATTERY_LEVEL));

        let ports = DevicePorts {
            transport: SimTransport::new(),
            motion: WaveMotion::new(),
            gyro: with_gyro.then(WaveMotion::new),
            storage: MemStorage::default(),
            battery: ScriptedBattery {
                level: battery_level.clone(),
            },
            dispatcher: CommandEngine::default(),
            watchdog: NoopWatchdog::new(),
            led: ConsoleLed::default(),
        };

        let transcript = transcript_path.map(TranscriptLogger::new).transpose()?;

        Ok(Self {
            device: AttachedLoop::new(ports, LoopConfig::with_rate(100)),
            battery_level,
            ticks: 0,
            ended: None,
            transcript,
            started_at: HostInstant::now(),
        })
    }

    /// Handles one line of operator input and returns the responses to show.
    pub fn handle_input(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let mut responses = if let Some(directive) = trimmed.strip_prefix('!') {
            self.handle_directive(directive)
        } else {
            self.queue_command(trimmed)
        };

        if let Some(transcript) = self.transcript.as_mut() {
            for response in &responses {
                transcript.append_line(elapsed, TranscriptRole::Device, response)?;
            }
        }

        if let Some(reason) = self.ended.take() {
            responses.push(format!("session ended: {reason:?}"));
        }
        Ok(responses)
    }

    fn queue_command(&mut self, line: &str) -> Vec<String> {
        if self
            .device
            .ports_mut()
            .transport
            .push_line(line)
            .is_err()
        {
            return vec!["emulator: line too long for the device console".to_owned()];
        }
        self.advance(ITERATIONS_PER_COMMAND);
        self.device.ports_mut().transport.drain_output()
    }

    fn handle_directive(&mut self, directive: &str) -> Vec<String> {
        let mut words = directive.split_whitespace();
        match (words.next(), words.next()) {
            (Some("advance"), Some(count)) => match count.parse::<u32>() {
                Ok(iterations) => {
                    self.advance(iterations);
                    self.device.ports_mut().transport.drain_output()
                }
                Err(_) => vec!["emulator: !advance expects an iteration count".to_owned()],
            },
            (Some("seconds"), Some(count)) => match count.parse::<u32>() {
                Ok(seconds) => {
                    self.advance(seconds * (TICKS_PER_SECOND / TICKS_PER_ITERATION));
                    self.device.ports_mut().transport.drain_output()
                }
                Err(_) => vec!["emulator: !seconds expects a second count".to_owned()],
            },
            (Some("battery"), Some(level)) => match level.parse::<u16>() {
                Ok(level) => {
                    self.battery_level.set(level);
                    vec![format!("emulator: battery level set to {level}")]
                }
                Err(_) => vec!["emulator: !battery expects an ADC level".to_owned()],
            },
            (Some("unplug"), None) => {
                self.device.ports_mut().transport.bus_present = false;
                self.advance(1);
                vec!["emulator: bus-present deasserted".to_owned()]
            }
            (Some("led"), None) => {
                let name = self
                    .device
                    .ports()
                    .led
                    .last
                    .map_or("unlit", LedColor::name);
                vec![format!("emulator: led is {name}")]
            }
            (Some("help"), None) => HELP_TEXT.iter().map(|&s| s.to_owned()).collect(),
            _ => vec![format!("emulator: unknown directive `!{directive}`")],
        }
    }

    fn advance(&mut self, iterations: u32) {
        for _ in 0..iterations {
            if self.ended.is_some() {
                break;
            }
            self.ticks = self.ticks.wrapping_add(TICKS_PER_ITERATION);
            let now = RtcSnapshot::new(self.ticks, self.ticks / TICKS_PER_SECOND);
            if let StepOutcome::Exited(reason) = self.device.step(now) {
                self.ended = Some(reason);
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum TranscriptRole {
    Host,
    Device,
}

impl TranscriptRole {
    const fn tag(self) -> &'static str {
        match self {
            TranscriptRole::Host => "host",
            TranscriptRole::Device => "device",
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# OpenMotion emulator transcript")?;
        Ok(Self { writer })
    }

    fn append_line(&mut self, elapsed: Duration, role: TranscriptRole, text: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[{:>8.3}s] {:<6} {}",
            elapsed.as_secs_f64(),
            role.tag(),
            text
        )?;
        self.writer.flush()
    }
}
