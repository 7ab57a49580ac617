use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use logger_core::clock::{RtcSnapshot, TICKS_PER_SECOND, TickClock};
use logger_core::command::CommandEngine;
use logger_core::devices::{
    BatteryMonitor, BatteryReading, CommandLine, HostTransport, LedSink, MotionSensor, NoGyro,
    NoopWatchdog, StorageControl, TransportError,
};
use logger_core::led::LedColor;
use logger_core::session::{AttachedLoop, DevicePorts, ExitReason, LoopConfig, StepOutcome};
use logger_core::status::AttachState;

type EventLog = Rc<RefCell<Vec<&'static str>>>;

struct SimTransport {
    bus_present: bool,
    configured: bool,
    suspended: bool,
    inbox: VecDeque<CommandLine>,
    written: Vec<String>,
    reject_writes: bool,
    detached: bool,
    events: EventLog,
}

impl SimTransport {
    fn new(events: EventLog) -> Self {
        Self {
            bus_present: true,
            configured: true,
            suspended: false,
            inbox: VecDeque::new(),
            written: Vec::new(),
            reject_writes: false,
            detached: false,
            events,
        }
    }

    fn push_line(&mut self, line: &str) {
        let mut buffer = CommandLine::new();
        buffer.push_str(line).expect("test line fits the buffer");
        self.inbox.push_back(buffer);
    }

    fn sample_lines(&self) -> usize {
        self.written
            .iter()
            .filter(|entry| {
                entry.contains(',') && !entry.starts_with("ERROR") && !entry.contains('=')
            })
            .count()
    }
}

impl HostTransport for SimTransport {
    fn service(&mut self) {}

    fn bus_present(&self) -> bool {
        self.bus_present
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn poll_line(&mut self) -> Option<CommandLine> {
        self.inbox.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.reject_writes {
            return Err(TransportError::Busy);
        }
        self.written
            .push(String::from_utf8(bytes.to_vec()).expect("loop writes UTF-8"));
        Ok(())
    }

    fn detach(&mut self) {
        self.detached = true;
        self.events.borrow_mut().push("detach");
    }
}

struct SimMotion {
    next: i16,
    busy: bool,
}

impl SimMotion {
    fn new() -> Self {
        Self {
            next: 1,
            busy: false,
        }
    }
}

impl MotionSensor for SimMotion {
    fn sample(&mut self) -> Option<[i16; 3]> {
        if self.busy {
            return None;
        }
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        Some([value, -value, value * 2])
    }
}

struct SimStorage {
    inactivity: u8,
    shutdowns: usize,
    events: EventLog,
}

impl SimStorage {
    fn new(events: EventLog) -> Self {
        Self {
            inactivity: 0,
            shutdowns: 0,
            events,
        }
    }
}

impl StorageControl for SimStorage {
    fn set_usb_mounted(&mut self, _mounted: bool) {}

    fn increment_inactivity(&mut self) -> u8 {
        self.inactivity = self.inactivity.saturating_add(1);
        self.inactivity
    }

    fn flush(&mut self, _urgent: bool) {
        self.inactivity = 0;
    }

    fn shutdown(&mut self) {
        self.shutdowns += 1;
        self.events.borrow_mut().push("shutdown");
    }
}

struct SimBattery {
    level: Rc<RefCell<u16>>,
}

impl BatteryMonitor for SimBattery {
    fn sample_now(&mut self) {}

    fn latest(&self) -> BatteryReading {
        BatteryReading::new(*self.level.borrow())
    }
}

#[derive(Default)]
struct SimLed {
    last: Option<LedColor>,
}

impl LedSink for SimLed {
    fn set(&mut self, color: LedColor) {
        self.last = Some(color);
    }
}

type Rig = AttachedLoop<
    SimTransport,
    SimMotion,
    NoGyro,
    SimStorage,
    SimBattery,
    CommandEngine,
    NoopWatchdog,
    SimLed,
>;

fn make_rig(initial_battery: u16) -> (Rig, Rc<RefCell<u16>>, EventLog) {
    let events: EventLog = Rc::new(RefCell::new(Vec::new()));
    let level = Rc::new(RefCell::new(initial_battery));

    let ports = DevicePorts {
        transport: SimTransport::new(events.clone()),
        motion: SimMotion::new(),
        gyro: None::<NoGyro>,
        storage: SimStorage::new(events.clone()),
        battery: SimBattery {
            level: level.clone(),
        },
        dispatcher: CommandEngine::default(),
        watchdog: NoopWatchdog::new(),
        led: SimLed::default(),
    };

    let rig = AttachedLoop::new(ports, LoopConfig::with_rate(100));
    (rig, level, events)
}

fn at(ticks: u32) -> RtcSnapshot {
    RtcSnapshot::new(ticks, ticks / TICKS_PER_SECOND)
}

/// Clock that advances a fixed tick count per observation.
struct SteppingClock {
    ticks: Cell<u32>,
}

impl TickClock for SteppingClock {
    fn now(&self) -> RtcSnapshot {
        let ticks = self.ticks.get().wrapping_add(64);
        self.ticks.set(ticks);
        at(ticks)
    }
}

#[test]
fn command_intake_disables_streaming_in_the_same_iteration() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("stream");
    assert_eq!(rig.step(at(0)), StepOutcome::Running);
    assert!(rig.status().stream);

    // Streaming armed at tick 0; a sample would be due here, but the queued
    // command must win and suppress it in the same iteration.
    rig.ports_mut().transport.push_line("status");
    assert_eq!(rig.step(at(1400)), StepOutcome::Running);

    assert!(!rig.status().stream);
    assert_eq!(rig.ports().transport.sample_lines(), 0);
}

#[test]
fn streaming_emits_rate_limited_samples() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("stream");
    rig.step(at(0));

    // Interval for 100 Hz is 655 ticks; the first poll armed at tick 0.
    rig.step(at(700));
    rig.step(at(700));
    rig.step(at(1400));

    assert_eq!(rig.ports().transport.sample_lines(), 2);

    // A long stall emits exactly one sample and resynchronizes.
    rig.step(at(20_000));
    assert_eq!(rig.ports().transport.sample_lines(), 3);
    rig.step(at(20_001));
    assert_eq!(rig.ports().transport.sample_lines(), 3);
}

#[test]
fn bus_detach_detaches_transport_before_storage_shutdown() {
    let (mut rig, _, events) = make_rig(500);

    rig.step(at(0));
    rig.ports_mut().transport.bus_present = false;

    assert_eq!(
        rig.step(at(100)),
        StepOutcome::Exited(ExitReason::BusDetached)
    );
    assert_eq!(rig.status().attach, AttachState::Detached);
    assert!(rig.ports().transport.detached);
    assert_eq!(rig.ports().storage.shutdowns, 1);
    assert_eq!(*events.borrow(), ["detach", "shutdown"]);

    // Stepping a finished session stays exited without re-running shutdown.
    assert_eq!(
        rig.step(at(200)),
        StepOutcome::Exited(ExitReason::BusDetached)
    );
    assert_eq!(rig.ports().storage.shutdowns, 1);
}

#[test]
fn reset_command_restarts_via_the_deferred_action() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("reset 1");
    // The maintenance pass in this same iteration decrements 1 -> 0 and
    // fires the action; the restart flag is observed at the next check.
    assert_eq!(rig.step(at(0)), StepOutcome::Running);
    assert_eq!(
        rig.step(at(100)),
        StepOutcome::Exited(ExitReason::RestartRequested)
    );
    assert_eq!(rig.ports().storage.shutdowns, 1);
}

#[test]
fn unconfigured_transport_reads_as_suspended() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.configured = false;
    rig.ports_mut().transport.push_line("status");
    rig.step(at(0));

    assert_eq!(rig.status().attach, AttachState::Suspended);
    // Suspended iterations take no command input.
    assert_eq!(rig.ports().transport.inbox.len(), 1);
}

#[test]
fn battery_full_latch_credits_health_once_per_session() {
    let (mut rig, level, _) = make_rig(500);

    *level.borrow_mut() = 720;
    for second in 0..5u32 {
        rig.step(RtcSnapshot::new(second * TICKS_PER_SECOND, second));
    }

    assert!(rig.status().battery_full);
    assert_eq!(rig.ports().dispatcher.health().battery, 1);
}

#[test]
fn full_battery_without_depleted_baseline_earns_no_credit() {
    let (mut rig, level, _) = make_rig(700);

    *level.borrow_mut() = 720;
    rig.step(at(0));

    assert!(rig.status().battery_full);
    assert_eq!(rig.ports().dispatcher.health().battery, 0);
}

#[test]
fn busy_sensor_skips_the_sample_without_failing() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("stream");
    rig.step(at(0));
    rig.ports_mut().motion.busy = true;

    assert_eq!(rig.step(at(700)), StepOutcome::Running);
    assert_eq!(rig.ports().transport.sample_lines(), 0);

    // The slot was consumed; the next interval streams normally again.
    rig.ports_mut().motion.busy = false;
    rig.step(at(1400));
    assert_eq!(rig.ports().transport.sample_lines(), 1);
}

#[test]
fn saturated_transport_drops_the_sample_and_continues() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("stream");
    rig.step(at(0));
    rig.ports_mut().transport.reject_writes = true;

    assert_eq!(rig.step(at(700)), StepOutcome::Running);
    assert_eq!(rig.ports().transport.sample_lines(), 0);
}

#[test]
fn led_override_flows_through_to_the_sink() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("led magenta");
    rig.step(at(0));
    assert_eq!(rig.ports().led.last, Some(LedColor::Magenta));

    // `led auto` releases the override; the presenter never picks magenta on
    // its own, so the sink must show something else afterwards.
    rig.ports_mut().transport.push_line("led auto");
    rig.step(at(1));
    assert!(rig.status().led_override.is_none());
    assert_ne!(rig.ports().led.last, Some(LedColor::Magenta));
}

#[test]
fn run_drives_the_session_to_exit() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("reset 1");
    let clock = SteppingClock {
        ticks: Cell::new(0),
    };

    assert_eq!(rig.run(&clock), ExitReason::RestartRequested);
    assert_eq!(rig.ports().storage.shutdowns, 1);
}

#[test]
fn rate_command_retunes_the_emitter() {
    let (mut rig, _, _) = make_rig(500);

    rig.ports_mut().transport.push_line("rate 200");
    rig.step(at(0));
    rig.ports_mut().transport.push_line("stream");
    rig.step(at(10));

    // 200 Hz -> 327-tick interval, armed at tick 10.
    rig.step(at(350));
    assert_eq!(rig.ports().transport.sample_lines(), 1);
}
