//! Attached-mode task loop.
//!
//! A single-threaded cooperative loop that runs while the device is connected
//! to a host and not instructed to restart. Each iteration services the
//! transport, takes at most one command line, refreshes the LED, runs the
//! per-second maintenance pass, and conditionally emits one rate-limited
//! sensor sample. No call blocks beyond the transport's bounded write wait;
//! transient collaborator failures skip the affected operation for one
//! iteration.

use crate::clock::{RtcSnapshot, TickClock};
use crate::devices::{
    BatteryMonitor, CommandDispatcher, CommandOrigin, HostTransport, LedSink, MotionSensor,
    ReplyLine, StorageControl, Watchdog,
};
use crate::led::{self, BlinkTimer};
use crate::maintenance::{MaintenanceConfig, MaintenanceTask};
use crate::status::{AttachState, DeviceStatus};
use crate::stream::{self, StreamScheduler};

/// Why the attached session ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitReason {
    /// The bus-present signal dropped.
    BusDetached,
    /// A deferred action requested a device restart.
    RestartRequested,
}

/// Result of one loop iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// The session continues; call [`AttachedLoop::step`] again.
    Running,
    /// The session ended; the transport is detached and storage is shut
    /// down. The caller typically performs a device reset.
    Exited(ExitReason),
}

/// Collaborators wired into the loop.
///
/// The secondary motion sensor is optional; when fitted, its axes are
/// appended to every streamed sample.
pub struct DevicePorts<T, M, G, S, B, D, W, L> {
    pub transport: T,
    pub motion: M,
    pub gyro: Option<G>,
    pub storage: S,
    pub battery: B,
    pub dispatcher: D,
    pub watchdog: W,
    pub led: L,
}

/// Session-entry configuration.
#[derive(Copy, Clone, Debug, Default)]
pub struct LoopConfig {
    /// Thresholds for the maintenance pass.
    pub maintenance: MaintenanceConfig,
    /// Initial streaming rate in Hz.
    pub sample_rate_hz: u16,
}

impl LoopConfig {
    /// Configuration with default thresholds and the given streaming rate.
    #[must_use]
    pub fn with_rate(sample_rate_hz: u16) -> Self {
        Self {
            maintenance: MaintenanceConfig::default(),
            sample_rate_hz,
        }
    }
}

/// The attached-mode cooperative loop.
pub struct AttachedLoop<T, M, G, S, B, D, W, L> {
    ports: DevicePorts<T, M, G, S, B, D, W, L>,
    status: DeviceStatus,
    emitter: StreamScheduler,
    maintenance: MaintenanceTask,
    blink: BlinkTimer,
    restart: bool,
    finished: Option<ExitReason>,
}

impl<T, M, G, S, B, D, W, L> AttachedLoop<T, M, G, S, B, D, W, L>
where
    T: HostTransport,
    M: MotionSensor,
    G: MotionSensor,
    S: StorageControl,
    B: BatteryMonitor,
    D: CommandDispatcher,
    W: Watchdog,
    L: LedSink,
{
    /// Enters attached mode, recording the battery baseline for the
    /// charge-cycle health heuristic.
    pub fn new(mut ports: DevicePorts<T, M, G, S, B, D, W, L>, config: LoopConfig) -> Self {
        ports.battery.sample_now();
        let reading = ports.battery.latest();

        let mut status = DeviceStatus::new(config.sample_rate_hz);
        status.initial_battery = (reading.level != 0).then_some(reading.level);
        status.last_battery = reading.level;

        Self {
            ports,
            status,
            emitter: StreamScheduler::new(config.sample_rate_hz),
            maintenance: MaintenanceTask::new(config.maintenance),
            blink: BlinkTimer::new(),
            restart: false,
            finished: None,
        }
    }

    /// Read access to the shared status context.
    #[must_use]
    pub const fn status(&self) -> &DeviceStatus {
        &self.status
    }

    /// Read access to the wired collaborators.
    #[must_use]
    pub fn ports(&self) -> &DevicePorts<T, M, G, S, B, D, W, L> {
        &self.ports
    }

    /// Mutable access to the wired collaborators.
    pub fn ports_mut(&mut self) -> &mut DevicePorts<T, M, G, S, B, D, W, L> {
        &mut self.ports
    }

    /// Runs one cooperative iteration at the given RTC observation.
    pub fn step(&mut self, now: RtcSnapshot) -> StepOutcome {
        if let Some(reason) = self.finished {
            return StepOutcome::Exited(reason);
        }
        if !self.ports.transport.bus_present() {
            return self.shut_down(ExitReason::BusDetached);
        }
        if self.restart {
            return self.shut_down(ExitReason::RestartRequested);
        }

        self.ports
            .storage
            .set_usb_mounted(self.status.disk_mounted);
        self.ports.transport.service();

        if self.ports.transport.is_configured() && !self.ports.transport.is_suspended() {
            self.status.attach = AttachState::Attached;
            if let Some(line) = self.ports.transport.poll_line() {
                // A human typing commands must not fight streamed output.
                self.status.stream = false;
                let mut reply = ReplyLine::new();
                self.ports.dispatcher.handle(
                    line.as_str(),
                    CommandOrigin::Usb,
                    &mut self.status,
                    &mut reply,
                );
                if !reply.is_empty() {
                    let _ = self.ports.transport.write(reply.as_bytes());
                }
            }
        } else {
            self.status.attach = AttachState::Suspended;
        }

        self.blink.advance();
        self.ports
            .led
            .set(led::present(&self.status, &self.blink));

        let outcome = self.maintenance.poll(
            now.seconds,
            &mut self.status,
            &mut self.ports.storage,
            &mut self.ports.battery,
            &mut self.ports.dispatcher,
            &mut self.ports.watchdog,
        );
        if outcome.restart {
            self.restart = true;
        }

        if self.status.stream {
            self.emitter.set_rate(self.status.sample_rate_hz);
            if self.emitter.poll(now.ticks).is_due() {
                self.emit_sample();
            }
        }

        StepOutcome::Running
    }

    /// Drives [`step`](Self::step) until the session ends.
    pub fn run<C: TickClock>(&mut self, clock: &C) -> ExitReason {
        loop {
            if let StepOutcome::Exited(reason) = self.step(clock.now()) {
                return reason;
            }
        }
    }

    fn emit_sample(&mut self) {
        // A busy sensor skips this slot; the scheduler has already advanced.
        let Some(accel) = self.ports.motion.sample() else {
            return;
        };
        let gyro = self.ports.gyro.as_mut().and_then(MotionSensor::sample);
        let line = stream::format_sample(accel, gyro);
        // A saturated transport drops the sample rather than stalling the loop.
        let _ = self.ports.transport.write(line.as_bytes());
    }

    fn shut_down(&mut self, reason: ExitReason) -> StepOutcome {
        self.ports.transport.detach();
        self.status.attach = AttachState::Detached;
        self.ports.storage.shutdown();
        self.finished = Some(reason);
        StepOutcome::Exited(reason)
    }
}
