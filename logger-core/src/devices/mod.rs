//! Collaborator contracts consumed by the attached-mode loop.
//!
//! Firmware and emulator targets provide concrete peripherals satisfying
//! these traits while reusing the shared task logic housed in `logger-core`.
//! Transient failures are expressed as skipped work (`None` samples, `Busy`
//! writes); nothing here panics or propagates an error out of the loop.

use heapless::String;

use crate::led::LedColor;
use crate::status::{ActionFlags, DeviceStatus};

/// Maximum bytes accepted on a single command line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Maximum bytes in a single command reply.
pub const MAX_REPLY_LEN: usize = 192;

/// Bounded command line assembled by the transport.
pub type CommandLine = String<MAX_LINE_LEN>;

/// Bounded reply produced by the command dispatcher.
pub type ReplyLine = String<MAX_REPLY_LEN>;

/// Failures reported by transport writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    /// Transmit path is saturated; the payload was not accepted.
    Busy,
    /// Host link is gone; the payload can never be accepted.
    Disconnected,
}

/// Host-facing byte transport (USB CDC or a simulated stand-in).
pub trait HostTransport {
    /// Performs protocol-level polling for transports that need it.
    fn service(&mut self);

    /// Physical bus-present signal; deassertion ends the attached session.
    fn bus_present(&self) -> bool;

    /// Returns `true` once the host has configured the port.
    fn is_configured(&self) -> bool;

    /// Returns `true` while the host holds the port suspended.
    fn is_suspended(&self) -> bool;

    /// Takes one complete input line if the transport has assembled one.
    fn poll_line(&mut self) -> Option<CommandLine>;

    /// Writes a payload, waiting only long enough for it to be accepted.
    ///
    /// The wait is bounded; saturation surfaces as [`TransportError::Busy`]
    /// and the caller drops the payload.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Drops off the bus at session end.
    fn detach(&mut self);
}

/// Motion sensor sampled on demand.
pub trait MotionSensor {
    /// Acquires one 3-axis sample, or `None` when the sensor is busy.
    fn sample(&mut self) -> Option<[i16; 3]>;
}

/// Placeholder for an absent secondary motion sensor.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoGyro;

impl NoGyro {
    /// Creates the placeholder sensor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MotionSensor for NoGyro {
    fn sample(&mut self) -> Option<[i16; 3]> {
        None
    }
}

/// Control surface of the storage / flash-translation collaborator.
pub trait StorageControl {
    /// Mirrors the host-visible mass-storage mount flag.
    fn set_usb_mounted(&mut self, mounted: bool);

    /// Advances the write-inactivity counter and returns its new value.
    fn increment_inactivity(&mut self) -> u8;

    /// Flushes pending writes; `urgent` forces the scratch area out too.
    fn flush(&mut self, urgent: bool);

    /// Flushes and releases the media. Terminal for the session.
    fn shutdown(&mut self);
}

/// Battery measurement channel.
pub trait BatteryMonitor {
    /// Starts one conversion; the result is retrieved via [`latest`].
    ///
    /// [`latest`]: BatteryMonitor::latest
    fn sample_now(&mut self);

    /// Returns the most recent completed reading.
    fn latest(&self) -> BatteryReading;
}

/// One battery conversion result.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BatteryReading {
    /// Raw ADC level; 0 means no conversion has completed yet.
    pub level: u16,
}

impl BatteryReading {
    /// Wraps a raw ADC level.
    #[must_use]
    pub const fn new(level: u16) -> Self {
        Self { level }
    }
}

/// Where a command line originated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandOrigin {
    /// Interactive host console.
    Usb,
    /// Startup settings script; replies are suppressed.
    StartupScript,
}

/// Persistent health counters maintained by the dispatcher.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HealthCounter {
    /// Completed full-charge cycles starting from a depleted baseline.
    Battery,
    /// Restarts requested through deferred actions.
    Restart,
}

/// Settings/command engine driven by the loop.
pub trait CommandDispatcher {
    /// Executes one command line, mutating `status` and filling `reply`.
    fn handle(
        &mut self,
        line: &str,
        origin: CommandOrigin,
        status: &mut DeviceStatus,
        reply: &mut ReplyLine,
    );

    /// Performs a deferred action; returns `true` when a restart is needed.
    fn perform_action(&mut self, flags: ActionFlags) -> bool;

    /// Bumps a persistent health counter.
    fn increment_health_counter(&mut self, counter: HealthCounter);
}

/// Liveness acknowledgement consumed by an external fail-safe.
pub trait Watchdog {
    /// Marks this task group alive for the current slow tick.
    fn feed(&mut self);
}

/// Watchdog that acknowledges nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopWatchdog;

impl NoopWatchdog {
    /// Creates a no-op watchdog.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Watchdog for NoopWatchdog {
    fn feed(&mut self) {}
}

/// Output channel for the presented LED color.
pub trait LedSink {
    /// Applies the color to the physical or simulated LED.
    fn set(&mut self, color: LedColor);
}
