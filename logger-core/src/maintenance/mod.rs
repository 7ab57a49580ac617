//! Once-per-second maintenance pass.
//!
//! The single authoritative slow tick of the attached-mode loop: storage
//! inactivity bookkeeping, battery-full detection, deferred-action countdown,
//! and the software watchdog acknowledgement. The body runs at most once per
//! distinct RTC second value; extra loop iterations inside the same second
//! are no-ops.

use crate::devices::{BatteryMonitor, CommandDispatcher, HealthCounter, StorageControl, Watchdog};
use crate::status::{ActionFlags, DeviceStatus};

/// Thresholds and limits applied by the maintenance pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MaintenanceConfig {
    /// ADC level above which the battery counts as full on USB power.
    pub battery_full_level: u16,
    /// ADC level below which a session-entry baseline counts as depleted
    /// enough for the charge cycle to count toward battery health.
    pub battery_mid_level: u16,
    /// Inactivity count beyond which pending writes are force-flushed.
    pub inactivity_flush_limit: u8,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            battery_full_level: 708,
            battery_mid_level: 614,
            inactivity_flush_limit: 3,
        }
    }
}

/// What one maintenance poll did.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MaintenanceOutcome {
    /// The per-second body ran (the second counter changed).
    pub ran: bool,
    /// Pending writes were force-flushed for inactivity.
    pub flushed: bool,
    /// The deferred action fired this second.
    pub action_fired: bool,
    /// The fired action requested a device restart.
    pub restart: bool,
}

/// Per-second task state.
#[derive(Clone, Debug)]
pub struct MaintenanceTask {
    config: MaintenanceConfig,
    last_second: Option<u32>,
}

impl MaintenanceTask {
    /// Creates the task; the first poll always runs the body.
    #[must_use]
    pub const fn new(config: MaintenanceConfig) -> Self {
        Self {
            config,
            last_second: None,
        }
    }

    /// Configured thresholds.
    #[must_use]
    pub const fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Runs the per-second body when `now_seconds` differs from the last run.
    pub fn poll<S, B, D, W>(
        &mut self,
        now_seconds: u32,
        status: &mut DeviceStatus,
        storage: &mut S,
        battery: &mut B,
        dispatcher: &mut D,
        watchdog: &mut W,
    ) -> MaintenanceOutcome
    where
        S: StorageControl,
        B: BatteryMonitor,
        D: CommandDispatcher,
        W: Watchdog,
    {
        let mut outcome = MaintenanceOutcome::default();
        if self.last_second == Some(now_seconds) {
            return outcome;
        }
        self.last_second = Some(now_seconds);
        outcome.ran = true;

        status.inactivity = storage.increment_inactivity();

        battery.sample_now();
        let reading = battery.latest();
        status.last_battery = reading.level;
        if reading.level > self.config.battery_full_level && !status.battery_full {
            status.battery_full = true;
            if let Some(baseline) = status.initial_battery
                && baseline < self.config.battery_mid_level
            {
                // One full charge cycle from a depleted start; coarse wear signal.
                dispatcher.increment_health_counter(HealthCounter::Battery);
            }
        }

        if status.inactivity > self.config.inactivity_flush_limit {
            storage.flush(true);
            outcome.flushed = true;
        }

        if status.action_countdown > 0 {
            status.action_countdown -= 1;
            if status.action_countdown == 0 {
                outcome.action_fired = true;
                let flags = status.action_flags;
                status.action_flags = ActionFlags::empty();
                if dispatcher.perform_action(flags) {
                    outcome.restart = true;
                }
            }
        }

        watchdog.feed();
        outcome
    }
}
