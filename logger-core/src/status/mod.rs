//! Owned status context for the attached-mode tasks.
//!
//! The loop owns one [`DeviceStatus`] and passes it to each task by reference;
//! nothing here is process-global. Every field has a single writer during
//! normal operation: the command dispatcher mutates `stream`, `led_override`,
//! `disk_mounted`, and the deferred-action fields, while the maintenance task
//! owns `battery_full`, `inactivity`, and `last_battery`.

use crate::led::LedColor;

/// Host attachment state as seen by the task loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttachState {
    /// No host, or the session has ended.
    Detached,
    /// Enumerated and serviced by a host.
    Attached,
    /// Bus present but the port is unconfigured or suspended.
    Suspended,
}

impl AttachState {
    /// Returns `true` when a host is actively servicing the device.
    #[must_use]
    pub const fn is_attached(self) -> bool {
        matches!(self, AttachState::Attached)
    }
}

/// Opaque bitset describing a deferred action.
///
/// Interpreted only by the command dispatcher's action handler; the loop and
/// maintenance task carry it around without looking inside.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ActionFlags(u16);

impl ActionFlags {
    /// Restart the device once the action fires.
    pub const RESTART: Self = Self(1 << 0);
    /// Re-initialize the media filesystem, keeping the data area.
    pub const FORMAT_QUICK: Self = Self(1 << 1);
    /// Wipe and re-initialize the entire media.
    pub const FORMAT_FULL: Self = Self(1 << 2);
    /// Persist the current settings snapshot as part of the action.
    pub const SAVE_SETTINGS: Self = Self(1 << 3);

    /// Bitset with no actions pending.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns `true` when no flags are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of `self` and `other`.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

/// Status context owned by the attached-mode loop.
#[derive(Clone, Debug)]
pub struct DeviceStatus {
    pub attach: AttachState,
    /// Sample streaming enabled. Cleared unconditionally by command intake.
    pub stream: bool,
    /// Latches once the charger reports full; no reset path until power cycle.
    pub battery_full: bool,
    /// Battery level recorded at session entry, absent when unreadable.
    pub initial_battery: Option<u16>,
    /// Most recent battery reading taken by the maintenance task.
    pub last_battery: u16,
    /// Forced LED color, bypassing the presenter's normal selection.
    pub led_override: Option<LedColor>,
    /// Seconds until the deferred action fires; 0 when idle.
    pub action_countdown: u16,
    /// Pending deferred action, consumed when the countdown reaches zero.
    pub action_flags: ActionFlags,
    /// Storage-layer inactivity counter mirror, feeds the LED presenter.
    pub inactivity: u8,
    /// Live streaming rate in Hz.
    pub sample_rate_hz: u16,
    /// Whether the mass-storage media is exposed to the host.
    pub disk_mounted: bool,
}

impl DeviceStatus {
    /// Creates the session-entry status with streaming disabled.
    #[must_use]
    pub fn new(sample_rate_hz: u16) -> Self {
        Self {
            attach: AttachState::Detached,
            stream: false,
            battery_full: false,
            initial_battery: None,
            last_battery: 0,
            led_override: None,
            action_countdown: 0,
            action_flags: ActionFlags::empty(),
            inactivity: 0,
            sample_rate_hz,
            disk_mounted: true,
        }
    }

    /// Merges `flags` into the pending action and (re)starts the countdown.
    pub fn schedule_action(&mut self, flags: ActionFlags, delay_s: u16) {
        self.action_flags = self.action_flags.with(flags);
        self.action_countdown = delay_s.max(1);
    }
}
