#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! RAM-buffered stand-in for the external flash translation layer.
//!
//! The real media path (FTL, filesystem, mass-storage backing) lives outside
//! this firmware; the attached-mode loop only needs the control surface:
//! inactivity bookkeeping, forced flushes, and a terminal shutdown. This
//! implementation keeps those contracts observable without touching flash.

use logger_core::devices::StorageControl;

/// In-memory journal satisfying [`StorageControl`].
#[derive(Clone, Debug, Default)]
pub struct JournalStorage {
    inactivity: u8,
    usb_mounted: bool,
    urgent_flushes: u32,
    full_flushes: u32,
    shut_down: bool,
}

impl JournalStorage {
    /// Creates an idle journal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inactivity: 0,
            usb_mounted: true,
            urgent_flushes: 0,
            full_flushes: 0,
            shut_down: false,
        }
    }

    /// Returns `true` once [`StorageControl::shutdown`] ran.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Whether the media is currently exposed to the host.
    #[must_use]
    pub const fn usb_mounted(&self) -> bool {
        self.usb_mounted
    }

    /// Number of inactivity-forced flushes so far.
    #[must_use]
    pub const fn urgent_flushes(&self) -> u32 {
        self.urgent_flushes
    }
}

impl StorageControl for JournalStorage {
    fn set_usb_mounted(&mut self, mounted: bool) {
        self.usb_mounted = mounted;
    }

    fn increment_inactivity(&mut self) -> u8 {
        self.inactivity = self.inactivity.saturating_add(1);
        self.inactivity
    }

    fn flush(&mut self, urgent: bool) {
        if urgent {
            self.urgent_flushes += 1;
        } else {
            self.full_flushes += 1;
        }
        self.inactivity = 0;
    }

    fn shutdown(&mut self) {
        self.flush(false);
        self.shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactivity_counts_up_and_flush_clears_it() {
        let mut journal = JournalStorage::new();
        assert_eq!(journal.increment_inactivity(), 1);
        assert_eq!(journal.increment_inactivity(), 2);

        journal.flush(true);
        assert_eq!(journal.urgent_flushes(), 1);
        assert_eq!(journal.increment_inactivity(), 1);
    }

    #[test]
    fn shutdown_flushes_and_terminates() {
        let mut journal = JournalStorage::new();
        journal.increment_inactivity();
        journal.shutdown();

        assert!(journal.is_shut_down());
        assert_eq!(journal.increment_inactivity(), 1);
    }

    #[test]
    fn mount_flag_mirrors_host_state() {
        let mut journal = JournalStorage::new();
        assert!(journal.usb_mounted());
        journal.set_usb_mounted(false);
        assert!(!journal.usb_mounted());
    }
}
