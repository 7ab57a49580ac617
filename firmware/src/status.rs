#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared link-state storage for the firmware target.
//!
//! Lightweight atomics let the USB task publish bus, configuration, and
//! suspend state while the logger task reads it through the transport trait
//! without touching shared mutable state directly.

use portable_atomic::{AtomicBool, Ordering};

/// Physical bus-present signal, mirrored from the VBUS sense input.
static BUS_PRESENT: AtomicBool = AtomicBool::new(false);
/// Host has opened and configured the console interface (DTR asserted).
static PORT_CONFIGURED: AtomicBool = AtomicBool::new(false);
/// Host holds the USB device suspended.
static PORT_SUSPENDED: AtomicBool = AtomicBool::new(false);
/// Session asked the USB task to drop off the bus.
static DETACH_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn set_bus_present(present: bool) {
    BUS_PRESENT.store(present, Ordering::Relaxed);
}

pub fn bus_present() -> bool {
    BUS_PRESENT.load(Ordering::Relaxed)
}

pub fn set_port_configured(configured: bool) {
    PORT_CONFIGURED.store(configured, Ordering::Relaxed);
}

pub fn port_configured() -> bool {
    PORT_CONFIGURED.load(Ordering::Relaxed)
}

pub fn set_port_suspended(suspended: bool) {
    PORT_SUSPENDED.store(suspended, Ordering::Relaxed);
}

pub fn port_suspended() -> bool {
    PORT_SUSPENDED.load(Ordering::Relaxed)
}

pub fn request_detach() {
    DETACH_REQUESTED.store(true, Ordering::Relaxed);
}

pub fn detach_requested() -> bool {
    DETACH_REQUESTED.load(Ordering::Relaxed)
}
