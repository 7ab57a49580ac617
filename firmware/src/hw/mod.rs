//! Peripheral adapters implementing the `logger-core` device contracts.

pub mod accel;

use embassy_stm32::Peri;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Level, Output};
use embassy_stm32::peripherals::{ADC1, IWDG, PA0};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_time::Instant;

use logger_core::clock::{RtcSnapshot, TICKS_PER_SECOND, TickClock};
use logger_core::devices::{BatteryMonitor, BatteryReading, LedSink, Watchdog};
use logger_core::led::LedColor;

/// RTC view derived from the Embassy monotonic timebase.
pub struct FirmwareClock;

impl TickClock for FirmwareClock {
    fn now(&self) -> RtcSnapshot {
        let micros = Instant::now().as_micros();
        let ticks = ((u128::from(micros) * u128::from(TICKS_PER_SECOND)) / 1_000_000) as u32;
        let seconds = (micros / 1_000_000) as u32;
        RtcSnapshot::new(ticks, seconds)
    }
}

/// Tri-color status LED on three push-pull outputs.
pub struct RgbLed<'d> {
    red: Output<'d>,
    green: Output<'d>,
    blue: Output<'d>,
}

impl<'d> RgbLed<'d> {
    /// Wraps the three channel outputs.
    pub fn new(red: Output<'d>, green: Output<'d>, blue: Output<'d>) -> Self {
        Self { red, green, blue }
    }
}

impl LedSink for RgbLed<'_> {
    fn set(&mut self, color: LedColor) {
        self.red.set_level(Level::from(color.red()));
        self.green.set_level(Level::from(color.green()));
        self.blue.set_level(Level::from(color.blue()));
    }
}

/// Independent hardware watchdog fed by the maintenance pass.
pub struct HardwareWatchdog<'d> {
    inner: IndependentWatchdog<'d, IWDG>,
}

impl<'d> HardwareWatchdog<'d> {
    /// Starts the watchdog with the given timeout in microseconds.
    pub fn start(peripheral: Peri<'d, IWDG>, timeout_us: u32) -> Self {
        let mut inner = IndependentWatchdog::new(peripheral, timeout_us);
        inner.unleash();
        Self { inner }
    }
}

impl Watchdog for HardwareWatchdog<'_> {
    fn feed(&mut self) {
        self.inner.pet();
    }
}

/// Battery level sensed through the ADC divider input.
pub struct VddBattery<'d> {
    adc: Adc<'d, ADC1>,
    pin: Peri<'d, PA0>,
    last: u16,
}

impl<'d> VddBattery<'d> {
    /// Wraps the ADC and its divider input pin.
    pub fn new(adc: Adc<'d, ADC1>, pin: Peri<'d, PA0>) -> Self {
        Self { adc, pin, last: 0 }
    }
}

impl BatteryMonitor for VddBattery<'_> {
    fn sample_now(&mut self) {
        let raw = self.adc.blocking_read(&mut self.pin);
        // 12-bit conversion scaled to the 10-bit charge thresholds.
        self.last = raw >> 2;
    }

    fn latest(&self) -> BatteryReading {
        BatteryReading::new(self.last)
    }
}
