use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::Hertz;
use embassy_sync::channel::Channel;
use static_cell::StaticCell;

use crate::hw::accel::Lis2dh;
use crate::hw::{HardwareWatchdog, RgbLed, VddBattery};
use crate::transport::{LineQueue, TxQueue};
use crate::usb;

mod logger_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Streaming rate configured for this build.
const SAMPLE_RATE_HZ: u16 = 100;

/// Watchdog period; the once-per-second maintenance pass feeds it.
const WATCHDOG_TIMEOUT_US: u32 = 8_000_000;

pub(super) static LINE_QUEUE: LineQueue = Channel::new();
pub(super) static TX_QUEUE: TxQueue = Channel::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        USB,
        PA11,
        PA12,
        PA9,
        PA0,
        ADC1,
        I2C1,
        PB6,
        PB7,
        PB0,
        PB1,
        PB2,
        IWDG,
        ..
    } = hal::init(config);

    let i2c = I2c::new_blocking(I2C1, PB6, PB7, Hertz(400_000), Default::default());
    let accel = match Lis2dh::new(i2c, SAMPLE_RATE_HZ) {
        Ok(accel) => accel,
        Err(err) => {
            // Missing or wrong sensor means this is likely the wrong firmware
            // for the board; reset into the bootloader path.
            defmt::error!("accelerometer init failed: {}", defmt::Debug2Format(&err));
            cortex_m::peripheral::SCB::sys_reset();
        }
    };

    let battery = VddBattery::new(Adc::new(ADC1), PA0);
    let led = RgbLed::new(
        Output::new(PB0, Level::Low, Speed::Low),
        Output::new(PB1, Level::Low, Speed::Low),
        Output::new(PB2, Level::Low, Speed::Low),
    );
    let watchdog = HardwareWatchdog::start(IWDG, WATCHDOG_TIMEOUT_US);
    let vbus = Input::new(PA9, Pull::Down);

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");
    spawner
        .spawn(logger_task::run(vbus, accel, battery, led, watchdog))
        .expect("failed to spawn logger task");

    core::future::pending::<()>().await;
}
