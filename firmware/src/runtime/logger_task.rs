use embassy_stm32::gpio::Input;
use embassy_time::Timer;

use logger_core::clock::TickClock;
use logger_core::command::CommandEngine;
use logger_core::devices::NoGyro;
use logger_core::session::{AttachedLoop, DevicePorts, LoopConfig, StepOutcome};

use super::{LINE_QUEUE, SAMPLE_RATE_HZ, TX_QUEUE};
use crate::hw::accel::Lis2dh;
use crate::hw::{FirmwareClock, HardwareWatchdog, RgbLed, VddBattery};
use crate::status;
use crate::storage::JournalStorage;
use crate::transport::UsbTransport;

/// Pause between cooperative iterations.
const STEP_PERIOD_US: u64 = 500;

#[embassy_executor::task]
pub async fn run(
    vbus: Input<'static>,
    accel: Lis2dh<'static>,
    battery: VddBattery<'static>,
    led: RgbLed<'static>,
    watchdog: HardwareWatchdog<'static>,
) -> ! {
    // Autonomous logging belongs to the detached firmware path; this build
    // services attached mode only, so wait for host power first.
    while vbus.is_low() {
        Timer::after_millis(50).await;
    }
    status::set_bus_present(true);
    defmt::info!("logger: host power detected, entering attached mode");

    let ports = DevicePorts {
        transport: UsbTransport::new(LINE_QUEUE.receiver(), TX_QUEUE.sender()),
        motion: accel,
        gyro: None::<NoGyro>,
        storage: JournalStorage::new(),
        battery,
        dispatcher: CommandEngine::default(),
        watchdog,
        led,
    };

    let clock = FirmwareClock;
    let mut session = AttachedLoop::new(ports, LoopConfig::with_rate(SAMPLE_RATE_HZ));

    loop {
        status::set_bus_present(vbus.is_high());
        match session.step(clock.now()) {
            StepOutcome::Running => Timer::after_micros(STEP_PERIOD_US).await,
            StepOutcome::Exited(reason) => {
                defmt::info!("logger: session ended: {}", defmt::Debug2Format(&reason));
                // Attached mode always ends in a device reset.
                cortex_m::peripheral::SCB::sys_reset();
            }
        }
    }
}
