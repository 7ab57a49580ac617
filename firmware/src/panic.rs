use core::panic::PanicInfo;
use defmt::error;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("PANIC: {}", defmt::Display2Format(info));
    // Stop feeding the independent watchdog; it hard-resets the device.
    loop {
        cortex_m::asm::wfi();
    }
}
