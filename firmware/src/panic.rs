use core::panic::PanicInfo;
use defmt::error;
use stim_core::OperatingMode;

use crate::status;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let mode = status::mode().unwrap_or(OperatingMode::Stopped);
    error!(
        "PANIC in mode {}: {}",
        defmt::Display2Format(&mode),
        defmt::Display2Format(info)
    );
    cortex_m::asm::udf();
}
