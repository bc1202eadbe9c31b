use core::panic::PanicInfo;
use defmt::error;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(location) = info.location() {
        error!("panic at {}:{}", location.file(), location.line());
    }
    error!("{}", defmt::Display2Format(&info.message()));
    cortex_m::asm::udf();
}
