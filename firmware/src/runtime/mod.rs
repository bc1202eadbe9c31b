use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt::{error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use ignition_core::config::Config;
use ignition_core::controller::IgnitionController;

use crate::hw::{ActiveHigh, COUNTER_BITS, TriggerPin, WindowTimer};
use crate::status::STATUS;
use crate::telemetry::FirmwareTelemetry;

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

fn load_config() -> Config {
    Config::builder().build().unwrap_or_else(|err| {
        error!("invalid ignition config ({}), using reference calibration", err);
        Config::default()
    })
}

#[embassy_executor::main]
pub async fn main(_spawner: Spawner) {
    let hal::Peripherals { PA0, PA5, PB3, .. } = hal::init(hal::Config::default());

    let config = load_config();
    info!(
        "ignition: coil {=u16}deg, limit {=u16} rpm, cutoff {=u32} ticks, {=u32}-bit timer",
        config.trigger_coil_angle(),
        config.rev_limit().get(),
        config.cutoff_ticks(),
        COUNTER_BITS
    );

    let trigger = TriggerPin::new(Input::new(PA0, Pull::Down));
    let coil = ActiveHigh::new(Output::new(PB3, Level::Low, Speed::VeryHigh));
    let led = ActiveHigh::new(Output::new(PA5, Level::Low, Speed::Low));

    let mut controller = IgnitionController::new(&config, WindowTimer::new(), trigger, coil, led);
    let mut telemetry = FirmwareTelemetry::new(&STATUS);

    controller.run(&mut telemetry)
}
