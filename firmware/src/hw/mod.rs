//! STM32 adapters for the `ignition-core` capability traits.
//!
//! Pin map on the STM32G0B1:
//!
//! | Signal            | Pin | Mode                 |
//! |-------------------|-----|----------------------|
//! | trigger coil      | PA0 | input, pull-down     |
//! | ignition driver   | PB3 | push-pull, active-high |
//! | status LED        | PA5 | push-pull, active-high |
//!
//! The timer is a 16-bit window over the embassy time base. TIM1 belongs to
//! the embassy time driver, so there is no overflow interrupt of our own:
//! wraps are detected by the control loop's own `now()` polls, which set
//! [`TIMER_OVERFLOW`] before the loop next checks it.

use embassy_stm32::gpio::{Input, Level, Output};
use embassy_time::Instant;
use ignition_core::hal::{
    CounterWindow, DigitalOutput, HardwareTimer, OutputLevel, OverflowSignal, PinLevel,
    TriggerInput,
};

/// Width of the free-running counter seen by the control loop.
pub const COUNTER_BITS: u32 = 16;

/// Set by [`WindowTimer::now`] when a poll finds the window has wrapped.
pub static TIMER_OVERFLOW: OverflowSignal = OverflowSignal::new();

/// Free-running tick counter built on `embassy_time::Instant`.
pub struct WindowTimer {
    base: Instant,
    window: CounterWindow,
}

impl WindowTimer {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            window: CounterWindow::new(COUNTER_BITS),
        }
    }
}

impl Default for WindowTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareTimer for WindowTimer {
    fn now(&mut self) -> u32 {
        let elapsed = Instant::now().saturating_duration_since(self.base);
        self.window.fold(elapsed.as_ticks(), &TIMER_OVERFLOW)
    }

    fn reset(&mut self) {
        self.base = Instant::now();
        self.window.restart();
    }

    fn overflow(&self) -> &OverflowSignal {
        &TIMER_OVERFLOW
    }
}

/// Trigger coil conditioning input.
pub struct TriggerPin {
    pin: Input<'static>,
}

impl TriggerPin {
    pub fn new(pin: Input<'static>) -> Self {
        Self { pin }
    }
}

impl TriggerInput for TriggerPin {
    fn level(&mut self) -> PinLevel {
        PinLevel::from_high(self.pin.is_high())
    }
}

/// Active-high push-pull output (ignition driver or status LED).
pub struct ActiveHigh {
    pin: Output<'static>,
    level: OutputLevel,
}

impl ActiveHigh {
    /// Takes over `pin` and drives it released (low).
    pub fn new(mut pin: Output<'static>) -> Self {
        pin.set_level(Level::Low);
        Self {
            pin,
            level: OutputLevel::Released,
        }
    }
}

impl DigitalOutput for ActiveHigh {
    fn set(&mut self, level: OutputLevel) {
        self.pin.set_level(if level.is_asserted() {
            Level::High
        } else {
            Level::Low
        });
        self.level = level;
    }

    fn level(&self) -> OutputLevel {
        self.level
    }
}
