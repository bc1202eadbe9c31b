//! Hardware capability set required by the ignition control loop.
//!
//! The controller never touches registers. Firmware and host targets provide
//! concrete types for a free-running timer, the trigger input pin and the two
//! digital outputs (ignition driver and status indicator). The timer's
//! overflow interrupt reaches the main loop exclusively through an
//! [`OverflowSignal`].

use portable_atomic::{AtomicBool, Ordering};

/// Level sampled on the trigger input pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    /// Helper converting a raw "pin is high" reading into a [`PinLevel`].
    #[must_use]
    pub const fn from_high(high: bool) -> Self {
        if high { PinLevel::High } else { PinLevel::Low }
    }

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, PinLevel::High)
    }
}

/// Logical state driven onto a digital output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputLevel {
    Asserted,
    Released,
}

impl OutputLevel {
    #[must_use]
    pub const fn is_asserted(self) -> bool {
        matches!(self, OutputLevel::Asserted)
    }

    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            OutputLevel::Asserted => OutputLevel::Released,
            OutputLevel::Released => OutputLevel::Asserted,
        }
    }
}

/// Flag raised by the timer overflow interrupt and consumed by the main loop.
///
/// This is the only state shared between interrupt and thread context. The
/// interrupt side may only call [`OverflowSignal::notify`]; the main loop
/// clears it with the indivisible [`OverflowSignal::take`].
#[derive(Debug)]
pub struct OverflowSignal {
    raised: AtomicBool,
}

impl OverflowSignal {
    /// Creates a lowered signal. Usable in `static` initializers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
        }
    }

    /// Raises the signal. Safe to call from interrupt context.
    pub fn notify(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Returns `true` when an overflow was signalled since the last [`take`](Self::take).
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Atomically reads and lowers the signal.
    ///
    /// A notification racing with this call is either returned now or kept
    /// for the next call, never lost.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

impl Default for OverflowSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds a monotonic tick count into a free-running counter `bits` wide.
///
/// Each time the folded value wraps the overflow signal is notified, which
/// is how a polled counter stands in for a hardware overflow interrupt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CounterWindow {
    bits: u32,
    wraps_seen: u64,
}

impl CounterWindow {
    /// Width is clamped to `1..=32` bits.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        let bits = if bits == 0 {
            1
        } else if bits > 32 {
            32
        } else {
            bits
        };
        Self {
            bits,
            wraps_seen: 0,
        }
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Counter value for `elapsed` ticks since the last restart.
    pub fn fold(&mut self, elapsed: u64, overflow: &OverflowSignal) -> u32 {
        let wraps = elapsed >> self.bits;
        if wraps > self.wraps_seen {
            self.wraps_seen = wraps;
            overflow.notify();
        }
        let mask = (1u64 << self.bits) - 1;
        u32::try_from(elapsed & mask).unwrap_or(u32::MAX)
    }

    /// Forgets wraps seen before a counter reset.
    pub fn restart(&mut self) {
        self.wraps_seen = 0;
    }
}

/// Free-running tick counter used for interval capture and spark timing.
pub trait HardwareTimer {
    /// Returns the ticks elapsed since the last [`reset`](Self::reset).
    fn now(&mut self) -> u32;

    /// Restarts counting from zero.
    fn reset(&mut self);

    /// Signal raised by this timer's overflow notification.
    fn overflow(&self) -> &OverflowSignal;
}

/// Digital input wired to the trigger coil conditioning circuit.
pub trait TriggerInput {
    /// Samples the current pin level.
    fn level(&mut self) -> PinLevel;
}

/// Digital output (ignition driver or status indicator).
pub trait DigitalOutput {
    /// Drives the output to the requested logical level.
    fn set(&mut self, level: OutputLevel);

    /// Returns the level most recently driven.
    fn level(&self) -> OutputLevel;

    /// Inverts the current output level.
    fn toggle(&mut self) {
        let next = self.level().inverted();
        self.set(next);
    }
}

/// Spins until the timer reaches `target` ticks.
///
/// Also returns once the counter is seen moving backwards, which only happens
/// when it wrapped; the overflow signal then carries the consequences. The
/// returned value is the last tick count observed.
pub fn wait_until<T: HardwareTimer>(timer: &mut T, target: u32) -> u32 {
    let mut previous = timer.now();
    while previous < target {
        let now = timer.now();
        if now < previous {
            return now;
        }
        previous = now;
    }
    previous
}
