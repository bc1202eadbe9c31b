//! Trigger pulse capture.
//!
//! Busy-polls the trigger input until the configured transition is seen,
//! then reads and restarts the hardware timer. The timer is restarted on
//! every completed capture, including faulted ones, so the next measurement
//! always starts from a known reference edge.

use core::fmt;
use core::num::NonZeroU32;

use crate::config::EdgePolicy;
use crate::hal::{HardwareTimer, PinLevel, TriggerInput};

/// Non-zero tick count between two trigger reference points.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Interval(NonZeroU32);

impl Interval {
    /// Returns `None` for a zero tick count.
    #[must_use]
    pub const fn new(ticks: u32) -> Option<Self> {
        match NonZeroU32::new(ticks) {
            Some(ticks) => Some(Self(ticks)),
            None => None,
        }
    }

    #[must_use]
    pub const fn ticks(self) -> u32 {
        self.0.get()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Interval {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=u32} ticks", self.ticks());
    }
}

/// Capture outcomes that must never reach the spark scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorFault {
    /// The timer read zero at the reference edge.
    ZeroInterval,
    /// The counter wrapped while the measurement was running.
    TimerWrapped,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFault::ZeroInterval => f.write_str("zero trigger interval"),
            SensorFault::TimerWrapped => f.write_str("timer wrapped during capture"),
        }
    }
}

/// Tracks successive timer reads to notice a wrap-around.
struct WrapWatch {
    previous: u32,
    wrapped: bool,
}

impl WrapWatch {
    fn start<T: HardwareTimer>(timer: &mut T) -> Self {
        Self {
            previous: timer.now(),
            wrapped: false,
        }
    }

    fn observe(&mut self, now: u32) -> u32 {
        if now < self.previous {
            self.wrapped = true;
        }
        self.previous = now;
        now
    }

    fn poll<T: HardwareTimer>(&mut self, timer: &mut T) {
        let now = timer.now();
        self.observe(now);
    }
}

/// Edge detector and interval meter for the trigger input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TriggerCapture {
    policy: EdgePolicy,
}

impl TriggerCapture {
    #[must_use]
    pub const fn new(policy: EdgePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> EdgePolicy {
        self.policy
    }

    /// Blocks until the next measurement completes.
    ///
    /// # Errors
    ///
    /// Returns [`SensorFault::TimerWrapped`] when the counter was seen moving
    /// backwards during the measurement and [`SensorFault::ZeroInterval`]
    /// when the reading is zero.
    pub fn capture<T, I>(&self, timer: &mut T, input: &mut I) -> Result<Interval, SensorFault>
    where
        T: HardwareTimer,
        I: TriggerInput,
    {
        let (ticks, wrapped) = match self.policy {
            EdgePolicy::RisingToRising => {
                let mut watch = WrapWatch::start(timer);
                // A pulse still high from the previous cycle must not count.
                wait_for(timer, input, PinLevel::Low, &mut watch);
                wait_for(timer, input, PinLevel::High, &mut watch);
                let ticks = watch.observe(timer.now());
                timer.reset();
                (ticks, watch.wrapped)
            }
            EdgePolicy::PulseWidth => {
                let mut idle = WrapWatch::start(timer);
                wait_for(timer, input, PinLevel::High, &mut idle);
                timer.reset();

                let mut watch = WrapWatch::start(timer);
                wait_for(timer, input, PinLevel::Low, &mut watch);
                let ticks = watch.observe(timer.now());
                timer.reset();
                (ticks, watch.wrapped)
            }
        };

        if wrapped {
            return Err(SensorFault::TimerWrapped);
        }
        Interval::new(ticks).ok_or(SensorFault::ZeroInterval)
    }
}

fn wait_for<T, I>(timer: &mut T, input: &mut I, level: PinLevel, watch: &mut WrapWatch)
where
    T: HardwareTimer,
    I: TriggerInput,
{
    while input.level() != level {
        watch.poll(timer);
    }
}
