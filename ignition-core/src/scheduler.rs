//! Spark timing and ignition output control.
//!
//! All timing is relative to the reference edge at which the capture reset
//! the hardware timer. Delay, dwell and cutoff windows run strictly one
//! after another; nothing here returns while the coil is still energised.

use crate::advance::Angle;
use crate::config::Config;
use crate::hal::{DigitalOutput, HardwareTimer, OutputLevel, wait_until};
use crate::limiter::LimiterDecision;

/// Tenths of a degree in a full revolution.
const REVOLUTION_TENTHS: u64 = 3_600;

/// Timing of one planned spark, in ticks after the reference edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SparkPlan {
    /// Crank angle between the reference edge and the spark.
    pub angle_to_fire: Angle,
    /// Ticks from the reference edge to coil on.
    pub delay: u32,
    /// Ticks from the reference edge to coil off.
    pub dwell_end: u32,
}

/// What happened on the ignition output during one cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SparkOutcome {
    Fired { asserted_at: u32, released_at: u32 },
    /// Output held released by the rev limiter for `held_ticks`.
    Cut { held_ticks: u64 },
    /// The timer wrapped before the spark was due; nothing fired.
    Aborted,
}

/// Toggles the status indicator once every `every` cycles.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LedDivider {
    every: u8,
    count: u8,
}

impl LedDivider {
    /// A divider of zero never toggles.
    #[must_use]
    pub const fn new(every: u8) -> Self {
        Self { every, count: 0 }
    }

    #[must_use]
    pub const fn count(&self) -> u8 {
        self.count
    }

    /// Counts one cycle; returns `true` when the indicator should toggle.
    pub fn tick(&mut self) -> bool {
        if self.every == 0 {
            return false;
        }
        self.count += 1;
        if self.count >= self.every {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SparkScheduler {
    trigger_coil_angle: Angle,
    dwell_ticks: u32,
}

impl SparkScheduler {
    #[must_use]
    pub const fn new(trigger_coil_angle: u16, dwell_ticks: u32) -> Self {
        Self {
            trigger_coil_angle: Angle::degrees(trigger_coil_angle),
            dwell_ticks,
        }
    }

    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.trigger_coil_angle(), config.dwell_ticks())
    }

    /// Plans the spark for one revolution lasting `revolution_ticks`.
    ///
    /// An advance beyond the trigger coil angle fires at the edge.
    #[must_use]
    pub fn plan(&self, revolution_ticks: u64, advance: Angle) -> SparkPlan {
        let angle_to_fire = self.trigger_coil_angle.saturating_sub(advance);
        let delay = revolution_ticks * u64::from(angle_to_fire.as_tenths()) / REVOLUTION_TENTHS;
        let delay = u32::try_from(delay).unwrap_or(u32::MAX);
        SparkPlan {
            angle_to_fire,
            delay,
            dwell_end: delay.saturating_add(self.dwell_ticks),
        }
    }

    /// Drives the ignition output for one cycle.
    ///
    /// The divider counts every cycle that gets here, fired or cut. Firing
    /// waits out the delay, then holds the coil for the full dwell counted
    /// from a timer read taken after the output was asserted. A cut releases
    /// the output immediately and keeps it released for the full hold.
    pub fn execute<T, O, L>(
        &self,
        timer: &mut T,
        ignition: &mut O,
        indicator: &mut L,
        divider: &mut LedDivider,
        plan: &SparkPlan,
        decision: LimiterDecision,
    ) -> SparkOutcome
    where
        T: HardwareTimer,
        O: DigitalOutput,
        L: DigitalOutput,
    {
        if divider.tick() {
            indicator.toggle();
        }

        if let LimiterDecision::Cut { hold_ticks } = decision {
            ignition.set(OutputLevel::Released);
            let held_ticks = hold_released(timer, hold_ticks);
            return SparkOutcome::Cut { held_ticks };
        }

        let reached = wait_until(timer, plan.delay);
        if reached < plan.delay {
            warn!("timer wrapped before spark at {=u32}", plan.delay);
            return SparkOutcome::Aborted;
        }

        ignition.set(OutputLevel::Asserted);
        let asserted_at = timer.now();
        let dwell = plan.dwell_end - plan.delay;
        let released_at = wait_until(timer, asserted_at.saturating_add(dwell));
        ignition.set(OutputLevel::Released);

        SparkOutcome::Fired {
            asserted_at,
            released_at,
        }
    }
}

/// Spins for at least `ticks`, counting across counter wraps.
///
/// After a wrap only the ticks since zero are counted, so the hold can only
/// run long, never short.
fn hold_released<T: HardwareTimer>(timer: &mut T, ticks: u32) -> u64 {
    let target = u64::from(ticks);
    let mut previous = timer.now();
    let mut elapsed = 0u64;
    while elapsed < target {
        let now = timer.now();
        elapsed += u64::from(if now >= previous { now - previous } else { now });
        previous = now;
    }
    elapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::OverflowSignal;

    struct StepTimer {
        ticks: u32,
        step: u32,
        wrap_at: u32,
        signal: OverflowSignal,
    }

    impl StepTimer {
        fn new(step: u32, wrap_at: u32) -> Self {
            Self {
                ticks: 0,
                step,
                wrap_at,
                signal: OverflowSignal::new(),
            }
        }
    }

    impl HardwareTimer for StepTimer {
        fn now(&mut self) -> u32 {
            self.ticks += self.step;
            if self.ticks >= self.wrap_at {
                self.ticks -= self.wrap_at;
                self.signal.notify();
            }
            self.ticks
        }

        fn reset(&mut self) {
            self.ticks = 0;
        }

        fn overflow(&self) -> &OverflowSignal {
            &self.signal
        }
    }

    #[derive(Default)]
    struct Pin {
        level: Option<OutputLevel>,
        transitions: u32,
    }

    impl DigitalOutput for Pin {
        fn set(&mut self, level: OutputLevel) {
            if self.level != Some(level) {
                self.transitions += 1;
            }
            self.level = Some(level);
        }

        fn level(&self) -> OutputLevel {
            self.level.unwrap_or(OutputLevel::Released)
        }
    }

    #[test]
    fn delay_scales_with_angle_to_fire() {
        let scheduler = SparkScheduler::new(27, 25);
        // 27° - 17° = 10° of a 10 000 tick revolution.
        let plan = scheduler.plan(10_000, Angle::degrees(17));
        assert_eq!(plan.angle_to_fire, Angle::degrees(10));
        assert_eq!(plan.delay, 277);
        assert_eq!(plan.dwell_end, 302);

        let plan = scheduler.plan(10_000, Angle::tenths(156));
        assert_eq!(plan.delay, 316);
    }

    #[test]
    fn advance_beyond_trigger_fires_at_edge() {
        let scheduler = SparkScheduler::new(27, 25);
        let plan = scheduler.plan(10_000, Angle::degrees(30));
        assert_eq!(plan.angle_to_fire, Angle::ZERO);
        assert_eq!(plan.delay, 0);
        assert_eq!(plan.dwell_end, 25);
    }

    #[test]
    fn fire_asserts_for_dwell_window() {
        let scheduler = SparkScheduler::new(27, 25);
        let plan = scheduler.plan(10_000, Angle::degrees(17));
        let mut timer = StepTimer::new(1, u32::MAX);
        let mut coil = Pin::default();
        let mut led = Pin::default();
        let mut divider = LedDivider::new(1);

        let outcome = scheduler.execute(
            &mut timer,
            &mut coil,
            &mut led,
            &mut divider,
            &plan,
            LimiterDecision::Fire,
        );

        assert_eq!(
            outcome,
            SparkOutcome::Fired {
                asserted_at: 278,
                released_at: 303
            }
        );
        assert_eq!(coil.level(), OutputLevel::Released);
        assert_eq!(coil.transitions, 2);
        assert_eq!(led.level(), OutputLevel::Asserted);
    }

    #[test]
    fn cut_holds_output_released() {
        let scheduler = SparkScheduler::new(27, 25);
        let plan = scheduler.plan(5_000, Angle::degrees(27));
        let mut timer = StepTimer::new(3, u32::MAX);
        let mut coil = Pin::default();
        let mut led = Pin::default();
        let mut divider = LedDivider::new(1);

        let outcome = scheduler.execute(
            &mut timer,
            &mut coil,
            &mut led,
            &mut divider,
            &plan,
            LimiterDecision::Cut { hold_ticks: 20_000 },
        );

        let SparkOutcome::Cut { held_ticks } = outcome else {
            panic!("expected a cut, got {outcome:?}");
        };
        assert!(held_ticks >= 20_000);
        assert_eq!(coil.level(), OutputLevel::Released);
        assert_eq!(coil.transitions, 1);
        assert_eq!(led.transitions, 1);
        assert_eq!(divider.count(), 0);
    }

    #[test]
    fn dwell_starts_after_assert() {
        let scheduler = SparkScheduler::new(27, 25);
        let plan = scheduler.plan(10_000, Angle::degrees(17));
        let mut timer = StepTimer::new(4, u32::MAX);
        let mut coil = Pin::default();
        let mut led = Pin::default();
        let mut divider = LedDivider::new(1);

        let outcome = scheduler.execute(
            &mut timer,
            &mut coil,
            &mut led,
            &mut divider,
            &plan,
            LimiterDecision::Fire,
        );

        let SparkOutcome::Fired {
            asserted_at,
            released_at,
        } = outcome
        else {
            panic!("expected a spark, got {outcome:?}");
        };
        assert!(asserted_at > plan.delay);
        assert!(released_at - asserted_at >= 25);
    }

    #[test]
    fn cut_hold_counts_across_wraps() {
        let mut timer = StepTimer::new(7, 1_000);
        let held = hold_released(&mut timer, 5_000);
        assert!(held >= 5_000);
        assert!(timer.signal.is_raised());
    }

    #[test]
    fn wrap_before_spark_aborts() {
        let scheduler = SparkScheduler::new(27, 25);
        let plan = scheduler.plan(10_000, Angle::degrees(10));
        let mut timer = StepTimer::new(50, 200);
        let mut coil = Pin::default();
        let mut led = Pin::default();
        let mut divider = LedDivider::new(1);

        let outcome = scheduler.execute(
            &mut timer,
            &mut coil,
            &mut led,
            &mut divider,
            &plan,
            LimiterDecision::Fire,
        );
        assert_eq!(outcome, SparkOutcome::Aborted);
        assert_eq!(coil.transitions, 0);
    }

    #[test]
    fn divider_toggles_every_n_cycles() {
        let mut divider = LedDivider::new(3);
        let toggles: [bool; 6] = core::array::from_fn(|_| divider.tick());
        assert_eq!(toggles, [false, false, true, false, false, true]);

        let mut disabled = LedDivider::new(0);
        assert!(!(0..10).any(|_| disabled.tick()));
    }
}
