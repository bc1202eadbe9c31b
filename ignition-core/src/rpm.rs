//! Engine speed estimation from a captured trigger interval.

use core::fmt;

use crate::config::{Config, SpeedFormula};
use crate::trigger::Interval;

/// Microseconds per minute; the numerator of every speed conversion.
pub const MICROS_PER_MINUTE: u64 = 60_000_000;

/// Engine speed in revolutions per minute.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rpm(pub u16);

impl Rpm {
    pub const ZERO: Rpm = Rpm(0);

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    const fn saturating_from(value: u64) -> Self {
        if value > u16::MAX as u64 {
            Rpm(u16::MAX)
        } else {
            #[allow(clippy::cast_possible_truncation)]
            Rpm(value as u16)
        }
    }
}

impl fmt::Display for Rpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}rpm", self.0)
    }
}

/// Converts trigger intervals into engine speed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RpmEstimator {
    formula: SpeedFormula,
    tick_micros: u32,
    trigger_coil_angle: u16,
}

impl RpmEstimator {
    #[must_use]
    pub const fn new(formula: SpeedFormula, tick_micros: u32, trigger_coil_angle: u16) -> Self {
        Self {
            formula,
            tick_micros,
            trigger_coil_angle,
        }
    }

    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(
            config.speed_formula(),
            config.tick_micros(),
            config.trigger_coil_angle(),
        )
    }

    /// Estimates the engine speed for one captured interval.
    ///
    /// Per revolution: `60e6 / Δµs`. Per trigger angle: the interval only
    /// covers `angle/360` of a turn, so a revolution lasts `Δµs × 360 / angle`
    /// and the speed is `60e6 × angle / (360 × Δµs)`.
    #[must_use]
    pub fn estimate(&self, interval: Interval) -> Rpm {
        let micros = u64::from(interval.ticks()) * u64::from(self.tick_micros);
        let (numerator, denominator) = match self.formula {
            SpeedFormula::PerRevolution => (MICROS_PER_MINUTE, micros),
            SpeedFormula::PerTriggerAngle => (
                MICROS_PER_MINUTE * u64::from(self.trigger_coil_angle),
                micros * 360,
            ),
        };
        if denominator == 0 {
            return Rpm(u16::MAX);
        }
        Rpm::saturating_from(numerator / denominator)
    }

    /// Ticks for one full crank revolution implied by `interval`.
    #[must_use]
    pub fn revolution_ticks(&self, interval: Interval) -> u64 {
        let ticks = u64::from(interval.ticks());
        match self.formula {
            SpeedFormula::PerRevolution => ticks,
            SpeedFormula::PerTriggerAngle => {
                ticks * 360 / u64::from(self.trigger_coil_angle.max(1))
            }
        }
    }
}
