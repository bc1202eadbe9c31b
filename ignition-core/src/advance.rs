//! Spark advance calibration curve and table-index resolution.
//!
//! The curve maps evenly spaced engine-speed breakpoints to an advance angle.
//! Resolving a speed into a table index sorts it into one of three classes:
//! trusted, clamped to the flat maximum-advance region, or forced to the
//! configured safe (low advance) index because the speed is implausible.

use core::fmt;

use heapless::Vec;

use crate::config::ConfigError;
use crate::rpm::Rpm;

/// Largest curve the controller accepts.
pub const MAX_CURVE_POINTS: usize = 32;

/// Crank angle in tenths of a degree.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Angle(pub u16);

impl Angle {
    pub const ZERO: Angle = Angle(0);

    /// Whole degrees.
    #[must_use]
    pub const fn degrees(degrees: u16) -> Self {
        Angle(degrees * 10)
    }

    /// Tenths of a degree.
    #[must_use]
    pub const fn tenths(tenths: u16) -> Self {
        Angle(tenths)
    }

    #[must_use]
    pub const fn as_tenths(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn saturating_sub(self, other: Angle) -> Angle {
        Angle(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}°", self.0 / 10, self.0 % 10)
    }
}

/// Advance angle for each breakpoint, starting at 0 rpm and spaced by `step`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvanceCurve {
    step: u16,
    points: Vec<Angle, MAX_CURVE_POINTS>,
}

impl AdvanceCurve {
    /// Builds a curve, checking the breakpoint invariants.
    ///
    /// # Errors
    ///
    /// Rejects an empty or oversized curve, a zero step and any angle that is
    /// lower than its predecessor.
    pub fn new(step: u16, points: &[Angle]) -> Result<Self, ConfigError> {
        if step == 0 {
            return Err(ConfigError::ZeroStep);
        }
        if points.is_empty() {
            return Err(ConfigError::EmptyCurve);
        }
        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[1] < pair[0])
            .map(|position| position + 1)
        {
            return Err(ConfigError::NonMonotonicCurve { index });
        }
        let points = Vec::from_slice(points).map_err(|_| ConfigError::CurveTooLong)?;
        Ok(Self { step, points })
    }

    /// Builds a curve from points whose invariants were checked at compile
    /// time. Points beyond [`MAX_CURVE_POINTS`] are dropped.
    pub(crate) fn from_checked(step: u16, points: &[Angle]) -> Self {
        let mut curve = Vec::new();
        curve.extend(points.iter().copied().take(MAX_CURVE_POINTS));
        Self {
            step,
            points: curve,
        }
    }

    /// Speed spacing between breakpoints.
    #[must_use]
    pub const fn step(&self) -> u16 {
        self.step
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Highest valid table index.
    #[must_use]
    pub fn last_index(&self) -> u16 {
        u16::try_from(self.points.len().saturating_sub(1)).unwrap_or(u16::MAX)
    }

    /// Advance angle at `index`, saturating at the last breakpoint.
    #[must_use]
    pub fn angle_at(&self, index: u16) -> Angle {
        let index = usize::from(index).min(self.points.len().saturating_sub(1));
        self.points.get(index).copied().unwrap_or(Angle::ZERO)
    }

    /// Engine speed the breakpoint at `index` is calibrated for.
    #[must_use]
    pub fn breakpoint(&self, index: u16) -> Rpm {
        Rpm(index.saturating_mul(self.step))
    }

    /// Advance angle of the flat region beyond the last breakpoint.
    #[must_use]
    pub fn max_advance(&self) -> Angle {
        self.angle_at(self.last_index())
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Angle> {
        self.points.iter()
    }
}

/// How a computed table index was treated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndexClass {
    /// Index fell inside the table.
    Trusted,
    /// Index was past the table but plausible; clamped to the last entry.
    ClampedToMax,
    /// Index was implausibly high; replaced with the safe index.
    ForcedSafe,
}

/// Outcome of resolving a speed into a table position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resolution {
    /// `round(speed / step)` before any clamping.
    pub raw: u16,
    /// Index actually used to read the curve.
    pub index: u16,
    pub class: IndexClass,
    /// Advance angle read at `index`.
    pub advance: Angle,
}

/// Resolves engine speed into a curve index and advance angle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvanceTable {
    curve: AdvanceCurve,
    safe_index: u16,
    implausible_index: u16,
}

impl AdvanceTable {
    #[must_use]
    pub const fn new(curve: AdvanceCurve, safe_index: u16, implausible_index: u16) -> Self {
        Self {
            curve,
            safe_index,
            implausible_index,
        }
    }

    #[must_use]
    pub const fn curve(&self) -> &AdvanceCurve {
        &self.curve
    }

    #[must_use]
    pub const fn safe_index(&self) -> u16 {
        self.safe_index
    }

    #[must_use]
    pub const fn implausible_index(&self) -> u16 {
        self.implausible_index
    }

    /// `round(speed / step)`, rounding halves away from zero.
    #[must_use]
    pub fn raw_index(&self, speed: Rpm) -> u16 {
        let step = u32::from(self.curve.step());
        let rounded = (u32::from(speed.get()) + step / 2) / step;
        u16::try_from(rounded).unwrap_or(u16::MAX)
    }

    /// Classifies `speed` and reads the advance angle for it.
    ///
    /// Beyond `implausible_index` the reading is treated as a sensor fault
    /// and the safe index wins regardless of the raw value; between the last
    /// table index and that threshold the index is clamped to the last entry.
    #[must_use]
    pub fn resolve(&self, speed: Rpm) -> Resolution {
        let raw = self.raw_index(speed);
        let last = self.curve.last_index();

        let (index, class) = if raw > self.implausible_index {
            (self.safe_index, IndexClass::ForcedSafe)
        } else if raw > last {
            (last, IndexClass::ClampedToMax)
        } else {
            (raw, IndexClass::Trusted)
        };

        Resolution {
            raw,
            index,
            class,
            advance: self.curve.angle_at(index),
        }
    }

    /// Resolution used when a reading cannot be trusted at all.
    #[must_use]
    pub fn safe_resolution(&self) -> Resolution {
        Resolution {
            raw: self.safe_index,
            index: self.safe_index,
            class: IndexClass::ForcedSafe,
            advance: self.curve.angle_at(self.safe_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CURVE;

    fn default_table() -> AdvanceTable {
        let curve = AdvanceCurve::new(250, &DEFAULT_CURVE).expect("default curve is valid");
        AdvanceTable::new(curve, 9, 43)
    }

    #[test]
    fn curve_rejects_decreasing_angles() {
        let points = [Angle::degrees(10), Angle::degrees(12), Angle::degrees(11)];
        assert_eq!(
            AdvanceCurve::new(250, &points),
            Err(ConfigError::NonMonotonicCurve { index: 2 })
        );
    }

    #[test]
    fn curve_rejects_degenerate_shapes() {
        assert_eq!(AdvanceCurve::new(250, &[]), Err(ConfigError::EmptyCurve));
        assert_eq!(
            AdvanceCurve::new(0, &[Angle::degrees(10)]),
            Err(ConfigError::ZeroStep)
        );
        let long = [Angle::degrees(10); MAX_CURVE_POINTS + 1];
        assert_eq!(AdvanceCurve::new(250, &long), Err(ConfigError::CurveTooLong));
    }

    #[test]
    fn breakpoints_are_evenly_spaced() {
        let table = default_table();
        assert_eq!(table.curve().breakpoint(0), Rpm(0));
        assert_eq!(table.curve().breakpoint(4), Rpm(1_000));
        assert_eq!(table.curve().breakpoint(16), Rpm(4_000));
        assert_eq!(table.curve().max_advance(), Angle::degrees(27));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        let table = default_table();
        assert_eq!(table.raw_index(Rpm(124)), 0);
        assert_eq!(table.raw_index(Rpm(125)), 1);
        assert_eq!(table.raw_index(Rpm(374)), 1);
        assert_eq!(table.raw_index(Rpm(375)), 2);
    }

    #[test]
    fn trusted_index_reads_curve() {
        let resolution = default_table().resolve(Rpm(2_000));
        assert_eq!(resolution.class, IndexClass::Trusted);
        assert_eq!(resolution.index, 8);
        assert_eq!(resolution.advance, Angle::tenths(156));
    }

    #[test]
    fn plausible_overspeed_clamps_to_last_entry() {
        let resolution = default_table().resolve(Rpm(6_000));
        assert_eq!(resolution.raw, 24);
        assert_eq!(resolution.index, 16);
        assert_eq!(resolution.class, IndexClass::ClampedToMax);
        assert_eq!(resolution.advance, Angle::degrees(27));
    }

    #[test]
    fn threshold_itself_is_still_clamped() {
        let table = default_table();
        // 43 × 250 = 10 750 rpm sits exactly on the threshold.
        let resolution = table.resolve(Rpm(10_750));
        assert_eq!(resolution.raw, 43);
        assert_eq!(resolution.class, IndexClass::ClampedToMax);
        assert_eq!(resolution.index, 16);
    }

    #[test]
    fn implausible_speed_forces_safe_index() {
        let table = default_table();
        let resolution = table.resolve(Rpm(11_000));
        assert_eq!(resolution.raw, 44);
        assert_eq!(resolution.class, IndexClass::ForcedSafe);
        assert_eq!(resolution.index, 9);
        assert_eq!(resolution.advance, Angle::tenths(170));

        let extreme = table.resolve(Rpm(u16::MAX));
        assert_eq!(extreme.index, 9);
    }

    #[test]
    fn resolved_index_stays_in_table() {
        let table = default_table();
        let last = table.curve().last_index();
        let mut previous_raw = 0;
        for speed in (0..=u16::MAX).step_by(37) {
            let resolution = table.resolve(Rpm(speed));
            assert!(resolution.index <= last);
            assert!(resolution.raw >= previous_raw);
            previous_raw = resolution.raw;
        }
    }
}
