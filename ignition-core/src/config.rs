//! Startup configuration for the ignition controller.
//!
//! A [`Config`] is assembled once, validated, and never mutated afterwards.
//! [`Config::default`] carries the reference calibration: a 27° trigger coil,
//! 17-point advance curve (10° flat to 1000 rpm, then linear up to 27° at
//! 4000 rpm), a 10 500 rpm rev limiter and a 20 ms ignition cut.

use core::fmt;

use crate::advance::{AdvanceCurve, AdvanceTable, Angle, MAX_CURVE_POINTS};
use crate::rpm::Rpm;

/// Speed spacing of the reference curve breakpoints.
pub const DEFAULT_CURVE_STEP: u16 = 250;

/// Reference advance curve, one entry per [`DEFAULT_CURVE_STEP`] rpm.
pub const DEFAULT_CURVE: [Angle; 17] = [
    Angle::tenths(100), // 0 rpm
    Angle::tenths(100), // 250
    Angle::tenths(100), // 500
    Angle::tenths(100), // 750
    Angle::tenths(100), // 1000
    Angle::tenths(114), // 1250
    Angle::tenths(128), // 1500
    Angle::tenths(142), // 1750
    Angle::tenths(156), // 2000
    Angle::tenths(170), // 2250
    Angle::tenths(185), // 2500
    Angle::tenths(199), // 2750
    Angle::tenths(213), // 3000
    Angle::tenths(227), // 3250
    Angle::tenths(241), // 3500
    Angle::tenths(255), // 3750
    Angle::tenths(270), // 4000, flat beyond
];

const _: () = {
    assert!(DEFAULT_CURVE_STEP > 0);
    assert!(DEFAULT_CURVE.len() <= MAX_CURVE_POINTS);
    let mut index = 1;
    while index < DEFAULT_CURVE.len() {
        assert!(DEFAULT_CURVE[index].as_tenths() >= DEFAULT_CURVE[index - 1].as_tenths());
        index += 1;
    }
};

pub const DEFAULT_TICK_MICROS: u32 = 1;
pub const DEFAULT_TRIGGER_COIL_ANGLE: u16 = 27;
pub const DEFAULT_REV_LIMIT: Rpm = Rpm(10_500);
/// Ignition cut window in ticks (20 ms at 1 µs per tick).
pub const DEFAULT_CUTOFF_TICKS: u32 = 20_000;
/// Coil on-time in ticks.
pub const DEFAULT_DWELL_TICKS: u32 = 25;
/// Intervals longer than this (one second at 1 µs per tick) mean the engine stalled.
pub const DEFAULT_STALL_TICKS: u32 = 1_000_000;
/// Low-advance fallback used for implausible or untrusted readings.
pub const DEFAULT_SAFE_INDEX: u16 = 9;
/// Status indicator toggles once per this many cycles.
pub const DEFAULT_LED_DIVIDER: u8 = 1;

/// Implausibility threshold as a multiple (in tenths) of the last table index.
const IMPLAUSIBLE_FACTOR_TENTHS: u32 = 27;

/// How the captured interval relates to crank rotation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpeedFormula {
    /// The trigger fires once per revolution; the interval is a full turn.
    PerRevolution,
    /// The interval spans only the trigger coil angle.
    PerTriggerAngle,
}

/// Which trigger pin transitions delimit a measurement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgePolicy {
    /// Interval between the rising edges of successive pulses.
    RisingToRising,
    /// Width of a single active-high pulse.
    PulseWidth,
}

/// Reasons a configuration is rejected at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    EmptyCurve,
    CurveTooLong,
    ZeroStep,
    NonMonotonicCurve { index: usize },
    SafeIndexOutOfRange,
    ImplausibleBelowTable,
    ZeroTriggerAngle,
    ZeroTickRate,
    ZeroDwell,
    /// A pulse width only spans the coil angle, never a full revolution.
    PulseWidthPerRevolution,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyCurve => f.write_str("advance curve has no points"),
            ConfigError::CurveTooLong => f.write_str("advance curve exceeds capacity"),
            ConfigError::ZeroStep => f.write_str("curve step must be non-zero"),
            ConfigError::NonMonotonicCurve { index } => {
                write!(f, "advance decreases at curve index {index}")
            }
            ConfigError::SafeIndexOutOfRange => f.write_str("safe index lies outside the curve"),
            ConfigError::ImplausibleBelowTable => {
                f.write_str("implausibility threshold is below the last curve index")
            }
            ConfigError::ZeroTriggerAngle => f.write_str("trigger coil angle must be non-zero"),
            ConfigError::ZeroTickRate => f.write_str("timer tick length must be non-zero"),
            ConfigError::ZeroDwell => f.write_str("dwell must be non-zero"),
            ConfigError::PulseWidthPerRevolution => {
                f.write_str("pulse-width capture needs the per-trigger-angle speed formula")
            }
        }
    }
}

/// Validated controller configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    tick_micros: u32,
    trigger_coil_angle: u16,
    speed_formula: SpeedFormula,
    edge_policy: EdgePolicy,
    rev_limit: Rpm,
    cutoff_ticks: u32,
    dwell_ticks: u32,
    stall_ticks: u32,
    led_divider: u8,
    table: AdvanceTable,
}

impl Config {
    /// Starts a builder seeded with the reference calibration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn tick_micros(&self) -> u32 {
        self.tick_micros
    }

    #[must_use]
    pub const fn trigger_coil_angle(&self) -> u16 {
        self.trigger_coil_angle
    }

    #[must_use]
    pub const fn speed_formula(&self) -> SpeedFormula {
        self.speed_formula
    }

    #[must_use]
    pub const fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    #[must_use]
    pub const fn rev_limit(&self) -> Rpm {
        self.rev_limit
    }

    #[must_use]
    pub const fn cutoff_ticks(&self) -> u32 {
        self.cutoff_ticks
    }

    #[must_use]
    pub const fn dwell_ticks(&self) -> u32 {
        self.dwell_ticks
    }

    #[must_use]
    pub const fn stall_ticks(&self) -> u32 {
        self.stall_ticks
    }

    /// Cycles per status-indicator toggle; zero disables the indicator.
    #[must_use]
    pub const fn led_divider(&self) -> u8 {
        self.led_divider
    }

    #[must_use]
    pub const fn table(&self) -> &AdvanceTable {
        &self.table
    }

    #[must_use]
    pub const fn curve(&self) -> &AdvanceCurve {
        self.table.curve()
    }
}

impl Default for Config {
    fn default() -> Self {
        let curve = AdvanceCurve::from_checked(DEFAULT_CURVE_STEP, &DEFAULT_CURVE);
        let implausible = derived_implausible_index(&curve);
        Self {
            tick_micros: DEFAULT_TICK_MICROS,
            trigger_coil_angle: DEFAULT_TRIGGER_COIL_ANGLE,
            speed_formula: SpeedFormula::PerRevolution,
            edge_policy: EdgePolicy::RisingToRising,
            rev_limit: DEFAULT_REV_LIMIT,
            cutoff_ticks: DEFAULT_CUTOFF_TICKS,
            dwell_ticks: DEFAULT_DWELL_TICKS,
            stall_ticks: DEFAULT_STALL_TICKS,
            led_divider: DEFAULT_LED_DIVIDER,
            table: AdvanceTable::new(curve, DEFAULT_SAFE_INDEX, implausible),
        }
    }
}

/// Threshold beyond which a table index is considered a sensor fault.
///
/// Roughly 2.7 times the last valid index, e.g. 43 for a 17-point curve.
#[must_use]
pub fn derived_implausible_index(curve: &AdvanceCurve) -> u16 {
    let scaled = u32::from(curve.last_index()) * IMPLAUSIBLE_FACTOR_TENTHS / 10;
    u16::try_from(scaled).unwrap_or(u16::MAX)
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    tick_micros: u32,
    trigger_coil_angle: u16,
    speed_formula: SpeedFormula,
    edge_policy: EdgePolicy,
    rev_limit: Rpm,
    cutoff_ticks: u32,
    dwell_ticks: u32,
    stall_ticks: u32,
    led_divider: u8,
    curve_step: u16,
    curve: Option<&'static [Angle]>,
    safe_index: u16,
    implausible_index: Option<u16>,
}

impl ConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_micros: DEFAULT_TICK_MICROS,
            trigger_coil_angle: DEFAULT_TRIGGER_COIL_ANGLE,
            speed_formula: SpeedFormula::PerRevolution,
            edge_policy: EdgePolicy::RisingToRising,
            rev_limit: DEFAULT_REV_LIMIT,
            cutoff_ticks: DEFAULT_CUTOFF_TICKS,
            dwell_ticks: DEFAULT_DWELL_TICKS,
            stall_ticks: DEFAULT_STALL_TICKS,
            led_divider: DEFAULT_LED_DIVIDER,
            curve_step: DEFAULT_CURVE_STEP,
            curve: None,
            safe_index: DEFAULT_SAFE_INDEX,
            implausible_index: None,
        }
    }

    #[must_use]
    pub const fn tick_micros(mut self, tick_micros: u32) -> Self {
        self.tick_micros = tick_micros;
        self
    }

    #[must_use]
    pub const fn trigger_coil_angle(mut self, degrees: u16) -> Self {
        self.trigger_coil_angle = degrees;
        self
    }

    #[must_use]
    pub const fn speed_formula(mut self, formula: SpeedFormula) -> Self {
        self.speed_formula = formula;
        self
    }

    #[must_use]
    pub const fn edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.edge_policy = policy;
        self
    }

    #[must_use]
    pub const fn rev_limit(mut self, limit: Rpm) -> Self {
        self.rev_limit = limit;
        self
    }

    #[must_use]
    pub const fn cutoff_ticks(mut self, ticks: u32) -> Self {
        self.cutoff_ticks = ticks;
        self
    }

    #[must_use]
    pub const fn dwell_ticks(mut self, ticks: u32) -> Self {
        self.dwell_ticks = ticks;
        self
    }

    #[must_use]
    pub const fn stall_ticks(mut self, ticks: u32) -> Self {
        self.stall_ticks = ticks;
        self
    }

    #[must_use]
    pub const fn led_divider(mut self, cycles: u8) -> Self {
        self.led_divider = cycles;
        self
    }

    /// Replaces the advance curve and its breakpoint spacing.
    #[must_use]
    pub const fn curve(mut self, step: u16, points: &'static [Angle]) -> Self {
        self.curve_step = step;
        self.curve = Some(points);
        self
    }

    #[must_use]
    pub const fn safe_index(mut self, index: u16) -> Self {
        self.safe_index = index;
        self
    }

    /// Overrides the derived implausibility threshold.
    #[must_use]
    pub const fn implausible_index(mut self, index: u16) -> Self {
        self.implausible_index = Some(index);
        self
    }

    /// Validates the collected settings.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.tick_micros == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.trigger_coil_angle == 0 {
            return Err(ConfigError::ZeroTriggerAngle);
        }
        if self.dwell_ticks == 0 {
            return Err(ConfigError::ZeroDwell);
        }
        if matches!(
            (self.edge_policy, self.speed_formula),
            (EdgePolicy::PulseWidth, SpeedFormula::PerRevolution)
        ) {
            return Err(ConfigError::PulseWidthPerRevolution);
        }

        let points = self.curve.unwrap_or(&DEFAULT_CURVE);
        let curve = AdvanceCurve::new(self.curve_step, points)?;
        if self.safe_index > curve.last_index() {
            return Err(ConfigError::SafeIndexOutOfRange);
        }
        let implausible = self
            .implausible_index
            .unwrap_or_else(|| derived_implausible_index(&curve));
        if implausible < curve.last_index() {
            return Err(ConfigError::ImplausibleBelowTable);
        }

        Ok(Config {
            tick_micros: self.tick_micros,
            trigger_coil_angle: self.trigger_coil_angle,
            speed_formula: self.speed_formula,
            edge_policy: self.edge_policy,
            rev_limit: self.rev_limit,
            cutoff_ticks: self.cutoff_ticks,
            dwell_ticks: self.dwell_ticks,
            stall_ticks: self.stall_ticks,
            led_divider: self.led_divider,
            table: AdvanceTable::new(curve, self.safe_index, implausible),
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
