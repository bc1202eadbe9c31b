//! Rev limiter state machine.
//!
//! `Normal → Cutoff` when the resolved speed exceeds the limit, and
//! `Cutoff → Normal` unconditionally once the cutoff window has been served.
//! The window itself is timed by the spark scheduler against the same
//! hardware timer used for delay and dwell.

use core::fmt;

use crate::config::Config;
use crate::rpm::Rpm;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimiterState {
    #[default]
    Normal,
    Cutoff,
}

/// Failure reported when attempting an invalid limiter transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionError {
    pub from: LimiterState,
    pub to: LimiterState,
}

impl TransitionError {
    #[must_use]
    pub const fn new(from: LimiterState, to: LimiterState) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal limiter transition {:?} -> {:?}", self.from, self.to)
    }
}

/// What the limiter allows for the current cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimiterDecision {
    Fire,
    /// Hold the ignition output released for `hold_ticks`.
    Cut { hold_ticks: u32 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevLimiter {
    limit: Rpm,
    cutoff_ticks: u32,
    state: LimiterState,
}

impl RevLimiter {
    #[must_use]
    pub const fn new(limit: Rpm, cutoff_ticks: u32) -> Self {
        Self {
            limit,
            cutoff_ticks,
            state: LimiterState::Normal,
        }
    }

    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.rev_limit(), config.cutoff_ticks())
    }

    #[must_use]
    pub const fn state(&self) -> LimiterState {
        self.state
    }

    #[must_use]
    pub const fn limit(&self) -> Rpm {
        self.limit
    }

    #[must_use]
    pub const fn cutoff_ticks(&self) -> u32 {
        self.cutoff_ticks
    }

    /// Decides whether this cycle may fire, entering `Cutoff` above the limit.
    ///
    /// # Errors
    ///
    /// Fails when called while a previous cutoff has not been released.
    pub fn evaluate(&mut self, speed: Rpm) -> Result<LimiterDecision, TransitionError> {
        if speed <= self.limit {
            return match self.state {
                LimiterState::Normal => Ok(LimiterDecision::Fire),
                LimiterState::Cutoff => {
                    Err(TransitionError::new(LimiterState::Cutoff, LimiterState::Cutoff))
                }
            };
        }

        self.transition(LimiterState::Cutoff)?;
        debug!("rev limit exceeded: {=u16} > {=u16}", speed.get(), self.limit.get());
        Ok(LimiterDecision::Cut {
            hold_ticks: self.cutoff_ticks,
        })
    }

    /// Returns to `Normal` after the cutoff window elapsed.
    ///
    /// # Errors
    ///
    /// Fails when the limiter is not in `Cutoff`.
    pub fn release(&mut self) -> Result<(), TransitionError> {
        self.transition(LimiterState::Normal)
    }

    fn transition(&mut self, next: LimiterState) -> Result<(), TransitionError> {
        match (self.state, next) {
            (LimiterState::Normal, LimiterState::Cutoff)
            | (LimiterState::Cutoff, LimiterState::Normal) => {
                self.state = next;
                Ok(())
            }
            (from, to) => Err(TransitionError::new(from, to)),
        }
    }
}
