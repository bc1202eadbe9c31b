//! Trustworthiness gate for captured intervals.

use crate::config::Config;
use crate::hal::OverflowSignal;
use crate::trigger::Interval;

/// Why a reading was distrusted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StaleReason {
    /// The timer overflowed since the previous accepted reading.
    Overflow,
    /// The interval is longer than a running engine can produce.
    Stall,
    /// The previous cycle was suppressed by the rev limiter.
    Cutoff,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Freshness {
    Fresh,
    Stale(StaleReason),
}

impl Freshness {
    #[must_use]
    pub const fn is_fresh(self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

/// Decides whether the interval captured this cycle may drive the spark.
///
/// The overflow notification arrives through the timer's [`OverflowSignal`];
/// the rev limiter reports suppressed cycles through [`mark_cutoff`].
/// Both marks are consumed by the next [`assess`] call.
///
/// [`mark_cutoff`]: FreshnessMonitor::mark_cutoff
/// [`assess`]: FreshnessMonitor::assess
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FreshnessMonitor {
    stall_ticks: u32,
    cutoff_pending: bool,
}

impl FreshnessMonitor {
    #[must_use]
    pub const fn new(stall_ticks: u32) -> Self {
        Self {
            stall_ticks,
            cutoff_pending: false,
        }
    }

    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.stall_ticks())
    }

    /// Distrusts the next reading.
    pub fn mark_cutoff(&mut self) {
        self.cutoff_pending = true;
    }

    #[must_use]
    pub const fn cutoff_pending(&self) -> bool {
        self.cutoff_pending
    }

    /// Classifies `interval`, clearing the overflow signal and the cutoff mark.
    pub fn assess(&mut self, overflow: &OverflowSignal, interval: Interval) -> Freshness {
        let overflowed = overflow.take();
        let after_cutoff = core::mem::take(&mut self.cutoff_pending);

        if overflowed {
            Freshness::Stale(StaleReason::Overflow)
        } else if after_cutoff {
            Freshness::Stale(StaleReason::Cutoff)
        } else if interval.ticks() > self.stall_ticks {
            Freshness::Stale(StaleReason::Stall)
        } else {
            Freshness::Fresh
        }
    }

    /// Drops a pending overflow notification after a faulted capture.
    ///
    /// The cutoff mark survives so the first valid reading after a cut is
    /// still distrusted.
    pub fn discard(&mut self, overflow: &OverflowSignal) {
        if overflow.take() {
            trace!("overflow discarded with faulted capture");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(ticks: u32) -> Interval {
        Interval::new(ticks).expect("non-zero")
    }

    #[test]
    fn clean_reading_is_fresh() {
        let signal = OverflowSignal::new();
        let mut monitor = FreshnessMonitor::new(1_000_000);
        assert_eq!(monitor.assess(&signal, interval(10_000)), Freshness::Fresh);
    }

    #[test]
    fn overflow_marks_one_reading_stale() {
        let signal = OverflowSignal::new();
        let mut monitor = FreshnessMonitor::new(1_000_000);
        signal.notify();
        assert_eq!(
            monitor.assess(&signal, interval(10_000)),
            Freshness::Stale(StaleReason::Overflow)
        );
        assert!(!signal.is_raised());
        assert_eq!(monitor.assess(&signal, interval(10_000)), Freshness::Fresh);
    }

    #[test]
    fn cutoff_mark_is_consumed_once() {
        let signal = OverflowSignal::new();
        let mut monitor = FreshnessMonitor::new(1_000_000);
        monitor.mark_cutoff();
        assert_eq!(
            monitor.assess(&signal, interval(10_000)),
            Freshness::Stale(StaleReason::Cutoff)
        );
        assert!(!monitor.cutoff_pending());
        assert!(monitor.assess(&signal, interval(10_000)).is_fresh());
    }

    #[test]
    fn long_interval_means_stall() {
        let signal = OverflowSignal::new();
        let mut monitor = FreshnessMonitor::new(50_000);
        assert_eq!(monitor.assess(&signal, interval(50_000)), Freshness::Fresh);
        assert_eq!(
            monitor.assess(&signal, interval(50_001)),
            Freshness::Stale(StaleReason::Stall)
        );
    }

    #[test]
    fn overflow_and_cutoff_both_cleared() {
        let signal = OverflowSignal::new();
        let mut monitor = FreshnessMonitor::new(1_000_000);
        signal.notify();
        monitor.mark_cutoff();
        assert_eq!(
            monitor.assess(&signal, interval(10_000)),
            Freshness::Stale(StaleReason::Overflow)
        );
        assert!(monitor.assess(&signal, interval(10_000)).is_fresh());
    }

    #[test]
    fn discard_keeps_cutoff_mark() {
        let signal = OverflowSignal::new();
        let mut monitor = FreshnessMonitor::new(1_000_000);
        signal.notify();
        monitor.mark_cutoff();
        monitor.discard(&signal);
        assert!(!signal.is_raised());
        assert!(monitor.cutoff_pending());
    }
}
