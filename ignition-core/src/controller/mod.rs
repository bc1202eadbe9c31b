//! The ignition control loop.
//!
//! Every iteration runs capture, freshness gate, speed estimate, advance
//! lookup, limiter and spark output in that order, then hands one
//! [`CycleRecord`] to the telemetry sink. No iteration ever fails: faults and
//! stale readings degrade to "do not fire" and the loop carries on.

mod state;

pub use state::{ControllerMode, ControllerState};

use crate::advance::{AdvanceTable, Resolution};
use crate::config::Config;
use crate::freshness::{Freshness, FreshnessMonitor, StaleReason};
use crate::hal::{DigitalOutput, HardwareTimer, OutputLevel, TriggerInput};
use crate::limiter::{LimiterDecision, RevLimiter};
use crate::rpm::{Rpm, RpmEstimator};
use crate::scheduler::{SparkOutcome, SparkPlan, SparkScheduler};
use crate::telemetry::{CycleRecord, TelemetrySink};
use crate::trigger::{Interval, SensorFault, TriggerCapture};

/// Values derived during one iteration. Never kept past it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EngineCycle {
    pub interval: Interval,
    pub speed: Rpm,
    pub resolution: Resolution,
    /// `None` when the cycle was skipped before planning.
    pub plan: Option<SparkPlan>,
}

/// How an iteration ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    Fault(SensorFault),
    Skipped(StaleReason),
    Spark(SparkOutcome),
}

impl CycleOutcome {
    #[must_use]
    pub const fn fired(&self) -> bool {
        matches!(self, CycleOutcome::Spark(SparkOutcome::Fired { .. }))
    }
}

/// Result of [`IgnitionController::run_cycle`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub struct CycleReport {
    /// `None` for faulted captures.
    pub cycle: Option<EngineCycle>,
    pub outcome: CycleOutcome,
    pub record: CycleRecord,
}

/// Owns the hardware handles and every stage of the control loop.
pub struct IgnitionController<T, I, O, L> {
    timer: T,
    trigger: I,
    ignition: O,
    indicator: L,
    capture: TriggerCapture,
    freshness: FreshnessMonitor,
    estimator: RpmEstimator,
    table: AdvanceTable,
    scheduler: SparkScheduler,
    limiter: RevLimiter,
    state: ControllerState,
}

impl<T, I, O, L> IgnitionController<T, I, O, L>
where
    T: HardwareTimer,
    I: TriggerInput,
    O: DigitalOutput,
    L: DigitalOutput,
{
    /// Wires the loop to its hardware and releases the ignition output.
    pub fn new(config: &Config, timer: T, trigger: I, mut ignition: O, indicator: L) -> Self {
        ignition.set(OutputLevel::Released);
        Self {
            timer,
            trigger,
            ignition,
            indicator,
            capture: TriggerCapture::new(config.edge_policy()),
            freshness: FreshnessMonitor::from_config(config),
            estimator: RpmEstimator::from_config(config),
            table: config.table().clone(),
            scheduler: SparkScheduler::from_config(config),
            limiter: RevLimiter::from_config(config),
            state: ControllerState::new(config.led_divider()),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    #[must_use]
    pub const fn limiter(&self) -> &RevLimiter {
        &self.limiter
    }

    #[must_use]
    pub const fn freshness(&self) -> &FreshnessMonitor {
        &self.freshness
    }

    #[must_use]
    pub const fn ignition(&self) -> &O {
        &self.ignition
    }

    #[must_use]
    pub const fn indicator(&self) -> &L {
        &self.indicator
    }

    /// Runs one full iteration of the loop.
    pub fn run_cycle<S: TelemetrySink + ?Sized>(&mut self, sink: &mut S) -> CycleReport {
        let interval = match self.capture.capture(&mut self.timer, &mut self.trigger) {
            Ok(interval) => interval,
            Err(fault) => {
                warn!("sensor fault: {}", fault);
                self.freshness.discard(self.timer.overflow());
                let resolution = self.table.safe_resolution();
                return self.finish(
                    sink,
                    None,
                    resolution,
                    Rpm::ZERO,
                    CycleOutcome::Fault(fault),
                );
            }
        };

        let freshness = self.freshness.assess(self.timer.overflow(), interval);
        let speed = self.estimator.estimate(interval);

        if let Freshness::Stale(reason) = freshness {
            debug!("stale reading ({}), not firing", reason);
            let resolution = self.table.safe_resolution();
            let cycle = EngineCycle {
                interval,
                speed,
                resolution,
                plan: None,
            };
            return self.finish(
                sink,
                Some(cycle),
                resolution,
                speed,
                CycleOutcome::Skipped(reason),
            );
        }

        let resolution = self.table.resolve(speed);
        let plan = self.scheduler.plan(
            self.estimator.revolution_ticks(interval),
            resolution.advance,
        );
        let decision = self.limiter.evaluate(speed).unwrap_or_else(|err| {
            warn!("limiter out of sync: {}", err);
            LimiterDecision::Cut {
                hold_ticks: self.limiter.cutoff_ticks(),
            }
        });

        let spark = self.scheduler.execute(
            &mut self.timer,
            &mut self.ignition,
            &mut self.indicator,
            self.state.led_mut(),
            &plan,
            decision,
        );
        if matches!(spark, SparkOutcome::Cut { .. }) {
            if let Err(err) = self.limiter.release() {
                warn!("limiter release failed: {}", err);
            }
            self.freshness.mark_cutoff();
        }

        let cycle = EngineCycle {
            interval,
            speed,
            resolution,
            plan: Some(plan),
        };
        self.finish(sink, Some(cycle), resolution, speed, CycleOutcome::Spark(spark))
    }

    /// Runs the loop forever.
    pub fn run<S: TelemetrySink + ?Sized>(&mut self, sink: &mut S) -> ! {
        info!("ignition loop running");
        loop {
            let _ = self.run_cycle(sink);
        }
    }

    fn finish<S: TelemetrySink + ?Sized>(
        &mut self,
        sink: &mut S,
        cycle: Option<EngineCycle>,
        resolution: Resolution,
        speed: Rpm,
        outcome: CycleOutcome,
    ) -> CycleReport {
        let mode = match outcome {
            CycleOutcome::Spark(SparkOutcome::Fired { .. }) => ControllerMode::Normal,
            CycleOutcome::Spark(SparkOutcome::Cut { .. }) => ControllerMode::Cutoff,
            CycleOutcome::Spark(SparkOutcome::Aborted)
            | CycleOutcome::Skipped(_)
            | CycleOutcome::Fault(_) => ControllerMode::Stale,
        };
        self.state.enter(mode);

        let record = CycleRecord::new(resolution.index, speed, mode);
        sink.publish(record);
        CycleReport {
            cycle,
            outcome,
            record,
        }
    }
}
