use ignition_core::advance::{Angle, IndexClass};
use ignition_core::config::{Config, EdgePolicy, SpeedFormula};
use ignition_core::controller::{ControllerMode, CycleOutcome, IgnitionController};
use ignition_core::freshness::StaleReason;
use ignition_core::rpm::{Rpm, RpmEstimator};
use ignition_core::scheduler::SparkOutcome;
use ignition_core::sim::{Channel, SimBench, SimOutput, SimTimer, SimTrigger};
use ignition_core::telemetry::{CycleRecord, TelemetryRecorder};
use ignition_core::trigger::Interval;

fn controller<'a>(
    config: &Config,
    bench: &'a SimBench,
) -> IgnitionController<SimTimer<'a>, SimTrigger<'a>, SimOutput<'a>, SimOutput<'a>> {
    IgnitionController::new(
        config,
        bench.timer(),
        bench.trigger(),
        bench.output(Channel::Ignition),
        bench.output(Channel::Indicator),
    )
}

#[test]
fn reference_interval_resolves_to_max_advance() {
    let config = Config::default();
    let estimator = RpmEstimator::from_config(&config);
    let interval = Interval::new(10_000).expect("non-zero interval");

    let speed = estimator.estimate(interval);
    assert_eq!(speed, Rpm(6_000));

    let resolution = config.table().resolve(speed);
    assert_eq!(resolution.raw, 24);
    assert_eq!(resolution.index, 16);
    assert_eq!(resolution.class, IndexClass::ClampedToMax);
    assert_eq!(resolution.advance, Angle::degrees(27));
}

#[test]
fn steady_6000_rpm_fires_every_cycle() {
    let config = Config::default();
    let bench = SimBench::new(10_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<8> = TelemetryRecorder::new();

    for _ in 0..5 {
        let report = controller.run_cycle(&mut telemetry);
        assert!(report.outcome.fired(), "unexpected outcome {:?}", report.outcome);

        let cycle = report.cycle.expect("fired cycles carry their data");
        assert!(
            (5_990..=6_000).contains(&cycle.speed.get()),
            "speed {}",
            cycle.speed
        );
        assert_eq!(report.record.index, 16);
        assert_eq!(report.record.mode, ControllerMode::Normal);
    }

    let coil = bench.log(Channel::Ignition);
    assert_eq!(coil.asserts, 5);
    let (asserted, released) = (
        coil.last_asserted_at.expect("coil fired"),
        coil.last_released_at.expect("coil released"),
    );
    assert!(released - asserted >= u64::from(config.dwell_ticks()));

    assert_eq!(telemetry.len(), 5);
    assert_eq!(telemetry.counters().normal, 5);
    assert_eq!(controller.state().mode(), ControllerMode::Normal);
}

#[test]
fn spark_fires_at_angle_to_fire_after_the_edge() {
    let config = Config::default();
    // 2000 rpm: index 8, 15.6° advance, 11.4° after the 27° trigger.
    let bench = SimBench::new(30_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<4> = TelemetryRecorder::new();

    let _ = controller.run_cycle(&mut telemetry);
    let report = controller.run_cycle(&mut telemetry);

    let cycle = report.cycle.expect("cycle data");
    assert_eq!(cycle.resolution.index, 8);
    assert_eq!(cycle.resolution.advance, Angle::tenths(156));
    let plan = cycle.plan.expect("planned spark");
    assert_eq!(plan.angle_to_fire, Angle::tenths(114));
    assert!((945..=955).contains(&plan.delay), "delay {}", plan.delay);

    let coil = bench.log(Channel::Ignition);
    let fired_at = coil.last_asserted_at.expect("coil fired") - bench.last_pulse_at();
    assert!(fired_at >= u64::from(plan.delay));
    assert!(fired_at < u64::from(plan.delay) + 10, "fired {fired_at} ticks after edge");
}

#[test]
fn pulse_width_capture_with_partial_angle_speed() {
    let config = Config::builder()
        .edge_policy(EdgePolicy::PulseWidth)
        .speed_formula(SpeedFormula::PerTriggerAngle)
        .build()
        .expect("valid config");
    let bench = SimBench::new(10_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<4> = TelemetryRecorder::new();

    for _ in 0..3 {
        let report = controller.run_cycle(&mut telemetry);
        assert!(report.outcome.fired(), "unexpected outcome {:?}", report.outcome);
        let cycle = report.cycle.expect("cycle data");
        assert!(
            (740..=760).contains(&cycle.interval.ticks()),
            "pulse width {}",
            cycle.interval.ticks()
        );
        assert!(
            (5_900..=6_100).contains(&cycle.speed.get()),
            "speed {}",
            cycle.speed
        );
        assert_eq!(report.record.index, 16);
    }
}

#[test]
fn status_indicator_follows_divider() {
    let config = Config::builder()
        .led_divider(2)
        .build()
        .expect("valid config");
    let bench = SimBench::new(20_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<8> = TelemetryRecorder::new();

    for _ in 0..6 {
        let _ = controller.run_cycle(&mut telemetry);
    }

    assert_eq!(bench.log(Channel::Ignition).asserts, 6);
    assert_eq!(bench.log(Channel::Indicator).transitions, 3);
}

#[test]
fn repeated_stale_cycles_leave_state_unchanged() {
    let config = Config::default();
    let bench = SimBench::new(20_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<8> = TelemetryRecorder::new();

    bench.overflow_signal().notify();
    let first = controller.run_cycle(&mut telemetry);
    assert_eq!(first.outcome, CycleOutcome::Skipped(StaleReason::Overflow));
    let after_one = (
        *controller.state(),
        controller.limiter().clone(),
        controller.freshness().clone(),
    );

    for _ in 0..4 {
        bench.overflow_signal().notify();
        let report = controller.run_cycle(&mut telemetry);
        assert_eq!(report.outcome, CycleOutcome::Skipped(StaleReason::Overflow));
        assert_eq!(report.record.mode, ControllerMode::Stale);
        assert_eq!(report.record.index, 9);
    }

    let after_many = (
        *controller.state(),
        controller.limiter().clone(),
        controller.freshness().clone(),
    );
    assert_eq!(after_one, after_many);
    assert_eq!(bench.log(Channel::Ignition).asserts, 0);
    assert_eq!(bench.log(Channel::Ignition).transitions, 0);
    assert_eq!(telemetry.counters().stale, 5);
}

#[test]
fn overflow_spoils_exactly_one_reading() {
    let config = Config::default();
    let bench = SimBench::new(20_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<8> = TelemetryRecorder::new();

    assert!(controller.run_cycle(&mut telemetry).outcome.fired());

    bench.overflow_signal().notify();
    let stale = controller.run_cycle(&mut telemetry);
    assert_eq!(stale.outcome, CycleOutcome::Skipped(StaleReason::Overflow));
    assert!(!bench.overflow_signal().is_raised());

    assert!(controller.run_cycle(&mut telemetry).outcome.fired());
    assert_eq!(bench.log(Channel::Ignition).asserts, 2);
}

#[test]
fn stalled_engine_reads_stale() {
    let config = Config::builder()
        .stall_ticks(50_000)
        .build()
        .expect("valid config");
    let bench = SimBench::new(60_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<4> = TelemetryRecorder::new();

    let report = controller.run_cycle(&mut telemetry);
    assert_eq!(report.outcome, CycleOutcome::Skipped(StaleReason::Stall));
    assert_eq!(bench.log(Channel::Ignition).asserts, 0);
}

#[test]
fn telemetry_frames_decode_back_to_records() {
    let config = Config::default();
    let bench = SimBench::new(15_000, config.trigger_coil_angle());
    let mut controller = controller(&config, &bench);
    let mut telemetry: TelemetryRecorder<4> = TelemetryRecorder::new();

    for _ in 0..4 {
        let _ = controller.run_cycle(&mut telemetry);
    }

    for record in telemetry.oldest_first() {
        let frame = record.encode();
        assert_eq!(CycleRecord::decode(&frame), Ok(*record));
    }
    let spark = controller.run_cycle(&mut telemetry).outcome;
    assert!(matches!(spark, CycleOutcome::Spark(SparkOutcome::Fired { .. })));
}
