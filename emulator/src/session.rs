use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use ignition_core::config::Config;
use ignition_core::controller::{CycleOutcome, CycleReport, IgnitionController};
use ignition_core::scheduler::SparkOutcome;
use ignition_core::sim::{Channel, SimBench, SimOutput, SimTimer, SimTrigger};
use ignition_core::telemetry::{CycleRecord, TelemetryRecorder};

pub const DEFAULT_CYCLES: usize = 8;

/// Counter width used by the dropout profile. Long enough for every speed the
/// profile runs, short enough that a few missed pulses wrap it.
const DROPOUT_COUNTER_BITS: u32 = 16;
const DROPOUT_MISSED_PULSES: u32 = 3;

type BenchController<'a> =
    IgnitionController<SimTimer<'a>, SimTrigger<'a>, SimOutput<'a>, SimOutput<'a>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Cruise,
    Sweep,
    Overrev,
    Dropout,
}

impl TranscriptProfile {
    pub const ALL: [TranscriptProfile; 4] = [
        TranscriptProfile::Cruise,
        TranscriptProfile::Sweep,
        TranscriptProfile::Overrev,
        TranscriptProfile::Dropout,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TranscriptProfile::Cruise => "cruise",
            TranscriptProfile::Sweep => "sweep",
            TranscriptProfile::Overrev => "overrev",
            TranscriptProfile::Dropout => "dropout",
        }
    }

    pub fn log_path(self) -> String {
        format!("transcripts/emulator-{}.log", self.tag())
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Cruise => "Ignition emulator steady 3000 rpm transcript",
            TranscriptProfile::Sweep => "Ignition emulator 1000-9000 rpm sweep transcript",
            TranscriptProfile::Overrev => "Ignition emulator rev limiter transcript",
            TranscriptProfile::Dropout => "Ignition emulator trigger dropout transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| tag.eq_ignore_ascii_case(profile.tag()))
            .ok_or_else(|| format!("Unknown transcript profile `{tag}`"))
    }

    fn counter_bits(self) -> Option<u32> {
        match self {
            TranscriptProfile::Dropout => Some(DROPOUT_COUNTER_BITS),
            _ => None,
        }
    }

    /// Engine phases driven by this profile, `cycles` iterations each.
    fn phases(self) -> Vec<Phase> {
        match self {
            TranscriptProfile::Cruise => vec![Phase::steady(3_000)],
            TranscriptProfile::Sweep => (1..=9).map(|step| Phase::steady(step * 1_000)).collect(),
            TranscriptProfile::Overrev => vec![Phase::steady(12_000), Phase::steady(3_000)],
            TranscriptProfile::Dropout => vec![
                Phase::steady(3_000),
                Phase {
                    rpm: 3_000,
                    missed_pulses: DROPOUT_MISSED_PULSES,
                },
            ],
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Phase {
    rpm: u32,
    missed_pulses: u32,
}

impl Phase {
    const fn steady(rpm: u32) -> Self {
        Self {
            rpm,
            missed_pulses: 0,
        }
    }
}

/// Totals for one emulator run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionSummary {
    pub cycles: u32,
    pub sparks: u32,
    pub cuts: u32,
    pub skipped: u32,
    pub faults: u32,
}

pub struct Session {
    profile: TranscriptProfile,
    config: Config,
    cycles: usize,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile, config: Config, cycles: usize) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile, &config)?;
        Ok(Self {
            profile,
            config,
            cycles,
            transcript,
        })
    }

    /// Drives every phase of the profile and returns the console lines.
    pub fn run(&mut self) -> io::Result<(Vec<String>, SessionSummary)> {
        let mut bench = SimBench::new(
            SimBench::period_for_rpm(self.profile.phases()[0].rpm),
            self.config.trigger_coil_angle(),
        );
        if let Some(bits) = self.profile.counter_bits() {
            bench = bench.with_counter_bits(bits);
        }

        let mut controller: BenchController<'_> = IgnitionController::new(
            &self.config,
            bench.timer(),
            bench.trigger(),
            bench.output(Channel::Ignition),
            bench.output(Channel::Indicator),
        );
        let mut telemetry: TelemetryRecorder = TelemetryRecorder::new();
        let mut summary = SessionSummary::default();
        let mut lines = Vec::new();

        for phase in self.profile.phases() {
            let period = SimBench::period_for_rpm(phase.rpm);
            bench.set_period(period);
            let line = format!("engine {} rpm (period {period} ticks)", phase.rpm);
            self.transcript
                .append_line(bench.now(), TranscriptRole::Bench, &line)?;
            lines.push(line);

            for cycle in 0..self.cycles {
                if cycle == 1 && phase.missed_pulses > 0 {
                    bench.drop_pulses(phase.missed_pulses);
                    let line = format!("dropping {} trigger pulses", phase.missed_pulses);
                    self.transcript
                        .append_line(bench.now(), TranscriptRole::Bench, &line)?;
                    lines.push(line);
                }

                let report = controller.run_cycle(&mut telemetry);
                summary.count(&report.outcome);
                for line in describe_report(&report) {
                    self.transcript
                        .append_line(bench.now(), TranscriptRole::Controller, &line)?;
                    lines.push(line);
                }
            }
        }

        let counters = telemetry.counters();
        let ignition = bench.log(Channel::Ignition);
        let indicator = bench.log(Channel::Indicator);
        let closing = [
            format!(
                "modes normal={} cutoff={} stale={}",
                counters.normal, counters.cutoff, counters.stale
            ),
            format!(
                "coil asserts={} indicator transitions={}",
                ignition.asserts, indicator.transitions
            ),
        ];
        for line in closing {
            self.transcript
                .append_line(bench.now(), TranscriptRole::Controller, &line)?;
            lines.push(line);
        }

        Ok((lines, summary))
    }
}

impl SessionSummary {
    fn count(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Spark(SparkOutcome::Fired { .. }) => self.sparks += 1,
            CycleOutcome::Spark(SparkOutcome::Cut { .. }) => self.cuts += 1,
            CycleOutcome::Spark(SparkOutcome::Aborted) | CycleOutcome::Skipped(_) => {
                self.skipped += 1;
            }
            CycleOutcome::Fault(_) => self.faults += 1,
        }
    }
}

fn describe_report(report: &CycleReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);

    let outcome = match report.outcome {
        CycleOutcome::Fault(fault) => format!("fault: {fault}"),
        CycleOutcome::Skipped(reason) => format!("skipped ({reason:?})"),
        CycleOutcome::Spark(SparkOutcome::Fired {
            asserted_at,
            released_at,
        }) => format!(
            "spark on={asserted_at} off={released_at} dwell={}",
            released_at.wrapping_sub(asserted_at)
        ),
        CycleOutcome::Spark(SparkOutcome::Cut { held_ticks }) => {
            format!("cut, held released {held_ticks} ticks")
        }
        CycleOutcome::Spark(SparkOutcome::Aborted) => "spark aborted: timer wrapped".to_string(),
    };

    match report.cycle {
        Some(cycle) => {
            let mut line = format!(
                "interval={} speed={} index={} ({:?}) advance={}",
                cycle.interval.ticks(),
                cycle.speed,
                cycle.resolution.index,
                cycle.resolution.class,
                cycle.resolution.advance,
            );
            if let Some(plan) = cycle.plan {
                let _ = write!(
                    line,
                    " fire_at={} delay={} dwell_end={}",
                    plan.angle_to_fire, plan.delay, plan.dwell_end
                );
            }
            lines.push(line);
        }
        None => lines.push("no reading".to_string()),
    }
    lines.push(outcome);

    let frame = report.record.encode();
    let decoded = match CycleRecord::decode(&frame) {
        Ok(record) => format!(
            "index={} speed={} mode={}",
            record.index, record.speed, record.mode
        ),
        Err(err) => format!("decode error: {err}"),
    };
    lines.push(format!("frame {} -> {decoded}", hex(&frame)));

    lines
}

fn hex(bytes: &[u8]) -> String {
    let mut buffer = String::with_capacity(bytes.len() * 3);
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            buffer.push(' ');
        }
        let _ = write!(buffer, "{byte:02x}");
    }
    buffer
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile, config: &Config) -> io::Result<Self> {
        let log_path = profile.log_path();
        let path = Path::new(&log_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile, config)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile, config: &Config) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are bench ticks ({} us each)",
            config.tick_micros()
        )?;
        writeln!(
            self.writer,
            "# rev limit {} rpm, trigger coil {} deg, dwell {} ticks",
            config.rev_limit(),
            config.trigger_coil_angle(),
            config.dwell_ticks()
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, at: u64, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[{at:>10}] {} {}", role.prefix(), line)?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Bench,
    Controller,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Bench => "BENCH>",
            TranscriptRole::Controller => "ECU  <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_tags_round_trip() {
        for profile in TranscriptProfile::ALL {
            assert_eq!(TranscriptProfile::from_tag(profile.tag()), Ok(profile));
        }
        assert_eq!(
            TranscriptProfile::from_tag("OVERREV"),
            Ok(TranscriptProfile::Overrev)
        );
        assert!(TranscriptProfile::from_tag("idle").is_err());
    }

    #[test]
    fn hex_formats_frames() {
        assert_eq!(hex(&[0x17, 0x70, 0x00]), "17 70 00");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = SessionSummary::default();
        summary.count(&CycleOutcome::Spark(SparkOutcome::Fired {
            asserted_at: 10,
            released_at: 35,
        }));
        summary.count(&CycleOutcome::Spark(SparkOutcome::Cut { held_ticks: 20_000 }));
        summary.count(&CycleOutcome::Spark(SparkOutcome::Aborted));

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.sparks, 1);
        assert_eq!(summary.cuts, 1);
        assert_eq!(summary.skipped, 1);
    }
}
