//! Simulated engine bench for host-side runs.
//!
//! [`SimBench`] owns a virtual clock, a crank trigger generating one pulse
//! per revolution and the two output channels. Time only moves when the
//! controller polls the timer or the trigger pin (each poll costs
//! `poll_cost` ticks) or when a caller advances it explicitly. The
//! capability handles [`SimTimer`], [`SimTrigger`] and [`SimOutput`] borrow
//! the bench, so a test can keep inspecting it while the controller runs.

use core::cell::Cell;

use crate::hal::{
    CounterWindow, DigitalOutput, HardwareTimer, OutputLevel, OverflowSignal, PinLevel, TriggerInput,
};

/// Activity recorded on one output channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutputLog {
    pub level: OutputLevel,
    pub asserts: u32,
    pub transitions: u32,
    pub last_asserted_at: Option<u64>,
    pub last_released_at: Option<u64>,
    /// Instant of the most recent level change.
    pub last_change_at: u64,
}

impl OutputLog {
    const fn new() -> Self {
        Self {
            level: OutputLevel::Released,
            asserts: 0,
            transitions: 0,
            last_asserted_at: None,
            last_released_at: None,
            last_change_at: 0,
        }
    }

    fn drive(&mut self, level: OutputLevel, at: u64) {
        if level == self.level {
            return;
        }
        self.level = level;
        self.transitions += 1;
        self.last_change_at = at;
        match level {
            OutputLevel::Asserted => {
                self.asserts += 1;
                self.last_asserted_at = Some(at);
            }
            OutputLevel::Released => self.last_released_at = Some(at),
        }
    }
}

/// Output channel selector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Channel {
    Ignition,
    Indicator,
}

/// Virtual engine, timer and output pins.
#[derive(Debug)]
pub struct SimBench {
    clock: Cell<u64>,
    poll_cost: u64,
    timer_base: Cell<u64>,
    window: Cell<CounterWindow>,
    overflow: OverflowSignal,
    period: Cell<u32>,
    trigger_coil_angle: u16,
    pulse_start: Cell<u64>,
    pulse_missing: Cell<bool>,
    skip_pulses: Cell<u32>,
    pulses: Cell<u64>,
    glitch: Cell<Option<(u64, u64)>>,
    ignition: Cell<OutputLog>,
    indicator: Cell<OutputLog>,
}

impl SimBench {
    /// Bench with a 32-bit counter and one tick per poll.
    #[must_use]
    pub fn new(period: u32, trigger_coil_angle: u16) -> Self {
        Self {
            clock: Cell::new(0),
            poll_cost: 1,
            timer_base: Cell::new(0),
            window: Cell::new(CounterWindow::new(32)),
            overflow: OverflowSignal::new(),
            period: Cell::new(period.max(1)),
            trigger_coil_angle,
            pulse_start: Cell::new(0),
            pulse_missing: Cell::new(false),
            skip_pulses: Cell::new(0),
            pulses: Cell::new(0),
            glitch: Cell::new(None),
            ignition: Cell::new(OutputLog::new()),
            indicator: Cell::new(OutputLog::new()),
        }
    }

    /// Narrows the counter, e.g. to 16 bits, so long gaps make it wrap.
    #[must_use]
    pub fn with_counter_bits(mut self, bits: u32) -> Self {
        self.window = Cell::new(CounterWindow::new(bits));
        self
    }

    /// Ticks consumed by every timer or pin read.
    #[must_use]
    pub fn with_poll_cost(mut self, ticks: u64) -> Self {
        self.poll_cost = ticks.max(1);
        self
    }

    /// Engine speed expressed as a revolution period; applies from the next pulse.
    pub fn set_period(&self, period: u32) {
        self.period.set(period.max(1));
    }

    #[must_use]
    pub fn period(&self) -> u32 {
        self.period.get()
    }

    /// Revolution period for `rpm` at one microsecond per tick.
    #[must_use]
    pub fn period_for_rpm(rpm: u32) -> u32 {
        60_000_000 / rpm.max(1)
    }

    /// High time of each trigger pulse: the coil angle's share of a revolution.
    #[must_use]
    pub fn pulse_width(&self) -> u64 {
        (u64::from(self.period.get()) * u64::from(self.trigger_coil_angle) / 360).max(1)
    }

    /// Suppresses the next `count` trigger pulses.
    pub fn drop_pulses(&self, count: u32) {
        self.skip_pulses.set(self.skip_pulses.get() + count);
    }

    /// Holds the trigger pin high for `width` ticks starting `after` ticks from now.
    pub fn inject_glitch(&self, after: u64, width: u64) {
        let start = self.clock.get() + after;
        self.glitch.set(Some((start, start + width)));
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.get()
    }

    /// Advances the clock without polling anything.
    pub fn advance(&self, ticks: u64) {
        self.clock.set(self.clock.get() + ticks);
        self.roll_pulses();
    }

    /// Trigger pulses generated so far, dropped ones included.
    #[must_use]
    pub fn pulses(&self) -> u64 {
        self.pulses.get()
    }

    /// Start of the most recent trigger pulse.
    #[must_use]
    pub fn last_pulse_at(&self) -> u64 {
        self.pulse_start.get()
    }

    #[must_use]
    pub fn overflow_signal(&self) -> &OverflowSignal {
        &self.overflow
    }

    #[must_use]
    pub fn log(&self, channel: Channel) -> OutputLog {
        self.channel(channel).get()
    }

    /// Ticks since the ignition output last changed level.
    #[must_use]
    pub fn ignition_steady_for(&self) -> u64 {
        self.clock.get() - self.ignition.get().last_change_at
    }

    #[must_use]
    pub fn timer(&self) -> SimTimer<'_> {
        SimTimer { bench: self }
    }

    #[must_use]
    pub fn trigger(&self) -> SimTrigger<'_> {
        SimTrigger { bench: self }
    }

    #[must_use]
    pub fn output(&self, channel: Channel) -> SimOutput<'_> {
        SimOutput {
            bench: self,
            channel,
        }
    }

    fn channel(&self, channel: Channel) -> &Cell<OutputLog> {
        match channel {
            Channel::Ignition => &self.ignition,
            Channel::Indicator => &self.indicator,
        }
    }

    fn poll(&self) {
        self.advance(self.poll_cost);
    }

    fn roll_pulses(&self) {
        let now = self.clock.get();
        let mut start = self.pulse_start.get();
        let period = u64::from(self.period.get());
        while now >= start + period {
            start += period;
            self.pulses.set(self.pulses.get() + 1);
            let skip = self.skip_pulses.get();
            self.pulse_missing.set(skip > 0);
            if skip > 0 {
                self.skip_pulses.set(skip - 1);
            }
        }
        self.pulse_start.set(start);
    }

    fn trigger_level(&self) -> PinLevel {
        let now = self.clock.get();
        let start = self.pulse_start.get();
        let in_pulse = !self.pulse_missing.get() && now < start + self.pulse_width();
        let in_glitch = self
            .glitch
            .get()
            .is_some_and(|(from, until)| (from..until).contains(&now));
        PinLevel::from_high(in_pulse || in_glitch)
    }

    fn counter(&self) -> u32 {
        let elapsed = self.clock.get() - self.timer_base.get();
        let mut window = self.window.get();
        let value = window.fold(elapsed, &self.overflow);
        self.window.set(window);
        value
    }
}

/// Bench timer handle.
pub struct SimTimer<'a> {
    bench: &'a SimBench,
}

impl HardwareTimer for SimTimer<'_> {
    fn now(&mut self) -> u32 {
        self.bench.poll();
        self.bench.counter()
    }

    fn reset(&mut self) {
        let bench = self.bench;
        bench.timer_base.set(bench.clock.get());
        let mut window = bench.window.get();
        window.restart();
        bench.window.set(window);
    }

    fn overflow(&self) -> &OverflowSignal {
        &self.bench.overflow
    }
}

/// Bench trigger pin handle.
pub struct SimTrigger<'a> {
    bench: &'a SimBench,
}

impl TriggerInput for SimTrigger<'_> {
    fn level(&mut self) -> PinLevel {
        self.bench.poll();
        self.bench.trigger_level()
    }
}

/// Bench output pin handle.
pub struct SimOutput<'a> {
    bench: &'a SimBench,
    channel: Channel,
}

impl DigitalOutput for SimOutput<'_> {
    fn set(&mut self, level: OutputLevel) {
        let cell = self.bench.channel(self.channel);
        let mut log = cell.get();
        log.drive(level, self.bench.clock.get());
        cell.set(log);
    }

    fn level(&self) -> OutputLevel {
        self.bench.channel(self.channel).get().level
    }
}
