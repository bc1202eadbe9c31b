//! Per-cycle telemetry emitted by the control loop.
//!
//! The loop hands one [`CycleRecord`] to a [`TelemetrySink`] at the end of
//! every iteration, skipped and faulted ones included. How records leave the
//! device is the sink's business; [`frame`] provides the compact serial
//! framing shared by the firmware and host tools, and [`TelemetryRecorder`]
//! keeps a bounded history for inspection.

pub mod frame;

pub use frame::{FRAME_LEN, FrameError};

use heapless::{HistoryBuf, OldestOrdered};

use crate::controller::ControllerMode;
use crate::rpm::Rpm;

/// Default history depth for [`TelemetryRecorder`].
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// One loop iteration as seen from outside.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleRecord {
    pub index: u8,
    pub speed: Rpm,
    pub mode: ControllerMode,
}

impl CycleRecord {
    /// Builds a record, saturating `index` into a byte.
    #[must_use]
    pub fn new(index: u16, speed: Rpm, mode: ControllerMode) -> Self {
        Self {
            index: u8::try_from(index).unwrap_or(u8::MAX),
            speed,
            mode,
        }
    }
}

/// Consumer of per-cycle records.
pub trait TelemetrySink {
    fn publish(&mut self, record: CycleRecord);
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for &mut S {
    fn publish(&mut self, record: CycleRecord) {
        (**self).publish(record);
    }
}

/// Sink that drops every record.
#[derive(Copy, Clone, Debug, Default)]
pub struct DiscardTelemetry;

impl TelemetrySink for DiscardTelemetry {
    fn publish(&mut self, _: CycleRecord) {}
}

/// Running totals per reported mode.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ModeCounters {
    pub normal: u32,
    pub cutoff: u32,
    pub stale: u32,
}

impl ModeCounters {
    fn count(&mut self, mode: ControllerMode) {
        let slot = match mode {
            ControllerMode::Normal => &mut self.normal,
            ControllerMode::Cutoff => &mut self.cutoff,
            ControllerMode::Stale => &mut self.stale,
        };
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub const fn total(&self) -> u32 {
        self.normal
            .saturating_add(self.cutoff)
            .saturating_add(self.stale)
    }
}

/// Fixed-size history of the most recent cycle records.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<CycleRecord, CAPACITY>,
    counters: ModeCounters,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            counters: ModeCounters {
                normal: 0,
                cutoff: 0,
                stale: 0,
            },
        }
    }

    /// Retained records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, CycleRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&CycleRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Totals since creation, including records that fell out of the ring.
    #[must_use]
    pub const fn counters(&self) -> &ModeCounters {
        &self.counters
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> TelemetrySink for TelemetryRecorder<CAPACITY> {
    fn publish(&mut self, record: CycleRecord) {
        self.counters.count(record.mode);
        self.ring.write(record);
    }
}
