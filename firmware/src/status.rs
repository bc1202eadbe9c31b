#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The control loop publishes the latest cycle record plus running counters
//! here; readers such as a debugger or the RTT log take a
//! [`StatusSnapshot`] without touching the loop's own state.

use ignition_core::controller::ControllerMode;
use ignition_core::rpm::Rpm;
use ignition_core::telemetry::CycleRecord;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, Ordering};

/// Status published by the running firmware.
pub static STATUS: StatusCells = StatusCells::new();

/// Point-in-time copy of the published status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub latest: Option<CycleRecord>,
    pub cycles: u32,
    pub cutoffs: u32,
    pub stale: u32,
}

/// Lock-free cells written by the control loop.
pub struct StatusCells {
    has_record: AtomicBool,
    index: AtomicU8,
    speed: AtomicU16,
    mode: AtomicU8,
    cycles: AtomicU32,
    cutoffs: AtomicU32,
    stale: AtomicU32,
}

impl Default for StatusCells {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCells {
    pub const fn new() -> Self {
        Self {
            has_record: AtomicBool::new(false),
            index: AtomicU8::new(0),
            speed: AtomicU16::new(0),
            mode: AtomicU8::new(0),
            cycles: AtomicU32::new(0),
            cutoffs: AtomicU32::new(0),
            stale: AtomicU32::new(0),
        }
    }

    /// Stores `record` as the latest cycle and bumps the counters.
    pub fn record_cycle(&self, record: &CycleRecord) {
        self.index.store(record.index, Ordering::Relaxed);
        self.speed.store(record.speed.get(), Ordering::Relaxed);
        self.mode.store(record.mode.to_raw(), Ordering::Relaxed);
        self.has_record.store(true, Ordering::Release);

        self.cycles.fetch_add(1, Ordering::Relaxed);
        match record.mode {
            ControllerMode::Normal => {}
            ControllerMode::Cutoff => {
                self.cutoffs.fetch_add(1, Ordering::Relaxed);
            }
            ControllerMode::Stale => {
                self.stale.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let latest = if self.has_record.load(Ordering::Acquire) {
            ControllerMode::from_raw(self.mode.load(Ordering::Relaxed)).map(|mode| CycleRecord {
                index: self.index.load(Ordering::Relaxed),
                speed: Rpm(self.speed.load(Ordering::Relaxed)),
                mode,
            })
        } else {
            None
        };

        StatusSnapshot {
            latest,
            cycles: self.cycles.load(Ordering::Relaxed),
            cutoffs: self.cutoffs.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_record() {
        let cells = StatusCells::new();
        let snapshot = cells.snapshot();
        assert_eq!(snapshot.latest, None);
        assert_eq!(snapshot.cycles, 0);
    }

    #[test]
    fn snapshot_reflects_latest_cycle_and_counters() {
        let cells = StatusCells::new();
        cells.record_cycle(&CycleRecord {
            index: 16,
            speed: Rpm(6_000),
            mode: ControllerMode::Normal,
        });
        cells.record_cycle(&CycleRecord {
            index: 9,
            speed: Rpm(12_000),
            mode: ControllerMode::Cutoff,
        });
        let stale = CycleRecord {
            index: 9,
            speed: Rpm(2_400),
            mode: ControllerMode::Stale,
        };
        cells.record_cycle(&stale);

        let snapshot = cells.snapshot();
        assert_eq!(snapshot.latest, Some(stale));
        assert_eq!(snapshot.cycles, 3);
        assert_eq!(snapshot.cutoffs, 1);
        assert_eq!(snapshot.stale, 1);
    }
}
