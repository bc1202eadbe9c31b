//! Telemetry sink used by the firmware control loop.
//!
//! Every cycle record lands in three places: the shared [`crate::status`]
//! cells, a small history ring, and (on target) the defmt log as an encoded
//! serial frame. Every [`STATUS_LOG_INTERVAL`] cycles the sink also logs a
//! status line built from the shared cells and the ring's peak speed.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use ignition_core::controller::ControllerMode;
use ignition_core::rpm::Rpm;
use ignition_core::telemetry::{CycleRecord, TelemetryRecorder, TelemetrySink};

use crate::status::StatusCells;

/// Cycle records retained on the device.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Cycles between periodic status lines.
pub const STATUS_LOG_INTERVAL: u32 = 1_024;

pub struct FirmwareTelemetry<'a> {
    status: &'a StatusCells,
    history: TelemetryRecorder<TELEMETRY_RING_CAPACITY>,
    last_mode: Option<ControllerMode>,
}

impl<'a> FirmwareTelemetry<'a> {
    pub const fn new(status: &'a StatusCells) -> Self {
        Self {
            status,
            history: TelemetryRecorder::new(),
            last_mode: None,
        }
    }

    /// Highest speed among the retained records.
    pub fn recent_peak(&self) -> Option<Rpm> {
        self.history.oldest_first().map(|record| record.speed).max()
    }

    /// Returns `true` when `mode` differs from the previous record's.
    fn mode_changed(&mut self, mode: ControllerMode) -> bool {
        let changed = self.last_mode != Some(mode);
        self.last_mode = Some(mode);
        changed
    }
}

impl TelemetrySink for FirmwareTelemetry<'_> {
    fn publish(&mut self, record: CycleRecord) {
        self.status.record_cycle(&record);
        self.history.publish(record);
        let changed = self.mode_changed(record.mode);

        #[cfg(target_os = "none")]
        {
            let frame = record.encode();
            defmt::trace!("frame {=[u8]:02x}", &frame[..]);
            if changed {
                defmt::info!(
                    "mode {} at {=u16} rpm (index {=u8})",
                    record.mode,
                    record.speed.get(),
                    record.index
                );
            }

            let snapshot = self.status.snapshot();
            if snapshot.cycles % STATUS_LOG_INTERVAL == 0 {
                defmt::info!(
                    "status: {} after {=u32} cycles, {=u32} cutoffs, {=u32} stale, peak {=u16} rpm",
                    snapshot.latest.map(|latest| latest.mode),
                    snapshot.cycles,
                    snapshot.cutoffs,
                    snapshot.stale,
                    self.recent_peak().map_or(0, Rpm::get)
                );
            }
        }
        #[cfg(not(target_os = "none"))]
        let _ = changed;
    }
}
