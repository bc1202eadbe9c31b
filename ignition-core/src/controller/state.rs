use core::fmt;

use crate::scheduler::LedDivider;

/// Mode reported for a loop iteration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerMode {
    #[default]
    Normal,
    Cutoff,
    Stale,
}

impl ControllerMode {
    /// Wire code used in telemetry frames.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ControllerMode::Normal => 0,
            ControllerMode::Cutoff => 1,
            ControllerMode::Stale => 2,
        }
    }

    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0 => Some(ControllerMode::Normal),
            1 => Some(ControllerMode::Cutoff),
            2 => Some(ControllerMode::Stale),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerMode::Normal => "NORMAL",
            ControllerMode::Cutoff => "CUTOFF",
            ControllerMode::Stale => "STALE",
        })
    }
}

/// State carried by the main loop from one iteration to the next.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ControllerState {
    mode: ControllerMode,
    led: LedDivider,
}

impl ControllerState {
    #[must_use]
    pub const fn new(led_divider: u8) -> Self {
        Self {
            mode: ControllerMode::Normal,
            led: LedDivider::new(led_divider),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> ControllerMode {
        self.mode
    }

    #[must_use]
    pub const fn led(&self) -> &LedDivider {
        &self.led
    }

    pub(crate) fn led_mut(&mut self) -> &mut LedDivider {
        &mut self.led
    }

    pub(crate) fn enter(&mut self, mode: ControllerMode) {
        if self.mode != mode {
            trace!("controller mode {} -> {}", self.mode, mode);
        }
        self.mode = mode;
    }
}
