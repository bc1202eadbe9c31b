//! Serial framing for [`CycleRecord`]s.
//!
//! ```text
//! [index, '\n', speed_hi, speed_lo, '\n', mode, '\n']
//! ```
//!
//! Mode codes are those of [`ControllerMode::to_raw`].

use core::fmt;

use winnow::binary;
use winnow::error::ErrMode;
use winnow::prelude::*;

use super::CycleRecord;
use crate::controller::ControllerMode;
use crate::rpm::Rpm;

/// Encoded size of one record.
pub const FRAME_LEN: usize = 7;

const DELIMITER: u8 = b'\n';

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer than [`FRAME_LEN`] bytes.
    Truncated,
    /// Wrong length or a delimiter missing.
    Malformed,
    UnknownMode(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated => f.write_str("telemetry frame truncated"),
            FrameError::Malformed => f.write_str("telemetry frame malformed"),
            FrameError::UnknownMode(code) => write!(f, "unknown controller mode code {code}"),
        }
    }
}

type ParseResult<T> = Result<T, ErrMode<()>>;

fn byte(input: &mut &[u8]) -> ParseResult<u8> {
    binary::u8(input)
}

fn word(input: &mut &[u8]) -> ParseResult<u16> {
    binary::be_u16(input)
}

fn delimiter(input: &mut &[u8]) -> ParseResult<()> {
    match byte(input)? {
        DELIMITER => Ok(()),
        _ => Err(ErrMode::Backtrack(())),
    }
}

fn frame(input: &mut &[u8]) -> ParseResult<(u8, u16, u8)> {
    (byte, delimiter, word, delimiter, byte, delimiter)
        .map(|(index, (), speed, (), mode, ())| (index, speed, mode))
        .parse_next(input)
}

impl CycleRecord {
    /// Serialises the record into its wire frame.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let [speed_hi, speed_lo] = self.speed.get().to_be_bytes();
        [
            self.index,
            DELIMITER,
            speed_hi,
            speed_lo,
            DELIMITER,
            self.mode.to_raw(),
            DELIMITER,
        ]
    }

    /// Parses exactly one wire frame.
    ///
    /// # Errors
    ///
    /// See [`FrameError`].
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_LEN {
            return Err(FrameError::Truncated);
        }
        if bytes.len() > FRAME_LEN {
            return Err(FrameError::Malformed);
        }

        let mut input = bytes;
        let (index, speed, code) = frame
            .parse_next(&mut input)
            .map_err(|_| FrameError::Malformed)?;
        let mode = ControllerMode::from_raw(code).ok_or(FrameError::UnknownMode(code))?;

        Ok(Self {
            index,
            speed: Rpm(speed),
            mode,
        })
    }
}
