//! Status payload decoding.
//!
//! A sealed status message carries a fixed block of single-byte fields:
//! ```text
//! [?:1] [state:1] [?:2] [current:1] [target:1] [lower:1] [upper:1] ...
//! ... [operating minutes:2BE @35] ...
//! ```
//! Only the fields above are interpreted.

use crate::error::FrameError;
use crate::types::DeviceReading;

/// Minutes-times-watts per kilowatt-hour.
const WATT_MINUTES_PER_KWH: f64 = 60_000.0;

/// Field offsets inside the status payload for one firmware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLayout {
    /// Offset of the element state code.
    pub state_code: usize,
    /// Offset of the current element temperature.
    pub current_temp: usize,
    /// Offset of the target temperature.
    pub target_temp: usize,
    /// Offset of the lowest settable temperature.
    pub lower_limit: usize,
    /// Offset of the highest settable temperature.
    pub upper_limit: usize,
    /// Offset of the big-endian operating-minutes counter.
    pub operating_minutes: usize,
}

impl StatusLayout {
    /// Shortest payload holding every field of this layout.
    #[must_use]
    pub fn min_len(&self) -> usize {
        [
            self.state_code + 1,
            self.current_temp + 1,
            self.target_temp + 1,
            self.lower_limit + 1,
            self.upper_limit + 1,
            self.operating_minutes + 2,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

impl Default for StatusLayout {
    fn default() -> Self {
        Self {
            state_code: 1,
            current_temp: 4,
            target_temp: 5,
            lower_limit: 6,
            upper_limit: 7,
            operating_minutes: 35,
        }
    }
}

/// Parses a sealed status payload into a reading.
///
/// `rated_power_watts` is the element's nameplate power, used to turn the
/// operating-minutes counter into energy.
pub fn parse_status(
    payload: &[u8],
    rated_power_watts: u32,
    layout: &StatusLayout,
) -> Result<DeviceReading, FrameError> {
    let needed = layout.min_len();
    if payload.len() < needed {
        return Err(FrameError::TooShort {
            expected: needed,
            got: payload.len(),
        });
    }

    let minutes_at = layout.operating_minutes;
    let operating_minutes = u16::from_be_bytes([payload[minutes_at], payload[minutes_at + 1]]);

    Ok(DeviceReading {
        state_code: payload[layout.state_code],
        current_temp: f64::from(payload[layout.current_temp]),
        target_temp: f64::from(payload[layout.target_temp]),
        lower_limit: f64::from(payload[layout.lower_limit]),
        upper_limit: f64::from(payload[layout.upper_limit]),
        operating_minutes,
        energy_used_kwh: f64::from(operating_minutes) * f64::from(rated_power_watts)
            / WATT_MINUTES_PER_KWH,
    })
}
