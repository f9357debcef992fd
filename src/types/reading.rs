//! Device readings decoded from status messages.

/// On/off state of the heating element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationMode {
    /// Element is switched off.
    Off,
    /// Element is switched on and regulating.
    On,
}

impl OperationMode {
    /// Derives the mode from a status state code; zero means off.
    #[must_use]
    pub const fn from_state_code(code: u8) -> Self {
        if code == 0 { Self::Off } else { Self::On }
    }
}

/// Snapshot of one complete status message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceReading {
    /// Raw element state code.
    pub state_code: u8,
    /// Current element temperature in degrees.
    pub current_temp: f64,
    /// Target temperature in degrees.
    pub target_temp: f64,
    /// Lowest settable temperature.
    pub lower_limit: f64,
    /// Highest settable temperature.
    pub upper_limit: f64,
    /// Operating-time counter in minutes.
    pub operating_minutes: u16,
    /// Energy used, from operating time and rated power.
    pub energy_used_kwh: f64,
}

impl DeviceReading {
    /// Returns the on/off mode encoded in the state code.
    #[must_use]
    pub const fn mode(&self) -> OperationMode {
        OperationMode::from_state_code(self.state_code)
    }

    /// Clamps a requested temperature to the device's settable range.
    #[must_use]
    pub fn clamp_temperature(&self, temp: f64) -> f64 {
        temp.max(self.lower_limit).min(self.upper_limit)
    }
}

/// Outcome of waiting for a status message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusResponse {
    /// A status message completed for this request.
    Fresh(DeviceReading),
    /// No status in time; the last known reading is returned instead.
    Stale(DeviceReading),
    /// No status in time and none was ever received.
    NoData,
}

impl StatusResponse {
    /// Returns the reading, fresh or stale.
    #[must_use]
    pub const fn reading(&self) -> Option<&DeviceReading> {
        match self {
            Self::Fresh(reading) | Self::Stale(reading) => Some(reading),
            Self::NoData => None,
        }
    }

    /// Returns true if the reading came from this request.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}
