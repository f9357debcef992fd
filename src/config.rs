//! Configuration for NEX device sessions.

use std::time::Duration;

use crate::protocol::{LengthTable, StatusLayout};

/// Default rated power of the element in watts.
pub const DEFAULT_RATED_POWER_WATTS: u32 = 400;

/// Default number of connect attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 8;

/// Default time allowed for one connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(12);

/// Default number of notification subscribe attempts.
pub const DEFAULT_NOTIFY_ATTEMPTS: u32 = 4;

/// Default time allowed for one subscribe attempt.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between subscribe attempts.
pub const DEFAULT_NOTIFY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default wait for a status message after a hello.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time allowed for one frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded retry policy for one kind of attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Time allowed for each attempt.
    pub per_attempt_timeout: Duration,
}

impl RetryBudget {
    /// Creates a retry budget.
    #[must_use]
    pub const fn new(max_attempts: u32, per_attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            per_attempt_timeout,
        }
    }
}

/// Protocol details that vary between firmware revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolProfile {
    /// Length code of every message kind.
    pub lengths: LengthTable,
    /// Field offsets inside the status payload.
    pub layout: StatusLayout,
    /// Drop a status continuation identical to the one before it.
    pub drop_repeated_fragments: bool,
}

impl ProtocolProfile {
    /// Profile for firmware announcing schedules with length code 153.
    #[must_use]
    pub fn schedule_153() -> Self {
        Self {
            lengths: LengthTable::new(2, 49, 153, 1),
            ..Self::default()
        }
    }

    /// Sets the length table.
    #[must_use]
    pub const fn lengths(mut self, lengths: LengthTable) -> Self {
        self.lengths = lengths;
        self
    }

    /// Sets the status field layout.
    #[must_use]
    pub const fn layout(mut self, layout: StatusLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Enables or disables dropping repeated status fragments.
    #[must_use]
    pub const fn drop_repeated_fragments(mut self, enabled: bool) -> Self {
        self.drop_repeated_fragments = enabled;
        self
    }
}

/// Configuration for one NEX device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Device address handed to the transport provider.
    pub address: String,
    /// Nameplate power of the element in watts.
    pub rated_power_watts: u32,
    /// Retry budget for connecting.
    pub connect: RetryBudget,
    /// Retry budget for subscribing to notifications.
    pub notify: RetryBudget,
    /// Pause between subscribe attempts.
    pub notify_retry_delay: Duration,
    /// Wait for a status message after a hello.
    pub response_timeout: Duration,
    /// Time allowed for a bare frame write.
    pub write_timeout: Duration,
    /// Firmware-specific protocol details.
    pub profile: ProtocolProfile,
}

impl DeviceConfig {
    /// Creates a configuration with default settings.
    ///
    /// The address is normalised to upper case, matching how platform
    /// Bluetooth stacks report it.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().to_uppercase(),
            rated_power_watts: DEFAULT_RATED_POWER_WATTS,
            connect: RetryBudget::new(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT),
            notify: RetryBudget::new(DEFAULT_NOTIFY_ATTEMPTS, DEFAULT_NOTIFY_TIMEOUT),
            notify_retry_delay: DEFAULT_NOTIFY_RETRY_DELAY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            profile: ProtocolProfile::default(),
        }
    }

    /// Sets the rated power.
    #[must_use]
    pub const fn rated_power_watts(mut self, watts: u32) -> Self {
        self.rated_power_watts = watts;
        self
    }

    /// Sets the connect retry budget.
    #[must_use]
    pub const fn connect(mut self, budget: RetryBudget) -> Self {
        self.connect = budget;
        self
    }

    /// Sets the subscribe retry budget.
    #[must_use]
    pub const fn notify(mut self, budget: RetryBudget) -> Self {
        self.notify = budget;
        self
    }

    /// Sets the pause between subscribe attempts.
    #[must_use]
    pub const fn notify_retry_delay(mut self, delay: Duration) -> Self {
        self.notify_retry_delay = delay;
        self
    }

    /// Sets the status response timeout.
    #[must_use]
    pub const fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the protocol profile.
    #[must_use]
    pub const fn profile(mut self, profile: ProtocolProfile) -> Self {
        self.profile = profile;
        self
    }
}
