use std::fmt;

use log::info;

/// Power/availability state of the local radio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioStatus {
    Unknown,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl RadioStatus {
    /// Whether the adapter can currently scan and connect.
    pub fn is_ready(self) -> bool {
        self == RadioStatus::PoweredOn
    }

    /// Human-readable reason behind the readiness value.
    pub fn description(self) -> &'static str {
        match self {
            RadioStatus::Unknown => "Unknown",
            RadioStatus::Unsupported => "Unsupported",
            RadioStatus::Unauthorized => "Unauthorized",
            RadioStatus::PoweredOff => "Powered off",
            RadioStatus::PoweredOn => "Powered on",
        }
    }
}

impl fmt::Display for RadioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Tracks adapter availability as reported by the radio driver.
///
/// State is reported as received. There is no retry logic here: the consumer
/// decides whether to restart scanning when readiness returns.
pub(crate) struct RadioStateMonitor {
    status: RadioStatus,
}

impl RadioStateMonitor {
    pub(crate) fn new() -> Self {
        Self {
            status: RadioStatus::Unknown,
        }
    }

    pub(crate) fn status(&self) -> RadioStatus {
        self.status
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    pub(crate) fn update(&mut self, status: RadioStatus) {
        if status != self.status {
            info!("Radio state: {}", status);
        }
        self.status = status;
    }
}
