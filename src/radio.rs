use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::{Error, RadioStatus};

/// Stable, radio-assigned device identity. Opaque to this crate: the btleplug
/// driver mints it from the peripheral address, tests use arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Snapshot of the most recent advertisement seen for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub services: Vec<Uuid>,
}

/// Primitives the session issues against the radio driver.
///
/// Every command is fire-and-forget: completion (or failure) is delivered
/// later as a [`RadioEvent`] on the same logical control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    StartScan {
        services: Vec<Uuid>,
        allow_duplicates: bool,
    },
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices {
        device: DeviceId,
        services: Option<Vec<Uuid>>,
    },
    DiscoverCharacteristics {
        device: DeviceId,
        service: Uuid,
        characteristics: Option<Vec<Uuid>>,
    },
    ReadValue {
        device: DeviceId,
        characteristic: Uuid,
    },
    WriteValue {
        device: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
        with_response: bool,
    },
    SetNotify {
        device: DeviceId,
        characteristic: Uuid,
        enabled: bool,
    },
}

/// Outbound seam to the radio driver.
///
/// Implementations must not block: a command is queued for execution and the
/// result comes back as a [`RadioEvent`]. [`crate::BtleRadio`] is the
/// production implementation; tests substitute a recording fake.
pub trait Radio: Send + Sync {
    fn deliver(&self, command: RadioCommand);
}

/// Raw events delivered by the radio driver.
///
/// The session assumes exactly-once, non-reordered delivery per device and
/// characteristic, which is what the underlying stacks guarantee.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    StateChanged(RadioStatus),
    DeviceSeen {
        device: DeviceId,
        name: Option<String>,
        advertisement: Advertisement,
        rssi: Option<i16>,
    },
    ConnectSucceeded {
        device: DeviceId,
    },
    ConnectFailed {
        device: DeviceId,
        error: Option<Error>,
    },
    Disconnected {
        device: DeviceId,
        error: Option<Error>,
    },
    ServicesDiscovered {
        device: DeviceId,
        services: Vec<Uuid>,
        error: Option<Error>,
    },
    CharacteristicsDiscovered {
        device: DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
        error: Option<Error>,
    },
    ValueUpdated {
        device: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<Error>,
    },
    WriteAcknowledged {
        device: DeviceId,
        characteristic: Uuid,
        error: Option<Error>,
    },
    SubscriptionChanged {
        device: DeviceId,
        characteristic: Uuid,
        notifying: bool,
        error: Option<Error>,
    },
    NameChanged {
        device: DeviceId,
        name: String,
    },
    ServicesInvalidated {
        device: DeviceId,
    },
}
