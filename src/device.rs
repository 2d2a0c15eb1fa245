use uuid::Uuid;

use crate::radio::{Advertisement, DeviceId};

/// Connection lifecycle of a discovered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A remote endpoint discovered over the radio.
///
/// Owned by the scan coordinator while discovered; the connection manager
/// takes over the selected device once a connect attempt starts, but identity
/// and state stay on the same entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: Option<String>,
    pub advertisement: Advertisement,
    pub rssi: Option<i16>,
    pub state: ConnectionState,
    pub services: Vec<Service>,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        name: Option<String>,
        advertisement: Advertisement,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            id,
            name,
            advertisement,
            rssi,
            state: ConnectionState::Disconnected,
            services: Vec::new(),
        }
    }

    pub fn service(&self, uuid: &Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid == *uuid)
    }

    pub(crate) fn service_mut(&mut self, uuid: &Uuid) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.uuid == *uuid)
    }

    /// First characteristic matching the UUID across all services.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == *uuid)
    }

    pub(crate) fn characteristic_mut(&mut self, uuid: &Uuid) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| c.uuid == *uuid)
    }

    /// First characteristic that is still notifying, in discovery order.
    pub(crate) fn first_notifying(&self) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.notifying)
    }

    /// Discards services and characteristics. Called whenever the device
    /// returns to `Disconnected`: a later reconnect must re-discover from
    /// scratch rather than reuse stale state.
    pub(crate) fn invalidate_services(&mut self) {
        self.services.clear();
    }
}

/// A grouping of characteristics exposed by a connected device.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub uuid: Uuid,
    /// Identity of the owning device.
    pub device: DeviceId,
    pub characteristics: Vec<Characteristic>,
}

/// An individually readable/writable/subscribable data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub uuid: Uuid,
    /// Identity of the owning service.
    pub service: Uuid,
    /// Identity of the owning device.
    pub device: DeviceId,
    /// Last value seen through a read completion or a notification.
    pub value: Option<Vec<u8>>,
    /// Authoritative only after a subscription-state-changed event.
    pub notifying: bool,
}
