use uuid::Uuid;

use crate::device::{Characteristic, Device, Service};
use crate::monitor::RadioStatus;
use crate::Error;

/// The consumer's capability set, one optional handler per notification.
///
/// Only the events the consumer cares about need a handler; an unset handler
/// is a silent no-op. The whole set occupies a single replaceable slot on the
/// session ([`crate::Session::set_callbacks`]) and replacing it affects
/// subsequent events only.
///
/// Handlers run after the session lock has been released, so they may call
/// back into the session (reading or subscribing from within
/// [`on_characteristics_ready`](Self::on_characteristics_ready) is the
/// expected pattern). Replacing the callback set from inside a handler is not
/// supported.
#[derive(Default)]
pub struct SessionCallbacks {
    /// Batch discovery complete: the full discovered set at scan timeout.
    scan_complete: Option<Box<dyn FnMut(&[Device]) + Send>>,
    connected: Option<Box<dyn FnMut(&Device) + Send>>,
    disconnected: Option<Box<dyn FnMut(&Device, Option<&Error>) + Send>>,
    connect_failed: Option<Box<dyn FnMut(&Device, Option<&Error>) + Send>>,
    characteristics_ready: Option<Box<dyn FnMut(&Service, &[Characteristic]) + Send>>,
    state_changed: Option<Box<dyn FnMut(RadioStatus) + Send>>,
    device_seen: Option<Box<dyn FnMut(&Device) + Send>>,
    value_updated: Option<Box<dyn FnMut(&Uuid, &[u8], Option<&Error>) + Send>>,
    device_value_updated: Option<Box<dyn FnMut(&Device, &Characteristic, Option<&Error>) + Send>>,
    write_acknowledged: Option<Box<dyn FnMut(&Characteristic, Option<&Error>) + Send>>,
    subscription_changed: Option<Box<dyn FnMut(&Characteristic, Option<&Error>) + Send>>,
    name_changed: Option<Box<dyn FnMut(&Device) + Send>>,
    services_invalidated: Option<Box<dyn FnMut(&Device) + Send>>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per scan, when the deadline fires, with the full
    /// discovered set.
    pub fn on_scan_complete(mut self, func: impl FnMut(&[Device]) + Send + 'static) -> Self {
        self.scan_complete = Some(Box::new(func));
        self
    }

    pub fn on_connected(mut self, func: impl FnMut(&Device) + Send + 'static) -> Self {
        self.connected = Some(Box::new(func));
        self
    }

    /// Called for consumer-initiated and link-dropped disconnects alike; the
    /// error payload is the only difference.
    pub fn on_disconnected(
        mut self,
        func: impl FnMut(&Device, Option<&Error>) + Send + 'static,
    ) -> Self {
        self.disconnected = Some(Box::new(func));
        self
    }

    pub fn on_connect_failed(
        mut self,
        func: impl FnMut(&Device, Option<&Error>) + Send + 'static,
    ) -> Self {
        self.connect_failed = Some(Box::new(func));
        self
    }

    /// Called once per service, after its characteristics are enumerated.
    pub fn on_characteristics_ready(
        mut self,
        func: impl FnMut(&Service, &[Characteristic]) + Send + 'static,
    ) -> Self {
        self.characteristics_ready = Some(Box::new(func));
        self
    }

    pub fn on_state_changed(mut self, func: impl FnMut(RadioStatus) + Send + 'static) -> Self {
        self.state_changed = Some(Box::new(func));
        self
    }

    /// Incremental discovery: fires for newly seen devices only, never for a
    /// refresh of an already-known identity.
    pub fn on_device_seen(mut self, func: impl FnMut(&Device) + Send + 'static) -> Self {
        self.device_seen = Some(Box::new(func));
        self
    }

    /// Value update keyed by characteristic identity only.
    pub fn on_value_updated(
        mut self,
        func: impl FnMut(&Uuid, &[u8], Option<&Error>) + Send + 'static,
    ) -> Self {
        self.value_updated = Some(Box::new(func));
        self
    }

    /// Value update carrying the owning device as well.
    pub fn on_device_value_updated(
        mut self,
        func: impl FnMut(&Device, &Characteristic, Option<&Error>) + Send + 'static,
    ) -> Self {
        self.device_value_updated = Some(Box::new(func));
        self
    }

    pub fn on_write_acknowledged(
        mut self,
        func: impl FnMut(&Characteristic, Option<&Error>) + Send + 'static,
    ) -> Self {
        self.write_acknowledged = Some(Box::new(func));
        self
    }

    pub fn on_subscription_changed(
        mut self,
        func: impl FnMut(&Characteristic, Option<&Error>) + Send + 'static,
    ) -> Self {
        self.subscription_changed = Some(Box::new(func));
        self
    }

    pub fn on_name_changed(mut self, func: impl FnMut(&Device) + Send + 'static) -> Self {
        self.name_changed = Some(Box::new(func));
        self
    }

    pub fn on_services_invalidated(mut self, func: impl FnMut(&Device) + Send + 'static) -> Self {
        self.services_invalidated = Some(Box::new(func));
        self
    }

    pub(crate) fn dispatch(&mut self, notice: Notice) {
        match notice {
            Notice::ScanComplete(devices) => {
                if let Some(f) = self.scan_complete.as_mut() {
                    f(&devices);
                }
            }
            Notice::Connected(device) => {
                if let Some(f) = self.connected.as_mut() {
                    f(&device);
                }
            }
            Notice::Disconnected(device, error) => {
                if let Some(f) = self.disconnected.as_mut() {
                    f(&device, error.as_ref());
                }
            }
            Notice::ConnectFailed(device, error) => {
                if let Some(f) = self.connect_failed.as_mut() {
                    f(&device, error.as_ref());
                }
            }
            Notice::CharacteristicsReady(service) => {
                if let Some(f) = self.characteristics_ready.as_mut() {
                    f(&service, &service.characteristics);
                }
            }
            Notice::StateChanged(status) => {
                if let Some(f) = self.state_changed.as_mut() {
                    f(status);
                }
            }
            Notice::DeviceSeen(device) => {
                if let Some(f) = self.device_seen.as_mut() {
                    f(&device);
                }
            }
            Notice::ValueUpdated {
                device,
                characteristic,
                error,
            } => {
                // Both listener variants are fed from the same event.
                if let Some(f) = self.value_updated.as_mut() {
                    let value = characteristic.value.as_deref().unwrap_or(&[]);
                    f(&characteristic.uuid, value, error.as_ref());
                }
                if let Some(f) = self.device_value_updated.as_mut() {
                    f(&device, &characteristic, error.as_ref());
                }
            }
            Notice::WriteAcknowledged(characteristic, error) => {
                if let Some(f) = self.write_acknowledged.as_mut() {
                    f(&characteristic, error.as_ref());
                }
            }
            Notice::SubscriptionChanged(characteristic, error) => {
                if let Some(f) = self.subscription_changed.as_mut() {
                    f(&characteristic, error.as_ref());
                }
            }
            Notice::NameChanged(device) => {
                if let Some(f) = self.name_changed.as_mut() {
                    f(&device);
                }
            }
            Notice::ServicesInvalidated(device) => {
                if let Some(f) = self.services_invalidated.as_mut() {
                    f(&device);
                }
            }
        }
    }
}

/// Pending notification, produced under the session lock and dispatched once
/// the lock is released. Carries owned snapshots so handlers never observe
/// the live state.
#[derive(Debug)]
pub(crate) enum Notice {
    ScanComplete(Vec<Device>),
    Connected(Device),
    Disconnected(Device, Option<Error>),
    ConnectFailed(Device, Option<Error>),
    CharacteristicsReady(Service),
    StateChanged(RadioStatus),
    DeviceSeen(Device),
    ValueUpdated {
        device: Device,
        characteristic: Characteristic,
        error: Option<Error>,
    },
    WriteAcknowledged(Characteristic, Option<Error>),
    SubscriptionChanged(Characteristic, Option<Error>),
    NameChanged(Device),
    ServicesInvalidated(Device),
}
