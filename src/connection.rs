use log::{debug, trace, warn};

use crate::callbacks::Notice;
use crate::device::{ConnectionState, Device};
use crate::radio::{DeviceId, Radio, RadioCommand};
use crate::scanner::{ScanCoordinator, StopReason};
use crate::Error;

/// Owns the single in-flight connection target and drives the
/// connect/disconnect/fail transitions.
///
/// Teardown is folded in here as well: `cleanup` cancels one active
/// subscription per invocation and disconnects once none remain, so a
/// disconnect is never issued while a subscription teardown is still in
/// flight.
pub(crate) struct ConnectionManager {
    target: Option<DeviceId>,
    /// True while an orderly teardown is draining subscriptions. Scoped so a
    /// consumer's ordinary unsubscribe never escalates into a disconnect.
    cleaning: bool,
}

impl ConnectionManager {
    pub(crate) fn new() -> Self {
        Self {
            target: None,
            cleaning: false,
        }
    }

    pub(crate) fn target(&self) -> Option<&DeviceId> {
        self.target.as_ref()
    }

    pub(crate) fn is_cleaning(&self) -> bool {
        self.cleaning
    }

    /// Starts a connection attempt. A no-op unless the target slot is free
    /// and the device is exactly `Disconnected`.
    pub(crate) fn connect(
        &mut self,
        id: &DeviceId,
        scanner: &mut ScanCoordinator,
        radio: &dyn Radio,
    ) {
        if let Some(current) = self.target.as_ref() {
            warn!("Not connecting to {}: {} is already targeted", id, current);
            return;
        }
        match scanner.device_mut(id) {
            Some(device) if device.state == ConnectionState::Disconnected => {
                device.state = ConnectionState::Connecting;
            }
            Some(device) => {
                warn!("Not connecting to {}: state is {:?}", id, device.state);
                return;
            }
            None => {
                warn!("Not connecting to {}: unknown device", id);
                return;
            }
        }
        self.target = Some(id.clone());

        // Scanning while connecting causes radio contention.
        scanner.stop(StopReason::ExplicitStop, radio);

        debug!("Connecting to {}", id);
        radio.deliver(RadioCommand::Connect(id.clone()));
    }

    /// Connect completion. Returns a snapshot for the consumer notification
    /// when the event matches the in-flight target.
    pub(crate) fn on_connect_succeeded(
        &mut self,
        id: &DeviceId,
        scanner: &mut ScanCoordinator,
    ) -> Option<Device> {
        if self.target.as_ref() != Some(id) {
            trace!("Ignoring connect success for untargeted {}", id);
            return None;
        }
        let device = scanner.device_mut(id)?;
        device.state = ConnectionState::Connected;
        debug!("Connected to {}", id);
        Some(device.clone())
    }

    pub(crate) fn on_connect_failed(
        &mut self,
        id: &DeviceId,
        error: Option<Error>,
        scanner: &mut ScanCoordinator,
        notices: &mut Vec<Notice>,
    ) {
        if self.target.as_ref() != Some(id) {
            trace!("Ignoring connect failure for untargeted {}", id);
            return;
        }
        self.target = None;
        self.cleaning = false;

        if let Some(device) = scanner.device_mut(id) {
            device.state = ConnectionState::Disconnected;
            device.invalidate_services();
            warn!("Failed to connect to {}: {:?}", id, error);
            notices.push(Notice::ConnectFailed(device.clone(), error));
        }
    }

    /// Disconnect completion, whether consumer-initiated or link-dropped.
    pub(crate) fn on_disconnected(
        &mut self,
        id: &DeviceId,
        error: Option<Error>,
        scanner: &mut ScanCoordinator,
        notices: &mut Vec<Notice>,
    ) {
        if self.target.as_ref() == Some(id) {
            self.target = None;
            self.cleaning = false;
        }
        if let Some(device) = scanner.device_mut(id) {
            device.state = ConnectionState::Disconnected;
            device.invalidate_services();
            debug!("Disconnected from {}", id);
            notices.push(Notice::Disconnected(device.clone(), error));
        }
    }

    /// Orderly teardown, one step per invocation. Safe to call from any
    /// state; does nothing unless the target is exactly `Connected`.
    ///
    /// Cancelling a subscription is asynchronous, so only one cancellation is
    /// issued per call; the subscription-state-changed handler re-invokes
    /// this until no notifying characteristic remains, then the disconnect
    /// primitive goes out.
    pub(crate) fn cleanup(&mut self, scanner: &mut ScanCoordinator, radio: &dyn Radio) {
        let id = match self.target.as_ref() {
            Some(id) => id.clone(),
            None => {
                trace!("Nothing to clean up");
                return;
            }
        };
        let device = match scanner.device_mut(&id) {
            Some(device) => device,
            None => return,
        };
        if device.state != ConnectionState::Connected {
            trace!("Not cleaning up {}: state is {:?}", id, device.state);
            return;
        }
        self.cleaning = true;

        if let Some(characteristic) = device.first_notifying() {
            let uuid = characteristic.uuid;
            debug!("Cancelling notifications for {} on {}", uuid, id);
            radio.deliver(RadioCommand::SetNotify {
                device: id,
                characteristic: uuid,
                enabled: false,
            });
            return;
        }

        device.state = ConnectionState::Disconnecting;
        debug!("No subscriptions left, disconnecting {}", id);
        radio.deliver(RadioCommand::Disconnect(id));
    }

    /// Drops the target without radio traffic. Used when the adapter itself
    /// became unavailable.
    pub(crate) fn invalidate(&mut self, scanner: &mut ScanCoordinator) {
        if let Some(id) = self.target.take() {
            self.cleaning = false;
            if let Some(device) = scanner.device_mut(&id) {
                device.state = ConnectionState::Disconnected;
                device.invalidate_services();
            }
        }
    }
}
