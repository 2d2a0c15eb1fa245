use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::{Stream, StreamExt};
use log::{trace, warn};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::callbacks::{Notice, SessionCallbacks};
use crate::connection::ConnectionManager;
use crate::device::{ConnectionState, Device};
use crate::monitor::{RadioStateMonitor, RadioStatus};
use crate::radio::{DeviceId, Radio, RadioCommand, RadioEvent};
use crate::scanner::{ScanConfig, ScanCoordinator, StopReason};

/// Mediates between a radio driver and a consuming application.
///
/// A session turns the driver's raw event stream into a disciplined
/// lifecycle: one scan session at a time, one connection target at a time,
/// and an orderly unsubscribe-then-disconnect teardown no matter where a
/// failure occurs. It is an explicitly constructed, explicitly owned object;
/// share it with an `Arc` where needed.
///
/// Events are applied serially through [`handle_event`](Self::handle_event),
/// normally by the [`drive`](Self::drive) pump. All radio primitives are
/// fire-and-forget; their completions come back as further events.
pub struct Session {
    state: Mutex<SessionState>,
    callbacks: Mutex<SessionCallbacks>,
    /// Pokes the pump whenever the scan deadline changes.
    wake: Notify,
}

pub(crate) struct SessionState {
    pub(crate) radio: Arc<dyn Radio>,
    pub(crate) monitor: RadioStateMonitor,
    pub(crate) scanner: ScanCoordinator,
    pub(crate) connection: ConnectionManager,
}

impl Session {
    pub fn new(radio: impl Radio + 'static) -> Self {
        Self {
            state: Mutex::new(SessionState {
                radio: Arc::new(radio),
                monitor: RadioStateMonitor::new(),
                scanner: ScanCoordinator::new(),
                connection: ConnectionManager::new(),
            }),
            callbacks: Mutex::new(SessionCallbacks::default()),
            wake: Notify::new(),
        }
    }

    /// Replaces the listener slot. Takes effect for subsequent events only;
    /// there is no retroactive delivery.
    pub fn set_callbacks(&self, callbacks: SessionCallbacks) {
        *self.callbacks.lock().unwrap() = callbacks;
    }

    pub fn radio_status(&self) -> RadioStatus {
        self.state.lock().unwrap().monitor.status()
    }

    /// Whether the adapter can currently scan and connect.
    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().monitor.is_ready()
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().unwrap().scanner.is_active()
    }

    /// Starts a scan session. Silently does nothing while the radio is not
    /// ready or a session is already active; stop the old session first.
    pub fn start_scan(&self, config: ScanConfig) {
        let mut state = self.state.lock().unwrap();
        let ready = state.monitor.is_ready();
        let st = &mut *state;
        if st.scanner.start(config, ready, &*st.radio) {
            self.wake.notify_one();
        }
    }

    /// Stops the active scan session, if any. Idempotent.
    pub fn stop_scan(&self) {
        {
            let mut state = self.state.lock().unwrap();
            let st = &mut *state;
            st.scanner.stop(StopReason::ExplicitStop, &*st.radio);
        }
        self.wake.notify_one();
    }

    /// Snapshot of the devices discovered so far.
    pub fn discovered_devices(&self) -> Vec<Device> {
        self.state.lock().unwrap().scanner.devices().to_vec()
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.state.lock().unwrap().scanner.device(id).cloned()
    }

    /// The current target, if its connection is established.
    pub fn connected_device(&self) -> Option<Device> {
        let state = self.state.lock().unwrap();
        let id = state.connection.target()?.clone();
        state
            .scanner
            .device(&id)
            .filter(|d| d.state == ConnectionState::Connected)
            .cloned()
    }

    /// Starts a connection attempt towards a discovered device. Silently
    /// does nothing unless the device is known and exactly disconnected and
    /// no other device is targeted. Stops any active scan first.
    pub fn connect(&self, id: &DeviceId) {
        {
            let mut state = self.state.lock().unwrap();
            let st = &mut *state;
            st.connection.connect(id, &mut st.scanner, &*st.radio);
        }
        self.wake.notify_one();
    }

    /// Orderly teardown of the current connection: cancels active
    /// subscriptions one at a time, then disconnects. Idempotent and safe to
    /// call from any state.
    pub fn cleanup(&self) {
        let mut state = self.state.lock().unwrap();
        let st = &mut *state;
        st.connection.cleanup(&mut st.scanner, &*st.radio);
    }

    /// Requests a read of a characteristic on the connected device. The
    /// value arrives through the value-updated callbacks.
    pub fn read_value(&self, characteristic: &Uuid) {
        let state = self.state.lock().unwrap();
        if let Some(device) = state.targeted(characteristic) {
            state.radio.deliver(RadioCommand::ReadValue {
                device,
                characteristic: *characteristic,
            });
        }
    }

    /// Writes to a characteristic on the connected device. With
    /// `with_response`, completion arrives through the write-acknowledged
    /// callback.
    pub fn write_value(&self, characteristic: &Uuid, value: &[u8], with_response: bool) {
        let state = self.state.lock().unwrap();
        if let Some(device) = state.targeted(characteristic) {
            state.radio.deliver(RadioCommand::WriteValue {
                device,
                characteristic: *characteristic,
                value: value.to_vec(),
                with_response,
            });
        }
    }

    /// Enables or disables notifications for a characteristic on the
    /// connected device. The notifying flag becomes authoritative once the
    /// subscription-changed callback fires.
    pub fn set_notify(&self, characteristic: &Uuid, enabled: bool) {
        let state = self.state.lock().unwrap();
        if let Some(device) = state.targeted(characteristic) {
            state.radio.deliver(RadioCommand::SetNotify {
                device,
                characteristic: *characteristic,
                enabled,
            });
        }
    }

    /// Applies one raw radio event. Events must be delivered in the order
    /// the driver produced them.
    pub fn handle_event(&self, event: RadioEvent) {
        trace!("Radio event: {:?}", event);
        let mut notices = Vec::new();
        self.state.lock().unwrap().handle_event(event, &mut notices);
        self.dispatch(notices);
    }

    /// Deadline of the active scan session, if any. [`drive`](Self::drive)
    /// turns its expiry into [`handle_scan_timeout`](Self::handle_scan_timeout).
    pub fn scan_deadline(&self) -> Option<Instant> {
        self.state.lock().unwrap().scanner.deadline()
    }

    /// Scan deadline expiry: stops the session and reports the discovered
    /// set through the scan-complete callback. A no-op when no scan is
    /// active, so a stale timer does no harm.
    pub fn handle_scan_timeout(&self) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let st = &mut *state;
            st.scanner.on_timeout(&*st.radio, &mut notices);
        }
        self.dispatch(notices);
    }

    /// Pumps the driver's event stream into the session and fires the scan
    /// deadline. Returns once the stream ends.
    pub async fn drive<S>(&self, mut events: S)
    where
        S: Stream<Item = RadioEvent> + Unpin,
    {
        loop {
            let deadline = self.scan_deadline();
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                // Re-arms the deadline when start_scan/stop_scan ran while
                // this loop was parked on the event stream.
                _ = self.wake.notified() => continue,
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.handle_scan_timeout();
                }
            }
        }
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        let mut callbacks = self.callbacks.lock().unwrap();
        for notice in notices {
            callbacks.dispatch(notice);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        let st = &mut *state;
        st.scanner.stop(StopReason::ExplicitStop, &*st.radio);
        st.connection.cleanup(&mut st.scanner, &*st.radio);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

impl SessionState {
    pub(crate) fn handle_event(&mut self, event: RadioEvent, notices: &mut Vec<Notice>) {
        match event {
            RadioEvent::StateChanged(status) => {
                self.monitor.update(status);
                if !status.is_ready() {
                    // The scan session and connection target die with the
                    // adapter; entities are invalidated without radio traffic.
                    self.scanner.deactivate();
                    self.connection.invalidate(&mut self.scanner);
                }
                notices.push(Notice::StateChanged(status));
            }
            RadioEvent::DeviceSeen {
                device,
                name,
                advertisement,
                rssi,
            } => {
                if let Some(snapshot) = self.scanner.device_seen(device, name, advertisement, rssi)
                {
                    notices.push(Notice::DeviceSeen(snapshot));
                }
            }
            RadioEvent::ConnectSucceeded { device } => {
                if let Some(snapshot) = self.connection.on_connect_succeeded(&device, &mut self.scanner)
                {
                    // A scan started during the connect attempt would contend
                    // with discovery; stop it before going on.
                    self.scanner.stop(StopReason::ExplicitStop, &*self.radio);
                    notices.push(Notice::Connected(snapshot));
                    self.begin_discovery(&device);
                }
            }
            RadioEvent::ConnectFailed { device, error } => {
                self.connection
                    .on_connect_failed(&device, error, &mut self.scanner, notices);
            }
            RadioEvent::Disconnected { device, error } => {
                self.connection
                    .on_disconnected(&device, error, &mut self.scanner, notices);
            }
            RadioEvent::ServicesDiscovered {
                device,
                services,
                error,
            } => {
                self.on_services_discovered(device, services, error);
            }
            RadioEvent::CharacteristicsDiscovered {
                device,
                service,
                characteristics,
                error,
            } => {
                self.on_characteristics_discovered(device, service, characteristics, error, notices);
            }
            RadioEvent::ValueUpdated {
                device,
                characteristic,
                value,
                error,
            } => {
                self.on_value_updated(device, characteristic, value, error, notices);
            }
            RadioEvent::WriteAcknowledged {
                device,
                characteristic,
                error,
            } => {
                if let Some(entry) = self.scanner.device(&device) {
                    if let Some(snapshot) = entry.characteristic(&characteristic).cloned() {
                        notices.push(Notice::WriteAcknowledged(snapshot, error));
                    }
                }
            }
            RadioEvent::SubscriptionChanged {
                device,
                characteristic,
                notifying,
                error,
            } => {
                self.on_subscription_changed(device, characteristic, notifying, error, notices);
            }
            RadioEvent::NameChanged { device, name } => {
                if let Some(entry) = self.scanner.device_mut(&device) {
                    entry.name = Some(name);
                    notices.push(Notice::NameChanged(entry.clone()));
                }
            }
            RadioEvent::ServicesInvalidated { device } => {
                if let Some(entry) = self.scanner.device_mut(&device) {
                    entry.invalidate_services();
                    notices.push(Notice::ServicesInvalidated(entry.clone()));
                }
            }
        }
    }

    fn on_value_updated(
        &mut self,
        device: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<crate::Error>,
        notices: &mut Vec<Notice>,
    ) {
        let entry = match self.scanner.device_mut(&device) {
            Some(entry) => entry,
            None => {
                trace!("Value update for unknown device {}", device);
                return;
            }
        };
        if error.is_none() {
            match entry.characteristic_mut(&characteristic) {
                Some(known) => known.value = Some(value),
                None => {
                    trace!("Value update for unknown characteristic {}", characteristic);
                    return;
                }
            }
        }
        if let Some(snapshot) = entry.characteristic(&characteristic).cloned() {
            notices.push(Notice::ValueUpdated {
                device: entry.clone(),
                characteristic: snapshot,
                error,
            });
        }
    }

    fn on_subscription_changed(
        &mut self,
        device: DeviceId,
        characteristic: Uuid,
        notifying: bool,
        error: Option<crate::Error>,
        notices: &mut Vec<Notice>,
    ) {
        if let Some(entry) = self.scanner.device_mut(&device) {
            if let Some(known) = entry.characteristic_mut(&characteristic) {
                if error.is_none() {
                    known.notifying = notifying;
                }
                notices.push(Notice::SubscriptionChanged(known.clone(), error));
            }
        }
        // Subscription teardown is asynchronous: while a cleanup is in
        // flight, each completed cancellation advances it one step.
        if self.connection.is_cleaning() {
            self.connection.cleanup(&mut self.scanner, &*self.radio);
        }
    }

    fn targeted(&self, characteristic: &Uuid) -> Option<DeviceId> {
        let id = match self.connection.target() {
            Some(id) => id.clone(),
            None => {
                warn!("No connection target for characteristic {}", characteristic);
                return None;
            }
        };
        let device = self.scanner.device(&id)?;
        if device.state != ConnectionState::Connected {
            warn!("Device {} is not connected", id);
            return None;
        }
        if device.characteristic(characteristic).is_none() {
            warn!("Unknown characteristic {} on {}", characteristic, id);
            return None;
        }
        Some(id)
    }
}
