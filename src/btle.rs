use std::collections::{HashMap, HashSet};
use std::pin::Pin;

use btleplug::api::{
    Central, CentralEvent, Characteristic as BtleCharacteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use log::{debug, error, trace, warn};
use stream_cancel::{Trigger, Valved};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::radio::{Advertisement, DeviceId, Radio, RadioCommand, RadioEvent};
use crate::{Error, RadioStatus, Result};

/// Production [`Radio`] backed by btleplug.
///
/// Commands are queued onto a driver task that owns the adapter; completions
/// and peripheral events come back on the stream returned by [`new`](Self::new).
/// Cloning is cheap and every clone feeds the same driver.
#[derive(Clone)]
pub struct BtleRadio {
    commands: mpsc::UnboundedSender<RadioCommand>,
}

impl Radio for BtleRadio {
    fn deliver(&self, command: RadioCommand) {
        if self.commands.send(command).is_err() {
            warn!("Radio driver is gone, dropping command");
        }
    }
}

impl BtleRadio {
    /// Acquires the given adapter and spawns the driver task. Must run
    /// inside a tokio runtime.
    pub async fn new(
        adapter_index: usize,
    ) -> Result<(Self, impl Stream<Item = RadioEvent> + Send + Unpin)> {
        let manager = Manager::new().await.map_err(|e| {
            error!("Could not acquire BLE manager: {}", e);
            Error::RadioUnavailable(RadioStatus::Unknown)
        })?;
        let mut adapters = manager.adapters().await.map_err(|e| {
            error!("Could not enumerate adapters: {}", e);
            Error::RadioUnavailable(RadioStatus::Unknown)
        })?;

        if adapter_index >= adapters.len() {
            return Err(Error::RadioUnavailable(RadioStatus::Unsupported));
        }
        let adapter = adapters.swap_remove(adapter_index);

        trace!("Using adapter: {:?}", adapter);

        let central_events = adapter.events().await.map_err(|e| {
            error!("Could not open adapter event stream: {}", e);
            Error::RadioUnavailable(RadioStatus::Unknown)
        })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // btleplug does not surface adapter power transitions; the adapter
        // we just acquired is usable, report it as such.
        event_tx
            .send(RadioEvent::StateChanged(RadioStatus::PoweredOn))
            .ok();

        let link = Link {
            _manager: manager,
            adapter,
            peripherals: HashMap::new(),
            pumps: HashMap::new(),
            expected_disconnects: HashSet::new(),
            events: event_tx,
        };
        tokio::spawn(link.run(command_rx, central_events));

        Ok((
            Self {
                commands: command_tx,
            },
            UnboundedReceiverStream::new(event_rx),
        ))
    }
}

/// Driver task state: owns the adapter, the peripheral handles and the
/// per-peripheral notification pumps.
struct Link {
    _manager: Manager,
    adapter: Adapter,
    peripherals: HashMap<DeviceId, Peripheral>,
    /// Dropping a trigger stops that peripheral's notification pump.
    pumps: HashMap<DeviceId, Trigger>,
    /// Devices we were asked to disconnect; anything else that drops the
    /// link is reported as a connection loss.
    expected_disconnects: HashSet<DeviceId>,
    events: mpsc::UnboundedSender<RadioEvent>,
}

fn device_id(peripheral: &Peripheral) -> DeviceId {
    DeviceId::new(peripheral.address().to_string())
}

impl Link {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<RadioCommand>,
        mut central_events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = central_events.next() => match event {
                    Some(event) => self.handle_central_event(event).await,
                    None => break,
                },
            }
        }
        debug!("Radio driver stopped");
    }

    async fn handle_command(&mut self, command: RadioCommand) {
        trace!("Radio command: {:?}", command);
        match command {
            RadioCommand::StartScan { services, .. } => {
                // Duplicate advertisements always flow; the session
                // deduplicates by identity.
                if let Err(e) = self.adapter.start_scan(ScanFilter { services }).await {
                    warn!("Could not start scan: {}", e);
                }
            }
            RadioCommand::StopScan => {
                if let Err(e) = self.adapter.stop_scan().await {
                    warn!("Could not stop scan: {}", e);
                }
            }
            RadioCommand::Connect(device) => {
                let peripheral = match self.peripheral(&device) {
                    Some(peripheral) => peripheral,
                    None => {
                        self.emit(RadioEvent::ConnectFailed {
                            device,
                            error: Some(Error::ConnectFailed("unknown device".to_string())),
                        });
                        return;
                    }
                };
                let events = self.events.clone();
                // Connect in another task, so the driver keeps serving
                // commands meanwhile. Success comes back as a central event.
                tokio::spawn(async move {
                    if let Err(e) = peripheral.connect().await {
                        warn!("Could not connect to {}: {:?}", peripheral.address(), e);
                        events
                            .send(RadioEvent::ConnectFailed {
                                device,
                                error: Some(Error::ConnectFailed(e.to_string())),
                            })
                            .ok();
                    }
                });
            }
            RadioCommand::Disconnect(device) => {
                let peripheral = match self.peripheral(&device) {
                    Some(peripheral) => peripheral,
                    None => return,
                };
                self.expected_disconnects.insert(device);
                tokio::spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        warn!("Could not disconnect {}: {:?}", peripheral.address(), e);
                    }
                });
            }
            RadioCommand::DiscoverServices { device, .. } => {
                let peripheral = match self.peripheral(&device) {
                    Some(peripheral) => peripheral,
                    None => return,
                };
                let events = self.events.clone();
                tokio::spawn(async move {
                    let event = match peripheral.discover_services().await {
                        Ok(()) => RadioEvent::ServicesDiscovered {
                            device,
                            services: peripheral.services().into_iter().map(|s| s.uuid).collect(),
                            error: None,
                        },
                        Err(e) => RadioEvent::ServicesDiscovered {
                            device,
                            services: Vec::new(),
                            error: Some(Error::DiscoveryFailed(e.to_string())),
                        },
                    };
                    events.send(event).ok();
                });
            }
            RadioCommand::DiscoverCharacteristics {
                device, service, ..
            } => {
                let peripheral = match self.peripheral(&device) {
                    Some(peripheral) => peripheral,
                    None => return,
                };
                let events = self.events.clone();
                tokio::spawn(async move {
                    // Characteristics were pulled in along with service
                    // discovery; report the requested service's slice.
                    let characteristics = peripheral
                        .services()
                        .into_iter()
                        .find(|s| s.uuid == service)
                        .map(|s| s.characteristics.into_iter().map(|c| c.uuid).collect())
                        .unwrap_or_default();
                    events
                        .send(RadioEvent::CharacteristicsDiscovered {
                            device,
                            service,
                            characteristics,
                            error: None,
                        })
                        .ok();
                });
            }
            RadioCommand::ReadValue {
                device,
                characteristic,
            } => {
                let (peripheral, target) = match self.characteristic(&device, &characteristic) {
                    Some(found) => found,
                    None => return,
                };
                let events = self.events.clone();
                tokio::spawn(async move {
                    let event = match peripheral.read(&target).await {
                        Ok(value) => RadioEvent::ValueUpdated {
                            device,
                            characteristic,
                            value,
                            error: None,
                        },
                        Err(e) => RadioEvent::ValueUpdated {
                            device,
                            characteristic,
                            value: Vec::new(),
                            error: Some(Error::RequestFailed(e.to_string())),
                        },
                    };
                    events.send(event).ok();
                });
            }
            RadioCommand::WriteValue {
                device,
                characteristic,
                value,
                with_response,
            } => {
                let (peripheral, target) = match self.characteristic(&device, &characteristic) {
                    Some(found) => found,
                    None => return,
                };
                let events = self.events.clone();
                let write_type = if with_response {
                    WriteType::WithResponse
                } else {
                    WriteType::WithoutResponse
                };
                tokio::spawn(async move {
                    match peripheral.write(&target, &value, write_type).await {
                        // Acknowledgements exist for with-response writes only.
                        Ok(()) if with_response => {
                            events
                                .send(RadioEvent::WriteAcknowledged {
                                    device,
                                    characteristic,
                                    error: None,
                                })
                                .ok();
                        }
                        Ok(()) => {}
                        Err(e) => {
                            events
                                .send(RadioEvent::WriteAcknowledged {
                                    device,
                                    characteristic,
                                    error: Some(Error::RequestFailed(e.to_string())),
                                })
                                .ok();
                        }
                    }
                });
            }
            RadioCommand::SetNotify {
                device,
                characteristic,
                enabled,
            } => {
                let (peripheral, target) = match self.characteristic(&device, &characteristic) {
                    Some(found) => found,
                    None => return,
                };
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = if enabled {
                        peripheral.subscribe(&target).await
                    } else {
                        peripheral.unsubscribe(&target).await
                    };
                    let event = match result {
                        Ok(()) => RadioEvent::SubscriptionChanged {
                            device,
                            characteristic,
                            notifying: enabled,
                            error: None,
                        },
                        // The subscription state did not change.
                        Err(e) => RadioEvent::SubscriptionChanged {
                            device,
                            characteristic,
                            notifying: !enabled,
                            error: Some(Error::RequestFailed(e.to_string())),
                        },
                    };
                    events.send(event).ok();
                });
            }
        }
    }

    async fn handle_central_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(peripheral_id)
            | CentralEvent::DeviceUpdated(peripheral_id) => {
                if let Ok(peripheral) = self.adapter.peripheral(&peripheral_id).await {
                    self.on_device_seen(peripheral).await;
                }
            }
            CentralEvent::DeviceConnected(peripheral_id) => {
                if let Ok(peripheral) = self.adapter.peripheral(&peripheral_id).await {
                    let device = device_id(&peripheral);
                    trace!("Device connected: {}", device);
                    self.start_notification_pump(device.clone(), peripheral).await;
                    self.emit(RadioEvent::ConnectSucceeded { device });
                }
            }
            CentralEvent::DeviceDisconnected(peripheral_id) => {
                if let Ok(peripheral) = self.adapter.peripheral(&peripheral_id).await {
                    let device = device_id(&peripheral);
                    trace!("Device disconnected: {}", device);
                    self.pumps.remove(&device);
                    let error = if self.expected_disconnects.remove(&device) {
                        None
                    } else {
                        Some(Error::ConnectionLost("link dropped".to_string()))
                    };
                    self.emit(RadioEvent::Disconnected { device, error });
                }
            }
            _ => {}
        }
    }

    async fn on_device_seen(&mut self, peripheral: Peripheral) {
        let device = device_id(&peripheral);
        let properties = peripheral.properties().await.ok().flatten();
        self.peripherals.insert(device.clone(), peripheral);

        let (name, advertisement, rssi) = match properties {
            Some(props) => (
                props.local_name,
                Advertisement {
                    manufacturer_data: props.manufacturer_data,
                    service_data: props.service_data,
                    services: props.services,
                },
                props.rssi,
            ),
            None => (None, Advertisement::default(), None),
        };

        self.emit(RadioEvent::DeviceSeen {
            device,
            name,
            advertisement,
            rssi,
        });
    }

    /// Forwards the peripheral's notifications as value updates until the
    /// device disconnects.
    async fn start_notification_pump(&mut self, device: DeviceId, peripheral: Peripheral) {
        let notifications = match peripheral.notifications().await {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!("Could not open notifications for {}: {}", device, e);
                return;
            }
        };
        let (trigger, mut notifications) = Valved::new(notifications);
        self.pumps.insert(device.clone(), trigger);

        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                events
                    .send(RadioEvent::ValueUpdated {
                        device: device.clone(),
                        characteristic: notification.uuid,
                        value: notification.value,
                        error: None,
                    })
                    .ok();
            }
            trace!("Notification pump stopped");
        });
    }

    fn peripheral(&self, device: &DeviceId) -> Option<Peripheral> {
        let peripheral = self.peripherals.get(device).cloned();
        if peripheral.is_none() {
            warn!("Unknown device {}", device);
        }
        peripheral
    }

    fn characteristic(
        &self,
        device: &DeviceId,
        uuid: &Uuid,
    ) -> Option<(Peripheral, BtleCharacteristic)> {
        let peripheral = self.peripheral(device)?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == *uuid);
        if characteristic.is_none() {
            warn!("Unknown characteristic {} on {}", uuid, device);
        }
        characteristic.map(|characteristic| (peripheral, characteristic))
    }

    fn emit(&self, event: RadioEvent) {
        self.events.send(event).ok();
    }
}
