//! Service and characteristic enumeration for the connected device.
//!
//! Runs as explicit stages on the session state machine: connect success
//! starts a discover-all-services pass, each discovered service gets a
//! discover-all-characteristics pass, and each completed service is reported
//! to the consumer. Which characteristics to then read, write or subscribe to
//! is entirely the consumer's call; nothing here interprets identities.

use log::{trace, warn};
use uuid::Uuid;

use crate::callbacks::Notice;
use crate::device::{Characteristic, ConnectionState, Service};
use crate::radio::{DeviceId, RadioCommand};
use crate::session::SessionState;
use crate::Error;

impl SessionState {
    pub(crate) fn begin_discovery(&mut self, device: &DeviceId) {
        trace!("Discovering services on {}", device);
        self.radio.deliver(RadioCommand::DiscoverServices {
            device: device.clone(),
            services: None,
        });
    }

    pub(crate) fn on_services_discovered(
        &mut self,
        device: DeviceId,
        services: Vec<Uuid>,
        error: Option<Error>,
    ) {
        if self.connection.target() != Some(&device) {
            trace!("Ignoring services for untargeted {}", device);
            return;
        }
        if let Some(error) = error {
            warn!("Error discovering services on {}: {}", device, error);
            self.connection.cleanup(&mut self.scanner, &*self.radio);
            return;
        }
        {
            let entry = match self.scanner.device_mut(&device) {
                Some(entry) if entry.state == ConnectionState::Connected => entry,
                _ => return,
            };
            entry.services = services
                .iter()
                .map(|uuid| Service {
                    uuid: *uuid,
                    device: device.clone(),
                    characteristics: Vec::new(),
                })
                .collect();
        }
        for service in services {
            trace!("Service found with UUID {}", service);
            self.radio.deliver(RadioCommand::DiscoverCharacteristics {
                device: device.clone(),
                service,
                characteristics: None,
            });
        }
    }

    pub(crate) fn on_characteristics_discovered(
        &mut self,
        device: DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
        error: Option<Error>,
        notices: &mut Vec<Notice>,
    ) {
        if self.connection.target() != Some(&device) {
            trace!("Ignoring characteristics for untargeted {}", device);
            return;
        }
        if let Some(error) = error {
            warn!("Error discovering characteristics on {}: {}", device, error);
            self.connection.cleanup(&mut self.scanner, &*self.radio);
            return;
        }
        let entry = match self.scanner.device_mut(&device) {
            Some(entry) => entry,
            None => return,
        };
        let known = match entry.service_mut(&service) {
            Some(known) => known,
            None => {
                trace!("Characteristics for unknown service {}", service);
                return;
            }
        };
        known.characteristics = characteristics
            .into_iter()
            .map(|uuid| Characteristic {
                uuid,
                service,
                device: device.clone(),
                value: None,
                notifying: false,
            })
            .collect();
        notices.push(Notice::CharacteristicsReady(known.clone()));
    }
}
