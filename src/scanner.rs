use std::time::{Duration, Instant};

use log::{debug, info, trace};
use uuid::Uuid;

use crate::callbacks::Notice;
use crate::device::Device;
use crate::radio::{Advertisement, DeviceId, Radio, RadioCommand};

/// Default scan duration when the consumer does not pick one.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for a single scan session.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Advertised services a device must carry to be reported. Empty matches
    /// all devices.
    services: Vec<Uuid>,
    /// Scanning is stopped and the discovered set reported when this expires.
    timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

impl ScanConfig {
    /// Match only devices advertising the given service.
    pub fn filter_by_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    /// Match only devices advertising any of the given services.
    pub fn filter_by_services(mut self, services: impl IntoIterator<Item = Uuid>) -> Self {
        self.services.extend(services);
        self
    }

    /// Stop the scan after the given duration.
    pub fn stop_after_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Why a scan session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    ExplicitStop,
    TimeoutFired,
}

/// Owns the time-bounded discovery session and the discovered-device set.
///
/// At most one session is active at a time; the coordinator enforces that
/// locally before touching its own slot.
pub(crate) struct ScanCoordinator {
    devices: Vec<Device>,
    active: bool,
    /// Set once the first scan has run. Later scans accumulate into the
    /// existing set instead of clearing it.
    scanned_once: bool,
    deadline: Option<Instant>,
}

impl ScanCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            devices: Vec::new(),
            active: false,
            scanned_once: false,
            deadline: None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub(crate) fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == *id)
    }

    pub(crate) fn device_mut(&mut self, id: &DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == *id)
    }

    /// Starts a scan session. A no-op while the radio is not ready or a
    /// session is already active.
    pub(crate) fn start(&mut self, config: ScanConfig, ready: bool, radio: &dyn Radio) -> bool {
        if !ready {
            debug!("Not scanning: radio is not ready");
            return false;
        }
        if self.active {
            debug!("Not scanning: a scan session is already active");
            return false;
        }

        if !self.scanned_once {
            self.devices.clear();
            self.scanned_once = true;
        }

        self.active = true;
        self.deadline = Some(Instant::now() + config.timeout);

        info!("Scanning started (timeout {:?})", config.timeout);
        radio.deliver(RadioCommand::StartScan {
            services: config.services,
            allow_duplicates: true,
        });
        true
    }

    /// Ends the active session. Idempotent.
    pub(crate) fn stop(&mut self, reason: StopReason, radio: &dyn Radio) {
        if !self.active {
            trace!("Scanner is already stopped");
            return;
        }
        self.active = false;
        self.deadline = None;

        info!("Scanning stopped ({:?})", reason);
        radio.deliver(RadioCommand::StopScan);
    }

    /// Marks the session inactive without issuing radio primitives. Used when
    /// the radio itself went away.
    pub(crate) fn deactivate(&mut self) {
        self.active = false;
        self.deadline = None;
    }

    /// Records a device-seen event. Returns a snapshot of the device when the
    /// identity is new; a refresh of a known identity updates in place and
    /// returns `None` so no duplicate-discovery notification fires.
    pub(crate) fn device_seen(
        &mut self,
        id: DeviceId,
        name: Option<String>,
        advertisement: Advertisement,
        rssi: Option<i16>,
    ) -> Option<Device> {
        if let Some(known) = self.devices.iter_mut().find(|d| d.id == id) {
            if name.is_some() {
                known.name = name;
            }
            known.advertisement = advertisement;
            known.rssi = rssi;
            return None;
        }

        trace!("Discovered {}", id);
        let device = Device::new(id, name, advertisement, rssi);
        self.devices.push(device.clone());
        Some(device)
    }

    /// Deadline expiry: stop the session and report the full discovered set.
    pub(crate) fn on_timeout(&mut self, radio: &dyn Radio, notices: &mut Vec<Notice>) {
        if !self.active {
            return;
        }
        self.stop(StopReason::TimeoutFired, radio);
        notices.push(Notice::ScanComplete(self.devices.clone()));
    }
}
