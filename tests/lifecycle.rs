//! End-to-end session lifecycle tests against an in-memory radio.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blelink::{
    Advertisement, ConnectionState, DeviceId, Error, Radio, RadioCommand, RadioEvent, RadioStatus,
    ScanConfig, Session, SessionCallbacks,
};
use uuid::Uuid;

const S1: Uuid = Uuid::from_u128(0x180d);
const C1: Uuid = Uuid::from_u128(0x2a37);
const C2: Uuid = Uuid::from_u128(0x2a38);

/// Records every command the session issues, in order.
#[derive(Clone, Default)]
struct FakeRadio {
    sent: Arc<Mutex<Vec<RadioCommand>>>,
}

impl FakeRadio {
    fn commands(&self) -> Vec<RadioCommand> {
        self.sent.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Radio for FakeRadio {
    fn deliver(&self, command: RadioCommand) {
        self.sent.lock().unwrap().push(command);
    }
}

fn ready_session() -> (Session, FakeRadio) {
    let radio = FakeRadio::default();
    let session = Session::new(radio.clone());
    session.handle_event(RadioEvent::StateChanged(RadioStatus::PoweredOn));
    (session, radio)
}

fn seen(session: &Session, id: &str, name: Option<&str>) {
    session.handle_event(RadioEvent::DeviceSeen {
        device: DeviceId::from(id),
        name: name.map(str::to_owned),
        advertisement: Advertisement::default(),
        rssi: Some(-50),
    });
}

/// Brings device `id` to Connected with service S1 and characteristics C1, C2.
fn connected_session(id: &str) -> (Session, FakeRadio, DeviceId) {
    let (session, radio) = ready_session();
    let device = DeviceId::from(id);
    seen(&session, id, Some("sensor"));
    session.connect(&device);
    session.handle_event(RadioEvent::ConnectSucceeded {
        device: device.clone(),
    });
    session.handle_event(RadioEvent::ServicesDiscovered {
        device: device.clone(),
        services: vec![S1],
        error: None,
    });
    session.handle_event(RadioEvent::CharacteristicsDiscovered {
        device: device.clone(),
        service: S1,
        characteristics: vec![C1, C2],
        error: None,
    });
    (session, radio, device)
}

fn subscribed(session: &Session, device: &DeviceId, characteristic: Uuid) {
    session.handle_event(RadioEvent::SubscriptionChanged {
        device: device.clone(),
        characteristic,
        notifying: true,
        error: None,
    });
}

#[test]
fn scan_dedupes_and_reports_batch_at_timeout() {
    let (session, radio) = ready_session();
    let batches: Arc<Mutex<Vec<Vec<(DeviceId, Option<String>)>>>> = Arc::default();

    let sink = batches.clone();
    session.set_callbacks(SessionCallbacks::new().on_scan_complete(move |devices| {
        sink.lock().unwrap().push(
            devices
                .iter()
                .map(|d| (d.id.clone(), d.name.clone()))
                .collect(),
        );
    }));

    session.start_scan(ScanConfig::default().stop_after_timeout(Duration::from_secs(3)));
    seen(&session, "aa", Some("first"));
    seen(&session, "bb", None);
    seen(&session, "aa", Some("renamed"));
    session.handle_scan_timeout();

    let batches = batches.lock().unwrap();
    assert_eq!(
        &batches[..],
        &[vec![
            (DeviceId::from("aa"), Some("renamed".to_string())),
            (DeviceId::from("bb"), None),
        ]]
    );

    let commands = radio.commands();
    assert!(commands.iter().any(|c| matches!(
        c,
        RadioCommand::StartScan {
            allow_duplicates: true,
            ..
        }
    )));
    assert_eq!(commands.last(), Some(&RadioCommand::StopScan));
}

#[test]
fn device_seen_fires_once_per_identity() {
    let (session, _radio) = ready_session();
    let count = Arc::new(Mutex::new(0));

    let sink = count.clone();
    session.set_callbacks(SessionCallbacks::new().on_device_seen(move |_| {
        *sink.lock().unwrap() += 1;
    }));

    session.start_scan(ScanConfig::default());
    seen(&session, "aa", Some("first"));
    seen(&session, "bb", None);
    seen(&session, "aa", Some("renamed"));

    assert_eq!(*count.lock().unwrap(), 2);
    assert_eq!(session.discovered_devices().len(), 2);
}

#[test]
fn start_scan_requires_ready_radio() {
    let radio = FakeRadio::default();
    let session = Session::new(radio.clone());

    session.start_scan(ScanConfig::default());

    assert!(!session.is_scanning());
    assert!(radio.commands().is_empty());
}

#[test]
fn start_scan_is_noop_while_active() {
    let (session, radio) = ready_session();

    session.start_scan(ScanConfig::default());
    session.start_scan(ScanConfig::default());

    let starts = radio
        .commands()
        .iter()
        .filter(|c| matches!(c, RadioCommand::StartScan { .. }))
        .count();
    assert_eq!(starts, 1);
}

#[test]
fn later_scans_accumulate_discovered_devices() {
    let (session, _radio) = ready_session();

    session.start_scan(ScanConfig::default());
    seen(&session, "aa", None);
    session.stop_scan();

    session.start_scan(ScanConfig::default());
    seen(&session, "bb", None);

    assert_eq!(session.discovered_devices().len(), 2);
}

#[test]
fn connect_stops_scan_and_triggers_discovery() {
    let (session, radio) = ready_session();
    let ready: Arc<Mutex<Vec<(Uuid, Vec<Uuid>)>>> = Arc::default();

    let sink = ready.clone();
    session.set_callbacks(
        SessionCallbacks::new().on_characteristics_ready(move |service, characteristics| {
            sink.lock().unwrap().push((
                service.uuid,
                characteristics.iter().map(|c| c.uuid).collect(),
            ));
        }),
    );

    session.start_scan(ScanConfig::default());
    seen(&session, "aa", Some("sensor"));
    let device = DeviceId::from("aa");
    session.connect(&device);

    assert!(!session.is_scanning());
    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Connecting
    );

    session.handle_event(RadioEvent::ConnectSucceeded {
        device: device.clone(),
    });
    assert!(radio.commands().iter().any(|c| matches!(
        c,
        RadioCommand::DiscoverServices { device: d, services: None } if *d == device
    )));

    session.handle_event(RadioEvent::ServicesDiscovered {
        device: device.clone(),
        services: vec![S1],
        error: None,
    });
    assert!(radio.commands().iter().any(|c| matches!(
        c,
        RadioCommand::DiscoverCharacteristics { service, .. } if *service == S1
    )));

    session.handle_event(RadioEvent::CharacteristicsDiscovered {
        device: device.clone(),
        service: S1,
        characteristics: vec![C1, C2],
        error: None,
    });

    assert_eq!(&ready.lock().unwrap()[..], &[(S1, vec![C1, C2])]);
    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Connected
    );
    assert!(session.connected_device().is_some());
}

#[test]
fn connect_is_noop_for_unknown_or_busy_devices() {
    let (session, radio) = ready_session();
    seen(&session, "aa", None);

    session.connect(&DeviceId::from("zz"));
    assert!(radio.commands().is_empty());

    session.connect(&DeviceId::from("aa"));
    session.connect(&DeviceId::from("aa"));

    let connects = radio
        .commands()
        .iter()
        .filter(|c| matches!(c, RadioCommand::Connect(_)))
        .count();
    assert_eq!(connects, 1);
}

#[test]
fn connect_failure_returns_to_disconnected_without_retry() {
    let (session, radio) = ready_session();
    let failures: Arc<Mutex<Vec<Option<Error>>>> = Arc::default();

    let sink = failures.clone();
    session.set_callbacks(SessionCallbacks::new().on_connect_failed(move |_, error| {
        sink.lock().unwrap().push(error.cloned());
    }));

    seen(&session, "aa", None);
    let device = DeviceId::from("aa");
    session.connect(&device);
    session.handle_event(RadioEvent::ConnectFailed {
        device: device.clone(),
        error: Some(Error::ConnectFailed("refused".to_string())),
    });

    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Disconnected
    );
    assert_eq!(
        &failures.lock().unwrap()[..],
        &[Some(Error::ConnectFailed("refused".to_string()))]
    );

    let connects = radio
        .commands()
        .iter()
        .filter(|c| matches!(c, RadioCommand::Connect(_)))
        .count();
    assert_eq!(connects, 1);

    // The slot is free again.
    session.connect(&device);
    let connects = radio
        .commands()
        .iter()
        .filter(|c| matches!(c, RadioCommand::Connect(_)))
        .count();
    assert_eq!(connects, 2);
}

#[test]
fn cleanup_while_disconnected_is_noop() {
    let (session, radio) = ready_session();
    seen(&session, "aa", None);

    session.cleanup();
    assert!(radio.commands().is_empty());
}

#[test]
fn cleanup_drains_one_subscription_per_invocation() {
    let (session, radio, device) = connected_session("aa");
    subscribed(&session, &device, C1);
    subscribed(&session, &device, C2);
    radio.clear();

    // First step cancels exactly one subscription, nothing more.
    session.cleanup();
    assert_eq!(
        radio.commands(),
        vec![RadioCommand::SetNotify {
            device: device.clone(),
            characteristic: C1,
            enabled: false,
        }]
    );

    // Each completed cancellation advances the teardown by one step.
    session.handle_event(RadioEvent::SubscriptionChanged {
        device: device.clone(),
        characteristic: C1,
        notifying: false,
        error: None,
    });
    assert_eq!(
        radio.commands().last(),
        Some(&RadioCommand::SetNotify {
            device: device.clone(),
            characteristic: C2,
            enabled: false,
        })
    );

    session.handle_event(RadioEvent::SubscriptionChanged {
        device: device.clone(),
        characteristic: C2,
        notifying: false,
        error: None,
    });
    assert_eq!(
        radio.commands().last(),
        Some(&RadioCommand::Disconnect(device.clone()))
    );
    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Disconnecting
    );

    session.handle_event(RadioEvent::Disconnected {
        device: device.clone(),
        error: None,
    });
    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Disconnected
    );
    assert!(session.connected_device().is_none());
    // Children are discarded for the next connection to rediscover.
    assert!(session.device(&device).unwrap().services.is_empty());
}

#[test]
fn consumer_unsubscribe_does_not_escalate_to_disconnect() {
    let (session, radio, device) = connected_session("aa");
    subscribed(&session, &device, C1);
    radio.clear();

    session.set_notify(&C1, false);
    session.handle_event(RadioEvent::SubscriptionChanged {
        device: device.clone(),
        characteristic: C1,
        notifying: false,
        error: None,
    });

    assert!(!radio
        .commands()
        .iter()
        .any(|c| matches!(c, RadioCommand::Disconnect(_))));
    assert!(session.connected_device().is_some());
}

#[test]
fn discovery_error_triggers_cleanup() {
    let (session, radio) = ready_session();
    seen(&session, "aa", None);
    let device = DeviceId::from("aa");
    session.connect(&device);
    session.handle_event(RadioEvent::ConnectSucceeded {
        device: device.clone(),
    });
    radio.clear();

    session.handle_event(RadioEvent::ServicesDiscovered {
        device: device.clone(),
        services: Vec::new(),
        error: Some(Error::DiscoveryFailed("gatt timeout".to_string())),
    });

    // Nothing is notifying, so cleanup goes straight to disconnect.
    assert_eq!(
        radio.commands(),
        vec![RadioCommand::Disconnect(device.clone())]
    );
    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Disconnecting
    );
}

#[test]
fn value_updates_reach_both_listener_variants_and_the_model() {
    let (session, _radio, device) = connected_session("aa");
    let by_uuid: Arc<Mutex<Vec<(Uuid, Vec<u8>)>>> = Arc::default();
    let by_device: Arc<Mutex<Vec<(DeviceId, Uuid)>>> = Arc::default();

    let uuid_sink = by_uuid.clone();
    let device_sink = by_device.clone();
    session.set_callbacks(
        SessionCallbacks::new()
            .on_value_updated(move |uuid, value, _| {
                uuid_sink.lock().unwrap().push((*uuid, value.to_vec()));
            })
            .on_device_value_updated(move |device, characteristic, _| {
                device_sink
                    .lock()
                    .unwrap()
                    .push((device.id.clone(), characteristic.uuid));
            }),
    );

    session.handle_event(RadioEvent::ValueUpdated {
        device: device.clone(),
        characteristic: C1,
        value: vec![0x42],
        error: None,
    });

    assert_eq!(&by_uuid.lock().unwrap()[..], &[(C1, vec![0x42])]);
    assert_eq!(&by_device.lock().unwrap()[..], &[(device.clone(), C1)]);
    assert_eq!(
        session
            .device(&device)
            .unwrap()
            .characteristic(&C1)
            .unwrap()
            .value,
        Some(vec![0x42])
    );
}

#[test]
fn write_acknowledgement_carries_the_error() {
    let (session, _radio, device) = connected_session("aa");
    let acks: Arc<Mutex<Vec<(Uuid, Option<Error>)>>> = Arc::default();

    let sink = acks.clone();
    session.set_callbacks(
        SessionCallbacks::new().on_write_acknowledged(move |characteristic, error| {
            sink.lock()
                .unwrap()
                .push((characteristic.uuid, error.cloned()));
        }),
    );

    session.handle_event(RadioEvent::WriteAcknowledged {
        device: device.clone(),
        characteristic: C1,
        error: None,
    });
    session.handle_event(RadioEvent::WriteAcknowledged {
        device,
        characteristic: C1,
        error: Some(Error::RequestFailed("not permitted".to_string())),
    });

    assert_eq!(
        &acks.lock().unwrap()[..],
        &[
            (C1, None),
            (C1, Some(Error::RequestFailed("not permitted".to_string()))),
        ]
    );
}

#[test]
fn characteristic_requests_require_a_connected_target() {
    let (session, radio) = ready_session();
    seen(&session, "aa", None);

    // No target at all.
    session.read_value(&C1);
    session.write_value(&C1, &[1], true);
    session.set_notify(&C1, true);
    assert!(radio.commands().is_empty());

    let (session, radio, _device) = connected_session("aa");
    radio.clear();

    // Unknown characteristic on the target.
    session.read_value(&Uuid::from_u128(0xdead));
    assert!(radio.commands().is_empty());

    session.write_value(&C1, &[1, 2], true);
    assert!(matches!(
        radio.commands().last(),
        Some(RadioCommand::WriteValue { with_response: true, .. })
    ));
}

#[test]
fn replacing_the_listener_affects_subsequent_events_only() {
    let (session, _radio) = ready_session();
    let first = Arc::new(Mutex::new(0));
    let second = Arc::new(Mutex::new(0));

    let sink = first.clone();
    session.set_callbacks(SessionCallbacks::new().on_device_seen(move |_| {
        *sink.lock().unwrap() += 1;
    }));
    seen(&session, "aa", None);

    let sink = second.clone();
    session.set_callbacks(SessionCallbacks::new().on_device_seen(move |_| {
        *sink.lock().unwrap() += 1;
    }));
    seen(&session, "bb", None);

    assert_eq!(*first.lock().unwrap(), 1);
    assert_eq!(*second.lock().unwrap(), 1);
}

#[test]
fn unregistered_callbacks_are_silent() {
    let (session, _radio, device) = connected_session("aa");

    // No callbacks registered at all; every event is absorbed quietly.
    session.handle_event(RadioEvent::NameChanged {
        device: device.clone(),
        name: "renamed".to_string(),
    });
    session.handle_event(RadioEvent::ValueUpdated {
        device: device.clone(),
        characteristic: C1,
        value: vec![1],
        error: None,
    });
    session.handle_event(RadioEvent::ServicesInvalidated { device });
}

#[test]
fn services_invalidated_discards_children() {
    let (session, _radio, device) = connected_session("aa");
    assert!(!session.device(&device).unwrap().services.is_empty());

    session.handle_event(RadioEvent::ServicesInvalidated {
        device: device.clone(),
    });
    assert!(session.device(&device).unwrap().services.is_empty());
}

#[test]
fn radio_power_off_invalidates_scan_and_target() {
    let (session, radio, device) = connected_session("aa");
    radio.clear();

    session.handle_event(RadioEvent::StateChanged(RadioStatus::PoweredOff));

    assert!(!session.is_scanning());
    assert!(session.connected_device().is_none());
    assert_eq!(
        session.device(&device).unwrap().state,
        ConnectionState::Disconnected
    );
    // The adapter is gone; no radio traffic is attempted.
    assert!(radio.commands().is_empty());

    session.start_scan(ScanConfig::default());
    assert!(!session.is_scanning());
}

#[test]
fn drop_tears_the_session_down() {
    let (session, radio, device) = connected_session("aa");
    subscribed(&session, &device, C1);
    radio.clear();

    drop(session);

    // Teardown starts with the active subscription, not the disconnect.
    assert_eq!(
        radio.commands(),
        vec![RadioCommand::SetNotify {
            device,
            characteristic: C1,
            enabled: false,
        }]
    );
}

#[tokio::test]
async fn drive_fires_the_scan_deadline() {
    let radio = FakeRadio::default();
    let session = Arc::new(Session::new(radio.clone()));
    let batches: Arc<Mutex<Vec<usize>>> = Arc::default();

    let sink = batches.clone();
    session.set_callbacks(SessionCallbacks::new().on_scan_complete(move |devices| {
        sink.lock().unwrap().push(devices.len());
    }));

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let pump = session.clone();
    let driver = tokio::spawn(async move {
        pump.drive(tokio_stream::wrappers::UnboundedReceiverStream::new(
            events_rx,
        ))
        .await;
    });

    events_tx
        .send(RadioEvent::StateChanged(RadioStatus::PoweredOn))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.start_scan(ScanConfig::default().stop_after_timeout(Duration::from_millis(100)));
    events_tx
        .send(RadioEvent::DeviceSeen {
            device: DeviceId::from("aa"),
            name: None,
            advertisement: Advertisement::default(),
            rssi: None,
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(&batches.lock().unwrap()[..], &[1]);
    assert!(!session.is_scanning());

    drop(events_tx);
    driver.await.unwrap();
}
