//! Finds the first device advertising the battery service, connects to it
//! and reads its battery level.

use std::sync::Arc;

use blelink::common::{characteristics::BATTERY_LEVEL, services::BATTERY};
use blelink::{BtleRadio, Error, ScanConfig, Session, SessionCallbacks};
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let (radio, events) = BtleRadio::new(0).await?;
    let session = Arc::new(Session::new(radio));

    let starter = session.clone();
    let selector = session.clone();
    let reader = session.clone();
    let closer = session.clone();
    session.set_callbacks(
        SessionCallbacks::new()
            .on_state_changed(move |status| {
                if status.is_ready() {
                    starter.start_scan(ScanConfig::default().filter_by_service(BATTERY));
                }
            })
            .on_scan_complete(move |devices| {
                // Pick the first match; the session refuses a second target.
                match devices.first() {
                    Some(device) => selector.connect(&device.id),
                    None => println!("No battery-powered devices around"),
                }
            })
            .on_characteristics_ready(move |service, characteristics| {
                if characteristics.iter().any(|c| c.uuid == BATTERY_LEVEL) {
                    println!("Battery service: {}", service.uuid);
                    reader.read_value(&BATTERY_LEVEL);
                }
            })
            .on_value_updated(move |uuid, value, error| {
                if *uuid == BATTERY_LEVEL && error.is_none() {
                    println!("Battery level: {:?}", value.first());
                    closer.cleanup();
                }
            })
            .on_disconnected(|device, _| {
                println!("Disconnected from {}", device.id);
            }),
    );

    let pump = session.clone();
    let driver = tokio::spawn(async move { pump.drive(events).await });

    sleep(Duration::from_secs(15)).await;

    driver.abort();
    Ok(())
}
