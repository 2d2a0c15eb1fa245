//! Finds the first device advertising the heart rate service, connects to it
//! and listens for heart rate measurements.

use std::sync::Arc;

use blelink::common::{characteristics::HEART_RATE_MEASUREMENT, services::HEART_RATE};
use blelink::{BtleRadio, Error, ScanConfig, Session, SessionCallbacks};
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let (radio, events) = BtleRadio::new(0).await?;
    let session = Arc::new(Session::new(radio));

    let starter = session.clone();
    let selector = session.clone();
    let subscriber = session.clone();
    session.set_callbacks(
        SessionCallbacks::new()
            .on_state_changed(move |status| {
                if status.is_ready() {
                    starter.start_scan(ScanConfig::default().filter_by_service(HEART_RATE));
                }
            })
            .on_scan_complete(move |devices| match devices.first() {
                Some(device) => selector.connect(&device.id),
                None => println!("No heart rate sensors around"),
            })
            .on_characteristics_ready(move |_, characteristics| {
                if characteristics
                    .iter()
                    .any(|c| c.uuid == HEART_RATE_MEASUREMENT)
                {
                    subscriber.set_notify(&HEART_RATE_MEASUREMENT, true);
                }
            })
            .on_device_value_updated(|device, characteristic, _| {
                if characteristic.uuid == HEART_RATE_MEASUREMENT {
                    println!(
                        "{} (rssi {:?}): {:?}",
                        device.id, device.rssi, characteristic.value
                    );
                }
            }),
    );

    let pump = session.clone();
    let driver = tokio::spawn(async move { pump.drive(events).await });

    sleep(Duration::from_secs(30)).await;

    // Teardown drains the subscription before disconnecting.
    session.cleanup();
    sleep(Duration::from_secs(1)).await;

    driver.abort();
    Ok(())
}
