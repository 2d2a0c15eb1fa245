//! Scans for nearby BLE devices and prints the discovered set.

use std::sync::Arc;

use blelink::{BtleRadio, Error, ScanConfig, Session, SessionCallbacks};
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let (radio, events) = BtleRadio::new(0).await?;
    let session = Arc::new(Session::new(radio));

    let starter = session.clone();
    session.set_callbacks(
        SessionCallbacks::new()
            .on_state_changed(move |status| {
                if status.is_ready() {
                    starter.start_scan(ScanConfig::default());
                }
            })
            .on_device_seen(|device| {
                println!("Seen {} ({:?})", device.id, device.name);
            })
            .on_scan_complete(|devices| {
                println!("-- scan complete, {} device(s) --", devices.len());
                for device in devices {
                    println!(
                        "{}  rssi: {:?}  name: {:?}",
                        device.id, device.rssi, device.name
                    );
                }
            }),
    );

    let pump = session.clone();
    let driver = tokio::spawn(async move { pump.drive(events).await });

    sleep(Duration::from_secs(4)).await;

    driver.abort();
    Ok(())
}
