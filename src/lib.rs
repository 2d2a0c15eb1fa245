//! Event-driven BLE central session management.
//!
//! This library mediates between a radio driver and a consuming application:
//! it turns the driver's raw event stream into a disciplined lifecycle with
//! one scan session at a time, one connection target at a time, automatic
//! service discovery after connecting, and an orderly
//! unsubscribe-then-disconnect teardown.
//!
//! The consumer registers only the notifications it cares about and decides
//! which discovered characteristics to read, write or subscribe to; the
//! session never interprets identities or payloads.
//!
//! ## Usage
//!
//! Scan for a few seconds and print everything that was found:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blelink::{BtleRadio, Error, ScanConfig, Session, SessionCallbacks};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     pretty_env_logger::init();
//!
//!     let (radio, events) = BtleRadio::new(0).await?;
//!     let session = Arc::new(Session::new(radio));
//!
//!     let starter = session.clone();
//!     session.set_callbacks(
//!         SessionCallbacks::new()
//!             .on_state_changed(move |status| {
//!                 if status.is_ready() {
//!                     starter.start_scan(ScanConfig::default());
//!                 }
//!             })
//!             .on_scan_complete(|devices| {
//!                 for device in devices {
//!                     println!("{}: {:?}", device.id, device.name);
//!                 }
//!             }),
//!     );
//!
//!     // Pump driver events until the stream ends.
//!     session.drive(events).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, future_incompatible, nonstandard_style, rust_2018_idioms)]

pub use btle::BtleRadio;
pub use callbacks::SessionCallbacks;
pub use device::{Characteristic, ConnectionState, Device, Service};
pub use error::{Error, Result};
pub use monitor::RadioStatus;
pub use radio::{Advertisement, DeviceId, Radio, RadioCommand, RadioEvent};
pub use scanner::{ScanConfig, DEFAULT_SCAN_TIMEOUT};
pub use session::Session;

mod btle;
mod callbacks;
mod connection;
mod device;
mod discovery;
mod error;
mod monitor;
mod radio;
mod scanner;
mod session;

pub mod common;
