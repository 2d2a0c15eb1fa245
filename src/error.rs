use crate::RadioStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced to the consumer through session callbacks.
///
/// None of these are fatal: every failure is reported through the matching
/// notification and the session can always be restarted with a fresh
/// `connect()` or `start_scan()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The adapter is off, unsupported or unauthorized.
    #[error("radio unavailable: {0}")]
    RadioUnavailable(RadioStatus),

    /// A connection attempt was rejected or timed out in the driver.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Service or characteristic discovery failed on the connected device.
    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The link dropped without a consumer-initiated disconnect.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A read, write or subscription request failed in the driver.
    #[error("request failed: {0}")]
    RequestFailed(String),
}
