//! Structured, fatal errors surfaced to the caller. Unlike the
//! per-symbol malformed-input conditions the decoder tolerates and
//! logs (see [`crate::decoder`]), these abort `open`/`data_start`
//! outright.
//!
//! Rust's ownership model gives us the "unwind in reverse order" part
//! for free: everything allocated before the failing step is dropped
//! in reverse declaration order as the `Result::Err` unwinds out of
//! `open`/`data_start`, so there is no manual teardown list to get out
//! of sync.

/// Errors that can occur while probing and opening a device via
/// `Device::open`.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The device's logic revision is older than this core requires.
    #[error("logic revision {found} is older than the minimum required revision {required}")]
    LogicRevisionTooOld { found: u32, required: u32 },

    /// A probe through the config channel failed.
    #[error("failed to read device info: {0}")]
    ConfigChannel(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The reset-read scratch buffer or another fixed allocation could
    /// not be made.
    #[error("allocation failed while opening device: {0}")]
    Allocation(String),
}

/// Errors that can occur while starting acquisition via
/// `Device::data_start`.
#[derive(Debug, thiserror::Error)]
pub enum DataStartError {
    /// Acquisition is already running; `data_start` is not
    /// re-entrant.
    #[error("acquisition is already running")]
    AlreadyRunning,

    /// A probe through the config channel failed while reading
    /// initial IMU/APS settings.
    #[error("failed to read initial device settings: {0}")]
    ConfigChannel(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The reset-read scratch buffer, ring, or per-stream packets
    /// could not be allocated.
    #[error("allocation failed while starting acquisition: {0}")]
    Allocation(String),
}
