//! Event-stream decoder and acquisition core for DAVIS-family DVS/APS/IMU
//! sensors: turns a raw USB bulk byte stream into four typed event
//! streams (polarity, special/control, frame, IMU6), bundled into
//! [`PacketContainer`]s and handed off through a lock-free ring to a
//! consumer thread.
//!
//! Common abbreviations:
//!
//! - DVS: dynamic vision sensor (the asynchronous polarity-event pixels);
//! - APS: active-pixel sensor (the conventional frame-based readout);
//! - IMU: inertial measurement unit (accelerometer + gyroscope + temperature);
//! - ADC: analog-to-digital converter.
//!
//! The crate is organized around the components a caller composes:
//!
//! - [`event`] — the four event record types and [`event::PacketContainer`].
//! - [`geometry`] — static sensor geometry and orientation.
//! - [`config`] — atomic runtime configuration and the [`config::ConfigChannel`]
//!   control-endpoint abstraction.
//! - [`commit`] — packet commit-trigger policy.
//! - [`ring`] — the bounded SPSC exchange between producer and consumer.
//! - [`decoder`] — the byte-stream-to-event state machine.
//! - [`transport`] — the bulk-IN transfer submission pool.
//! - [`error`] — fatal, structured errors from `open`/`data_start`.
//! - [`device`] — the `Device` handle tying the above together.

pub mod commit;
pub mod config;
pub mod decoder;
pub mod device;
pub mod error;
pub mod event;
pub mod geometry;
pub mod ring;
pub mod transport;

pub use config::{ConfigChannel, RuntimeConfig, Stream};
pub use decoder::Decoder;
pub use device::{Device, DeviceInfo, OpenRestrict};
pub use error::{DataStartError, OpenError};
pub use event::{
    FrameEvent, Imu6Event, NotifyHook, Packet, PacketContainer, PolarityEvent, SpecialEvent, SpecialEventType,
};
pub use geometry::{ChipId, Geometry, Orientation};
pub use ring::Ring;
pub use transport::{BulkSource, TransferPool, TransferStatus};
