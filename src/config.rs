//! Atomic, consumer-modifiable runtime configuration and the vendor
//! control-endpoint `ConfigChannel` abstraction.
//!
//! Each tunable is one atomic cell; there are no locks, and readers
//! (the producer thread) accept per-event staleness.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Per-stream packet sizing/interval defaults.
pub mod defaults {
    pub const RING_CAPACITY: usize = 64;
    pub const USB_BUFFER_COUNT: usize = 8;
    pub const USB_BUFFER_SIZE: usize = 4096;

    pub const POLARITY_MAX_SIZE: usize = 4096;
    pub const SPECIAL_MAX_SIZE: usize = 128;
    pub const FRAME_MAX_SIZE: usize = 4;
    pub const IMU_MAX_SIZE: usize = 8;

    pub const POLARITY_MAX_INTERVAL_US: u32 = 5000;
    pub const SPECIAL_MAX_INTERVAL_US: u32 = 1000;
    pub const FRAME_MAX_INTERVAL_US: u32 = 50_000;
    pub const IMU_MAX_INTERVAL_US: u32 = 5000;
}

/// Identifies which per-stream packet, for the generic getters on
/// [`RuntimeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Polarity,
    Special,
    Frame,
    Imu6,
}

/// Live, atomically-updatable configuration. Owned by the
/// [`Device`](crate::device::Device) handle and shared (via `Arc`)
/// with the producer thread.
///
/// Changes to `ring_capacity`, `usb_buffer_count`, and
/// `usb_buffer_size` take effect only at the next `data_start`; the
/// rest are read by the producer on each relevant commit boundary.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub(crate) ring_capacity: AtomicUsize,
    pub(crate) ring_blocking: AtomicBool,
    pub(crate) usb_buffer_count: AtomicUsize,
    pub(crate) usb_buffer_size: AtomicUsize,

    polarity_max_size: AtomicUsize,
    special_max_size: AtomicUsize,
    frame_max_size: AtomicUsize,
    imu_max_size: AtomicUsize,

    polarity_max_interval_us: AtomicU32,
    special_max_interval_us: AtomicU32,
    frame_max_interval_us: AtomicU32,
    imu_max_interval_us: AtomicU32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        use defaults::*;
        RuntimeConfig {
            ring_capacity: AtomicUsize::new(RING_CAPACITY),
            ring_blocking: AtomicBool::new(false),
            usb_buffer_count: AtomicUsize::new(USB_BUFFER_COUNT),
            usb_buffer_size: AtomicUsize::new(USB_BUFFER_SIZE),
            polarity_max_size: AtomicUsize::new(POLARITY_MAX_SIZE),
            special_max_size: AtomicUsize::new(SPECIAL_MAX_SIZE),
            frame_max_size: AtomicUsize::new(FRAME_MAX_SIZE),
            imu_max_size: AtomicUsize::new(IMU_MAX_SIZE),
            polarity_max_interval_us: AtomicU32::new(POLARITY_MAX_INTERVAL_US),
            special_max_interval_us: AtomicU32::new(SPECIAL_MAX_INTERVAL_US),
            frame_max_interval_us: AtomicU32::new(FRAME_MAX_INTERVAL_US),
            imu_max_interval_us: AtomicU32::new(IMU_MAX_INTERVAL_US),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity.load(Ordering::Relaxed)
    }
    pub fn set_ring_capacity(&self, capacity: usize) {
        self.ring_capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn is_blocking(&self) -> bool {
        self.ring_blocking.load(Ordering::Relaxed)
    }
    pub fn set_blocking(&self, blocking: bool) {
        self.ring_blocking.store(blocking, Ordering::Relaxed);
    }

    pub fn usb_buffer_count(&self) -> usize {
        self.usb_buffer_count.load(Ordering::Relaxed)
    }
    pub fn set_usb_buffer_count(&self, count: usize) {
        self.usb_buffer_count.store(count, Ordering::Relaxed);
    }

    pub fn usb_buffer_size(&self) -> usize {
        self.usb_buffer_size.load(Ordering::Relaxed)
    }
    pub fn set_usb_buffer_size(&self, size: usize) {
        self.usb_buffer_size.store(size, Ordering::Relaxed);
    }

    pub fn max_packet_size(&self, stream: Stream) -> usize {
        match stream {
            Stream::Polarity => self.polarity_max_size.load(Ordering::Relaxed),
            Stream::Special => self.special_max_size.load(Ordering::Relaxed),
            Stream::Frame => self.frame_max_size.load(Ordering::Relaxed),
            Stream::Imu6 => self.imu_max_size.load(Ordering::Relaxed),
        }
    }

    pub fn set_max_packet_size(&self, stream: Stream, size: usize) {
        let cell = match stream {
            Stream::Polarity => &self.polarity_max_size,
            Stream::Special => &self.special_max_size,
            Stream::Frame => &self.frame_max_size,
            Stream::Imu6 => &self.imu_max_size,
        };
        cell.store(size, Ordering::Relaxed);
    }

    pub fn max_packet_interval_us(&self, stream: Stream) -> u32 {
        match stream {
            Stream::Polarity => self.polarity_max_interval_us.load(Ordering::Relaxed),
            Stream::Special => self.special_max_interval_us.load(Ordering::Relaxed),
            Stream::Frame => self.frame_max_interval_us.load(Ordering::Relaxed),
            Stream::Imu6 => self.imu_max_interval_us.load(Ordering::Relaxed),
        }
    }

    pub fn set_max_packet_interval_us(&self, stream: Stream, interval: u32) {
        let cell = match stream {
            Stream::Polarity => &self.polarity_max_interval_us,
            Stream::Special => &self.special_max_interval_us,
            Stream::Frame => &self.frame_max_interval_us,
            Stream::Imu6 => &self.imu_max_interval_us,
        };
        cell.store(interval, Ordering::Relaxed);
    }
}

/// A device module, as addressed by [`ConfigChannel`]. Mirrors the
/// `(module, parameter)` addressing of the vendor FPGA_CONFIG control
/// request.
pub type Module = u8;
/// A parameter within a [`Module`].
pub type Parameter = u8;

/// The vendor control-endpoint get/set channel, treated as an
/// external collaborator: this crate defines the boundary, not the
/// USB control-transfer mechanics.
///
/// Implementations exchange four bytes, big-endian.
pub trait ConfigChannel: Send + Sync {
    /// Errors surfaced by a concrete transport (timeouts, stalls, no
    /// device, ...). Opaque to this crate beyond `Display`/`Error`.
    type Error: std::error::Error + Send + Sync + 'static;

    fn send(&self, module: Module, param: Parameter, value: u32) -> Result<(), Self::Error>;
    fn receive(&self, module: Module, param: Parameter) -> Result<u32, Self::Error>;
}

/// An in-memory [`ConfigChannel`] for tests and for callers who have
/// no real device attached. Not used by production code paths unless
/// explicitly constructed by the caller.
#[derive(Debug, Default)]
pub struct ChannelConfig {
    registers: std::sync::Mutex<std::collections::HashMap<(Module, Parameter), u32>>,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds a register, as a real device's firmware defaults
    /// would be pre-seeded before the first `receive`.
    pub fn seed(&self, module: Module, param: Parameter, value: u32) {
        self.registers
            .lock()
            .unwrap()
            .insert((module, param), value);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("in-memory config channel error")]
pub struct ChannelConfigError;

impl ConfigChannel for ChannelConfig {
    type Error = ChannelConfigError;

    fn send(&self, module: Module, param: Parameter, value: u32) -> Result<(), Self::Error> {
        self.registers
            .lock()
            .unwrap()
            .insert((module, param), value);
        Ok(())
    }

    fn receive(&self, module: Module, param: Parameter) -> Result<u32, Self::Error> {
        Ok(self
            .registers
            .lock()
            .unwrap()
            .get(&(module, param))
            .copied()
            .unwrap_or(0))
    }
}
