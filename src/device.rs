//! Acquisition Supervisor: device lifecycle, the one-time
//! info probe, and ownership of the producer thread.
//!
//! `Device` is generic over two external collaborators: a
//! [`ConfigChannel`] for the vendor control endpoint and a
//! [`BulkSource`] for the bulk-IN data endpoint. Production callers
//! supply their own USB-backed implementations; tests use the
//! in-memory [`ChannelConfig`] and a fake [`BulkSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::info;

use crate::config::{ChannelConfig, ConfigChannel, Module, Parameter, RuntimeConfig};
use crate::decoder::Decoder;
use crate::error::{DataStartError, OpenError};
use crate::event::{NotifyHook, PacketContainer};
use crate::geometry::{ChipId, Geometry, Orientation};
use crate::ring::Ring;
use crate::transport::{BulkSource, TransferPool};

/// (module, parameter) addresses this core reads at `open`/`data_start`.
/// Implementation-defined — the actual FPGA register map is an
/// external collaborator's concern; these are the four probes
/// `info_get`'s fields require: logic revision, chip id, dvs/aps
/// geometry, and device-master status.
mod registers {
    use super::{Module, Parameter};

    pub const SYSINFO: Module = 6;
    pub const LOGIC_VERSION: Parameter = 0;
    pub const CHIP_IDENTIFIER: Parameter = 1;
    pub const DEVICE_IS_MASTER: Parameter = 2;

    pub const MULTIPLEXER: Module = 0;
    pub const DVS_SIZE_X: Parameter = 0;
    pub const DVS_SIZE_Y: Parameter = 1;
    pub const APS_SIZE_X: Parameter = 2;
    pub const APS_SIZE_Y: Parameter = 3;
    pub const APS_WINDOW0_START_X: Parameter = 4;
    pub const APS_WINDOW0_START_Y: Parameter = 5;
    pub const APS_WINDOW0_SIZE_X: Parameter = 6;
    pub const APS_WINDOW0_SIZE_Y: Parameter = 7;
    pub const CHANNELS: Parameter = 8;
}

/// Minimum accepted logic revision; `open` fails if the device
/// reports an older one.
const MIN_LOGIC_REVISION: u32 = 1;

fn chip_id_from_register(value: u32) -> ChipId {
    match value {
        0 => ChipId::Davis240A,
        1 => ChipId::Davis240B,
        2 => ChipId::Davis240C,
        3 => ChipId::Davis128,
        4 => ChipId::Davis208,
        5 => ChipId::Davis346A,
        6 => ChipId::Davis346B,
        7 => ChipId::Davis346Cbsi,
        8 => ChipId::Davis640,
        9 => ChipId::DavisRgb,
        _ => ChipId::Davis346Aba,
    }
}

/// Identifying/static fields a caller can retrieve after `open`.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: i16,
    pub device_string: String,
    pub logic_version: u32,
    pub is_master: bool,
    pub chip_id: ChipId,
    pub geometry: Geometry,
}

/// Restricts which physical device `open` attaches to. Left as plain
/// data here; the actual bus enumeration is an external collaborator.
#[derive(Debug, Clone, Default)]
pub struct OpenRestrict {
    pub bus: Option<u8>,
    pub address: Option<u8>,
    pub serial: Option<String>,
}

struct Acquisition {
    thread_run: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// An opened device handle. Holds the static info probed at `open`,
/// the atomic runtime configuration, the ring exchange, and (while
/// acquisition is running) the producer thread.
pub struct Device<C, S>
where
    C: ConfigChannel + 'static,
    S: BulkSource + 'static,
{
    device_id: i16,
    info: DeviceInfo,
    config_channel: Arc<C>,
    bulk_source: Arc<S>,
    runtime_config: Arc<RuntimeConfig>,
    ring: Mutex<Arc<Ring>>,
    acquisition: Mutex<Option<Acquisition>>,
    on_decrease: Mutex<Option<NotifyHook>>,
}

impl<C, S> Device<C, S>
where
    C: ConfigChannel + 'static,
    S: BulkSource + 'static,
{
    /// Probes the device through `config_channel` and constructs a
    /// handle. Performs exactly four probes: logic revision, chip id,
    /// dvs/aps geometry, and device-master status; fails if the logic
    /// revision is too old.
    pub fn open(device_id: i16, config_channel: C, bulk_source: S, _restrict: OpenRestrict) -> Result<Self, OpenError> {
        let read = |module, param| {
            config_channel
                .receive(module, param)
                .map_err(|e| OpenError::ConfigChannel(Box::new(e)))
        };

        let logic_version = read(registers::SYSINFO, registers::LOGIC_VERSION)?;
        if logic_version < MIN_LOGIC_REVISION {
            return Err(OpenError::LogicRevisionTooOld {
                found: logic_version,
                required: MIN_LOGIC_REVISION,
            });
        }

        let chip_id = chip_id_from_register(read(registers::SYSINFO, registers::CHIP_IDENTIFIER)?);
        let is_master = read(registers::SYSINFO, registers::DEVICE_IS_MASTER)? != 0;

        let geometry = Geometry {
            dvs_w: read(registers::MULTIPLEXER, registers::DVS_SIZE_X)? as u16,
            dvs_h: read(registers::MULTIPLEXER, registers::DVS_SIZE_Y)? as u16,
            aps_w: read(registers::MULTIPLEXER, registers::APS_SIZE_X)? as u16,
            aps_h: read(registers::MULTIPLEXER, registers::APS_SIZE_Y)? as u16,
            channels: read(registers::MULTIPLEXER, registers::CHANNELS)? as u8,
            chip_id,
            orientation: Orientation::default(),
            aps_window0_x: read(registers::MULTIPLEXER, registers::APS_WINDOW0_START_X)? as u16,
            aps_window0_y: read(registers::MULTIPLEXER, registers::APS_WINDOW0_START_Y)? as u16,
            aps_window0_w: read(registers::MULTIPLEXER, registers::APS_WINDOW0_SIZE_X)? as u16,
            aps_window0_h: read(registers::MULTIPLEXER, registers::APS_WINDOW0_SIZE_Y)? as u16,
        };

        info!("opened device {device_id}: chip={chip_id:?}, logic_version={logic_version}");

        let runtime_config = Arc::new(RuntimeConfig::new());
        let ring = Mutex::new(Arc::new(Ring::new(runtime_config.ring_capacity())));

        Ok(Device {
            device_id,
            info: DeviceInfo {
                device_id,
                device_string: format!("DAVIS ID:{device_id}"),
                logic_version,
                is_master,
                chip_id,
                geometry,
            },
            config_channel: Arc::new(config_channel),
            bulk_source: Arc::new(bulk_source),
            ring,
            runtime_config,
            acquisition: Mutex::new(None),
            on_decrease: Mutex::new(None),
        })
    }

    pub fn info_get(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn config_set(&self, module: Module, param: Parameter, value: u32) -> Result<(), C::Error> {
        self.config_channel.send(module, param, value)
    }

    pub fn config_get(&self, module: Module, param: Parameter) -> Result<u32, C::Error> {
        self.config_channel.receive(module, param)
    }

    pub fn runtime_config(&self) -> &Arc<RuntimeConfig> {
        &self.runtime_config
    }

    /// Starts acquisition: allocates the ring and decoder, spawns the
    /// producer thread, which pumps `bulk_source` until `data_stop`
    /// clears `thread_run`. `on_increase` fires once per container
    /// committed onto the ring (from the producer thread, inside the
    /// decoder's commit step); `on_decrease` is stored and fires once
    /// per container taken back off by [`Self::data_get`], whichever
    /// thread calls it.
    pub fn data_start(&self, on_increase: Option<NotifyHook>, on_decrease: Option<NotifyHook>) -> Result<(), DataStartError> {
        let mut acquisition = self.acquisition.lock().unwrap();
        if acquisition.is_some() {
            return Err(DataStartError::AlreadyRunning);
        }

        let ring = Arc::new(Ring::new(self.runtime_config.ring_capacity()));
        let thread_run = Arc::new(AtomicBool::new(true));

        let geometry = self.info.geometry;
        let source_id = self.device_id;
        let config = Arc::clone(&self.runtime_config);
        let bulk_source = Arc::clone(&self.bulk_source);
        let ring_producer = Arc::clone(&ring);
        let thread_run_producer = Arc::clone(&thread_run);
        let buffer_count = config.usb_buffer_count();
        let buffer_size = config.usb_buffer_size();

        let handle = std::thread::Builder::new()
            .name(format!("davis-acquisition-{source_id}"))
            .spawn(move || {
                let mut decoder = Decoder::new(source_id, geometry, config, Arc::clone(&ring_producer));
                if let Some(hook) = on_increase {
                    decoder.set_increase_hook(hook);
                }
                let mut pool = TransferPool::new(buffer_count, buffer_size);

                while thread_run_producer.load(Ordering::Relaxed) {
                    pool.pump_once(bulk_source.as_ref(), &mut decoder);
                }

                pool.deallocate(bulk_source.as_ref(), &mut decoder);
            })
            .expect("failed to spawn acquisition thread");

        *acquisition = Some(Acquisition { thread_run, handle });
        // Install the freshly sized ring as the consumer-visible one;
        // `data_get`/`data_stop` pick it up through the same mutex.
        *self.ring.lock().unwrap() = ring;
        *self.on_decrease.lock().unwrap() = on_decrease;

        Ok(())
    }

    /// Stops acquisition: clears `thread_run`, joins the producer
    /// thread (which itself drains and cancels the transport pool),
    /// then drains any containers left on the ring through
    /// [`Self::data_get`] so `on_decrease` fires for each of them too.
    pub fn data_stop(&self) -> Result<(), DataStartError> {
        let mut acquisition = self.acquisition.lock().unwrap();
        let Some(running) = acquisition.take() else {
            return Ok(());
        };

        running.thread_run.store(false, Ordering::Relaxed);
        let _ = running.handle.join();
        drop(acquisition);

        while self.data_get().is_some() {}

        Ok(())
    }

    /// Non-blocking (or busy-retrying, if `RuntimeConfig::is_blocking`)
    /// retrieval of the next finished packet container. Fires the
    /// `on_decrease` hook registered at `data_start` exactly once per
    /// successful take.
    pub fn data_get(&self) -> Option<Box<PacketContainer>> {
        let ring = Arc::clone(&self.ring.lock().unwrap());
        loop {
            if let Some(container) = ring.get() {
                if let Some(hook) = self.on_decrease.lock().unwrap().as_ref() {
                    hook();
                }
                return Some(container);
            }
            if !self.runtime_config.is_blocking() {
                return None;
            }
            std::hint::spin_loop();
        }
    }

    pub fn close(self) {
        // Dropping `self` releases the config channel, bulk source, and
        // ring; any running acquisition must already have been stopped
        // by the caller via `data_stop`.
    }
}

/// An in-memory device handle convenience constructor for tests: a
/// pre-seeded [`ChannelConfig`] standing in for a real control
/// endpoint.
pub fn open_test_device<S: BulkSource + 'static>(bulk_source: S) -> Result<Device<ChannelConfig, S>, OpenError> {
    let channel = ChannelConfig::new();
    channel.seed(registers::SYSINFO, registers::LOGIC_VERSION, 1);
    channel.seed(registers::SYSINFO, registers::CHIP_IDENTIFIER, 2);
    channel.seed(registers::SYSINFO, registers::DEVICE_IS_MASTER, 1);
    channel.seed(registers::MULTIPLEXER, registers::DVS_SIZE_X, 240);
    channel.seed(registers::MULTIPLEXER, registers::DVS_SIZE_Y, 180);
    channel.seed(registers::MULTIPLEXER, registers::APS_SIZE_X, 240);
    channel.seed(registers::MULTIPLEXER, registers::APS_SIZE_Y, 180);
    channel.seed(registers::MULTIPLEXER, registers::APS_WINDOW0_START_X, 0);
    channel.seed(registers::MULTIPLEXER, registers::APS_WINDOW0_START_Y, 0);
    channel.seed(registers::MULTIPLEXER, registers::APS_WINDOW0_SIZE_X, 240);
    channel.seed(registers::MULTIPLEXER, registers::APS_WINDOW0_SIZE_Y, 180);
    channel.seed(registers::MULTIPLEXER, registers::CHANNELS, 1);

    Device::open(1, channel, bulk_source, OpenRestrict::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransferStatus;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, thiserror::Error)]
    #[error("no more data")]
    struct EofError;

    struct EmptySource {
        cancelled: StdMutex<bool>,
    }

    impl BulkSource for EmptySource {
        type Error = EofError;

        fn submit(&self, _buffer: &mut [u8]) -> Result<TransferStatus, Self::Error> {
            if *self.cancelled.lock().unwrap() {
                Ok(TransferStatus::Cancelled)
            } else {
                Ok(TransferStatus::NoDevice)
            }
        }

        fn cancel_all(&self) {
            *self.cancelled.lock().unwrap() = true;
        }
    }

    #[test]
    fn open_probes_geometry_and_chip_id() {
        let device = open_test_device(EmptySource {
            cancelled: StdMutex::new(false),
        })
        .unwrap();
        assert_eq!(device.info_get().geometry.dvs_w, 240);
        assert_eq!(device.info_get().chip_id, ChipId::Davis240C);
        assert!(device.info_get().is_master);
    }

    #[test]
    fn open_rejects_too_old_logic_revision() {
        let channel = ChannelConfig::new();
        channel.seed(registers::SYSINFO, registers::LOGIC_VERSION, 0);
        let err = Device::open(
            1,
            channel,
            EmptySource {
                cancelled: StdMutex::new(false),
            },
            OpenRestrict::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OpenError::LogicRevisionTooOld { .. }));
    }

    #[test]
    fn data_start_then_stop_joins_cleanly() {
        let device = open_test_device(EmptySource {
            cancelled: StdMutex::new(false),
        })
        .unwrap();
        device.data_start(None, None).unwrap();
        device.data_stop().unwrap();
    }

    #[test]
    fn data_start_twice_is_rejected() {
        let device = open_test_device(EmptySource {
            cancelled: StdMutex::new(false),
        })
        .unwrap();
        device.data_start(None, None).unwrap();
        let err = device.data_start(None, None).unwrap_err();
        assert!(matches!(err, DataStartError::AlreadyRunning));
        device.data_stop().unwrap();
    }

    #[test]
    fn data_get_fires_decrease_hook_exactly_once_per_container() {
        let device = open_test_device(EmptySource {
            cancelled: StdMutex::new(false),
        })
        .unwrap();
        let fire_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = Arc::clone(&fire_count);
        device
            .data_start(None, Some(Arc::new(move || {
                counted.fetch_add(1, Ordering::Relaxed);
            })))
            .unwrap();
        device.data_stop().unwrap();
        assert_eq!(fire_count.load(Ordering::Relaxed), 0);
    }
}
