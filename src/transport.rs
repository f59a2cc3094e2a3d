//! Bulk-endpoint transport: a submission pool of fixed-size
//! buffers feeding the decoder, with cancellation and drain-on-stop.
//!
//! The actual USB mechanics are out of scope — device discovery and
//! bulk transport are external collaborators; this module owns only
//! the pool bookkeeping — which buffers are outstanding, resubmission
//! after a completed transfer, and the cancel-then-drain sequence
//! `data_stop` needs. A concrete peripheral is reached through the
//! [`BulkSource`] trait, the transport-facing analogue of
//! [`crate::config::ConfigChannel`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, warn};

use crate::decoder::Decoder;

/// Outcome of one bulk-IN transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// `len` bytes of `buffer` were filled and should be handed to the
    /// decoder; the slot should be resubmitted.
    Completed(usize),
    /// The transfer was cancelled (shutdown in progress); retire the
    /// slot.
    Cancelled,
    /// The device is gone; retire the slot.
    NoDevice,
}

/// The bulk-IN endpoint, as addressed by the transport pool. A real
/// implementation wraps a USB library handle; tests and non-hardware
/// callers can substitute anything producing bytes.
pub trait BulkSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fills `buffer` with one transfer's worth of data, blocking
    /// until it completes, is cancelled, or the device disappears.
    fn submit(&self, buffer: &mut [u8]) -> Result<TransferStatus, Self::Error>;

    /// Requests cancellation of any outstanding transfers. Idempotent.
    fn cancel_all(&self);
}

/// A fixed-size slot a transfer's bytes land in.
struct Slot {
    buffer: Vec<u8>,
    active: bool,
}

/// Owns the N submitted buffers and the count of transfers still
/// outstanding: N bulk-IN transfers submitted up front, each
/// resubmitted on completion, with a drain-and-cancel teardown.
pub struct TransferPool {
    slots: Vec<Slot>,
    active_count: AtomicUsize,
}

impl TransferPool {
    /// Allocates `count` buffers of `size` bytes each, all initially
    /// active (as if freshly submitted).
    pub fn new(count: usize, size: usize) -> Self {
        let slots = (0..count)
            .map(|_| Slot {
                buffer: vec![0u8; size],
                active: true,
            })
            .collect();
        TransferPool {
            slots,
            active_count: AtomicUsize::new(count),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Runs one pass over every still-active slot: submits it to
    /// `source`, and on completion hands the received bytes to
    /// `decoder` before resubmitting. Cancelled/no-device slots are
    /// retired and the active counter decremented.
    pub fn pump_once<S: BulkSource>(&mut self, source: &S, decoder: &mut Decoder) {
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            match source.submit(&mut slot.buffer) {
                Ok(TransferStatus::Completed(len)) => {
                    decoder.process_bytes(&slot.buffer[..len]);
                }
                Ok(TransferStatus::Cancelled) | Ok(TransferStatus::NoDevice) => {
                    slot.active = false;
                    self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("bulk transfer failed, retiring slot: {e}");
                    slot.active = false;
                    self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Cancels all outstanding transfers and pumps `source` with a
    /// fixed 100 ms step until every slot has retired.
    pub fn deallocate<S: BulkSource>(&mut self, source: &S, decoder: &mut Decoder) {
        source.cancel_all();

        const POLL_INTERVAL: Duration = Duration::from_millis(100);
        while self.active_count() > 0 {
            self.pump_once(source, decoder);
            if self.active_count() > 0 {
                debug!("{} transfers still outstanding, waiting", self.active_count());
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::geometry::{ChipId, Geometry, Orientation};
    use crate::ring::Ring;
    use std::sync::{Arc, Mutex};

    fn test_decoder() -> Decoder {
        let geometry = Geometry {
            dvs_w: 240,
            dvs_h: 180,
            aps_w: 240,
            aps_h: 180,
            channels: 1,
            chip_id: ChipId::Davis240C,
            orientation: Orientation::default(),
            aps_window0_x: 0,
            aps_window0_y: 0,
            aps_window0_w: 240,
            aps_window0_h: 180,
        };
        Decoder::new(1, geometry, Arc::new(RuntimeConfig::new()), Arc::new(Ring::new(4)))
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake source error")]
    struct FakeError;

    struct FakeSource {
        remaining_completions: Mutex<usize>,
        cancelled: Mutex<bool>,
    }

    impl BulkSource for FakeSource {
        type Error = FakeError;

        fn submit(&self, buffer: &mut [u8]) -> Result<TransferStatus, Self::Error> {
            if *self.cancelled.lock().unwrap() {
                return Ok(TransferStatus::Cancelled);
            }
            let mut remaining = self.remaining_completions.lock().unwrap();
            if *remaining == 0 {
                return Ok(TransferStatus::Cancelled);
            }
            *remaining -= 1;
            buffer[0] = 0;
            buffer[1] = 0x80; // one timestamp word, zero
            Ok(TransferStatus::Completed(2))
        }

        fn cancel_all(&self) {
            *self.cancelled.lock().unwrap() = true;
        }
    }

    #[test]
    fn pump_once_resubmits_active_slots() {
        let source = FakeSource {
            remaining_completions: Mutex::new(10),
            cancelled: Mutex::new(false),
        };
        let mut pool = TransferPool::new(2, 4096);
        let mut decoder = test_decoder();

        pool.pump_once(&source, &mut decoder);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn deallocate_drains_until_all_slots_retire() {
        let source = FakeSource {
            remaining_completions: Mutex::new(1),
            cancelled: Mutex::new(false),
        };
        let mut pool = TransferPool::new(2, 4096);
        let mut decoder = test_decoder();

        pool.deallocate(&source, &mut decoder);
        assert_eq!(pool.active_count(), 0);
    }
}
