//! Typed event records and the packet containers that group them.
//!
//! Each event kind is its own struct carrying only its own fields,
//! rather than one bloated tagged union. An event only becomes visible
//! to a consumer once [`Packet::validate_and_push`] has been called on
//! it.

use std::fmt;
use std::sync::Arc;

/// A caller-supplied callback fired on a container-count transition:
/// `notify_increase` once per successful [`crate::ring::Ring::put`],
/// `notify_decrease` once per successful [`crate::ring::Ring::get`].
/// May run on either the producer or the consumer thread.
pub type NotifyHook = Arc<dyn Fn() + Send + Sync>;

/// Identifies the kind of special/control marker carried by a
/// [`SpecialEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpecialEventType {
    /// The device's timestamp counters were reset to zero.
    TimestampReset,
    /// An external digital input transitioned high.
    ExternalInputRising,
    /// An external digital input transitioned low.
    ExternalInputFalling,
    /// An external digital input produced a full pulse.
    ExternalInputPulse,
    /// A DVS Y address arrived with no matching X address before the
    /// next Y address; `data` on the event carries the orphaned Y.
    DvsRowOnly,
}

/// Marks the timestamp used by [`SpecialEvent::TimestampReset`]
/// markers, per the wire protocol's convention of using the maximum
/// representable value to flag "this timestamp is not meaningful".
pub const TIMESTAMP_RESET_TS: u32 = u32::MAX;

/// DVS address-event: one pixel's polarity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolarityEvent {
    ts: u32,
    x: u16,
    y: u16,
    polarity_on: bool,
    valid: bool,
}

impl PolarityEvent {
    pub(crate) fn new(ts: u32, x: u16, y: u16, polarity_on: bool) -> Self {
        PolarityEvent {
            ts,
            x,
            y,
            polarity_on,
            valid: false,
        }
    }

    pub fn ts(&self) -> u32 {
        self.ts
    }
    pub fn x(&self) -> u16 {
        self.x
    }
    pub fn y(&self) -> u16 {
        self.y
    }
    /// `true` for an ON (brightness increase) transition.
    pub fn polarity_on(&self) -> bool {
        self.polarity_on
    }
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// A control/marker event: timestamp resets, external I/O edges, and
/// DVS row-only (orphaned Y address) notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpecialEvent {
    ts: u32,
    kind: SpecialEventType,
    data: Option<u32>,
    valid: bool,
}

impl SpecialEvent {
    pub(crate) fn new(ts: u32, kind: SpecialEventType, data: Option<u32>) -> Self {
        SpecialEvent {
            ts,
            kind,
            data,
            valid: false,
        }
    }

    pub fn ts(&self) -> u32 {
        self.ts
    }
    pub fn kind(&self) -> SpecialEventType {
        self.kind
    }
    /// Present only for [`SpecialEventType::DvsRowOnly`], carrying the
    /// orphaned Y address.
    pub fn data(&self) -> Option<u32> {
        self.data
    }
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// The number of color channels a frame may carry. The sensor's color
/// filter determines which is in effect; this core never computes a
/// demosaiced image, it only carries the raw channel count through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelCount {
    Mono = 1,
    Rgba = 4,
}

/// An APS frame readout: four boundary timestamps plus a dense,
/// row-major pixel buffer.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameEvent {
    ts_start_of_frame: i32,
    ts_end_of_frame: Option<i32>,
    ts_start_of_exposure: Option<i32>,
    ts_end_of_exposure: Option<i32>,
    width: u16,
    height: u16,
    channels: ChannelCount,
    pixels: Vec<u16>,
    valid: bool,
}

impl fmt::Debug for FrameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameEvent")
            .field("ts_start_of_frame", &self.ts_start_of_frame)
            .field("ts_end_of_frame", &self.ts_end_of_frame)
            .field("ts_start_of_exposure", &self.ts_start_of_exposure)
            .field("ts_end_of_exposure", &self.ts_end_of_exposure)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("pixels.len()", &self.pixels.len())
            .field("valid", &self.valid)
            .finish()
    }
}

impl FrameEvent {
    pub(crate) fn new(ts_start_of_frame: i32, width: u16, height: u16, channels: ChannelCount) -> Self {
        FrameEvent {
            ts_start_of_frame,
            ts_end_of_frame: None,
            ts_start_of_exposure: None,
            ts_end_of_exposure: None,
            width,
            height,
            channels,
            pixels: vec![0u16; width as usize * height as usize * channels as usize],
            valid: false,
        }
    }

    pub fn ts_start_of_frame(&self) -> i32 {
        self.ts_start_of_frame
    }
    pub fn ts_end_of_frame(&self) -> Option<i32> {
        self.ts_end_of_frame
    }
    pub fn ts_start_of_exposure(&self) -> Option<i32> {
        self.ts_start_of_exposure
    }
    pub fn ts_end_of_exposure(&self) -> Option<i32> {
        self.ts_end_of_exposure
    }
    pub fn width(&self) -> u16 {
        self.width
    }
    pub fn height(&self) -> u16 {
        self.height
    }
    pub fn channels(&self) -> ChannelCount {
        self.channels
    }
    /// Dense, row-major, little-endian-normalized pixel samples.
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }
    pub(crate) fn set_ts_start_of_exposure(&mut self, ts: i32) {
        if self.ts_start_of_exposure.is_none() {
            self.ts_start_of_exposure = Some(ts);
        }
    }
    pub(crate) fn set_ts_end_of_exposure(&mut self, ts: i32) {
        if self.ts_end_of_exposure.is_none() {
            self.ts_end_of_exposure = Some(ts);
        }
    }
    pub(crate) fn set_ts_end_of_frame(&mut self, ts: i32) {
        self.ts_end_of_frame = Some(ts);
    }
}

/// A single 6-axis IMU sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Imu6Event {
    ts: i32,
    accel: [f32; 3],
    gyro: [f32; 3],
    temp: f32,
    valid: bool,
}

impl Imu6Event {
    pub(crate) fn new(ts: i32) -> Self {
        Imu6Event {
            ts,
            accel: [0.0; 3],
            gyro: [0.0; 3],
            temp: 0.0,
            valid: false,
        }
    }

    pub fn ts(&self) -> i32 {
        self.ts
    }
    /// Accelerometer samples in g, ordered (x, y, z).
    pub fn accel(&self) -> [f32; 3] {
        self.accel
    }
    /// Gyroscope samples in degrees/second, ordered (x, y, z).
    pub fn gyro(&self) -> [f32; 3] {
        self.gyro
    }
    /// Die temperature in degrees Celsius.
    pub fn temp(&self) -> f32 {
        self.temp
    }
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_accel_x(&mut self, v: f32) {
        self.accel[0] = v;
    }
    pub(crate) fn set_accel_y(&mut self, v: f32) {
        self.accel[1] = v;
    }
    pub(crate) fn set_accel_z(&mut self, v: f32) {
        self.accel[2] = v;
    }
    pub(crate) fn set_gyro_x(&mut self, v: f32) {
        self.gyro[0] = v;
    }
    pub(crate) fn set_gyro_y(&mut self, v: f32) {
        self.gyro[1] = v;
    }
    pub(crate) fn set_gyro_z(&mut self, v: f32) {
        self.gyro[2] = v;
    }
    pub(crate) fn set_temp(&mut self, v: f32) {
        self.temp = v;
    }
}

/// Marks an event as valid, making it visible to consumers. This is
/// the *only* path by which an event becomes visible: a freshly
/// constructed event always starts invalid.
pub(crate) trait Validate {
    fn mark_valid(&mut self);
}

impl Validate for PolarityEvent {
    fn mark_valid(&mut self) {
        self.valid = true;
    }
}
impl Validate for SpecialEvent {
    fn mark_valid(&mut self) {
        self.valid = true;
    }
}
impl Validate for FrameEvent {
    fn mark_valid(&mut self) {
        self.valid = true;
    }
}
impl Validate for Imu6Event {
    fn mark_valid(&mut self) {
        self.valid = true;
    }
}

/// A typed, growable, insertion-ordered sequence of events of one
/// kind, tagged with a source identifier and a fixed capacity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet<T> {
    source_id: i16,
    capacity: usize,
    events: Vec<T>,
}

impl<T> Packet<T> {
    pub(crate) fn new(source_id: i16, capacity: usize) -> Self {
        Packet {
            source_id,
            capacity,
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn source_id(&self) -> i16 {
        self.source_id
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    /// Number of events appended so far.
    pub fn position(&self) -> usize {
        self.events.len()
    }
    pub fn events(&self) -> &[T] {
        &self.events
    }
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn push(&mut self, event: T) {
        self.events.push(event);
    }
}

impl<T: Validate> Packet<T> {
    /// Appends `event`, validating it so it becomes visible to
    /// consumers. This is the only path by which an event is added to
    /// a packet.
    pub(crate) fn validate_and_push(&mut self, mut event: T) {
        event.mark_valid();
        self.push(event);
    }
}

/// An ordered tuple of up to four optional packets, one per stream,
/// produced atomically per commit cycle. `None` means that stream had
/// no commit-worthy activity in this cycle.
#[derive(Debug, Default)]
pub struct PacketContainer {
    pub polarity: Option<Packet<PolarityEvent>>,
    pub special: Option<Packet<SpecialEvent>>,
    pub frame: Option<Packet<FrameEvent>>,
    pub imu6: Option<Packet<Imu6Event>>,
}

impl PacketContainer {
    pub(crate) fn empty() -> Self {
        PacketContainer::default()
    }

    /// `true` if every stream slot is empty. A container in this state
    /// carries no information and need not be placed on the ring.
    pub fn is_empty(&self) -> bool {
        self.polarity.is_none() && self.special.is_none() && self.frame.is_none() && self.imu6.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_events_start_invalid() {
        let e = PolarityEvent::new(5, 16, 2, true);
        assert!(!e.is_valid());
    }

    #[test]
    fn validate_and_push_marks_valid() {
        let mut packet: Packet<PolarityEvent> = Packet::new(1, 4);
        packet.validate_and_push(PolarityEvent::new(5, 16, 2, true));
        assert_eq!(packet.position(), 1);
        assert!(packet.events()[0].is_valid());
    }

    #[test]
    fn frame_allocates_zeroed_pixels() {
        let frame = FrameEvent::new(0, 4, 2, ChannelCount::Mono);
        assert_eq!(frame.pixels().len(), 8);
        assert!(frame.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn empty_container_has_no_streams() {
        assert!(PacketContainer::empty().is_empty());
    }
}
