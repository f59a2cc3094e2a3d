//! The stream decoder: turns a byte stream from the transport
//! into validated events, bundling them into [`PacketContainer`]s and
//! handing finished containers to the ring exchange.
//!
//! The wire format is a stream of 16-bit little-endian words: bit 15
//! tags a timestamp-delta word, otherwise bits 14..12 select one of a
//! handful of event codes and bits 11..0 carry its data. That collapses
//! the usual "decode a header, then consume bytes until a state
//! machine completes" shape down to "classify the word, update one
//! piece of decoder state, and maybe emit an event."
//!
//! Malformed input (out-of-range addresses, count mismatches, unknown
//! codes) is logged and skipped; it never produces an `Err` — the
//! decoder cannot panic or fail on any byte sequence it is given.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::commit::should_commit;
use crate::config::{RuntimeConfig, Stream};
use crate::event::{
    ChannelCount, FrameEvent, Imu6Event, NotifyHook, Packet, PacketContainer, PolarityEvent, SpecialEvent,
    SpecialEventType, TIMESTAMP_RESET_TS,
};
use crate::geometry::{ChipId, Geometry};
use crate::ring::Ring;

/// ADC bit depth DAVIS sensors convert at; pixel samples are
/// normalized up to 16 bits by a left shift of `16 - ADC_DEPTH`.
const ADC_DEPTH: u32 = 10;

/// Number of Misc8 sub-events making up one IMU6 sample (one tmp/value
/// pair per axis, 7 axes worth of halves): the IMU Scale Config event
/// pre-counts as the first step, so 14 Misc8 bytes bring the counter
/// from 1 to 15.
const IMU6_COUNT: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApsReadoutType {
    Reset,
    Signal,
}

/// Per-direction reset/signal column counters, indexed by
/// [`ApsReadoutType`].
#[derive(Debug, Clone, Copy, Default)]
struct ApsCounts {
    reset: u16,
    signal: u16,
}

impl ApsCounts {
    fn get(&self, ty: ApsReadoutType) -> u16 {
        match ty {
            ApsReadoutType::Reset => self.reset,
            ApsReadoutType::Signal => self.signal,
        }
    }
    fn set(&mut self, ty: ApsReadoutType, v: u16) {
        match ty {
            ApsReadoutType::Reset => self.reset = v,
            ApsReadoutType::Signal => self.signal = v,
        }
    }
    fn incr(&mut self, ty: ApsReadoutType) {
        let v = self.get(ty);
        self.set(ty, v + 1);
    }
}

/// Accelerometer full-scale range code, from bits [3:2] of an IMU
/// Scale Config event's data field.
fn accel_scale(code: u8) -> f32 {
    65536.0 / (4u32 * (1u32 << code)) as f32
}

/// Gyroscope full-scale range code, from bits [1:0] of an IMU Scale
/// Config event's data field.
fn gyro_scale(code: u8) -> f32 {
    65536.0 / (500u32 * (1u32 << code)) as f32
}

/// Decodes a DAVIS event byte stream into typed, validated events.
///
/// One `Decoder` drives exactly one device's worth of state: timestamp
/// expansion, DVS row/column pairing, the APS readout state machine,
/// and IMU6 sample assembly all live here. Bytes are handed in via
/// [`Decoder::process_bytes`]; finished packet containers are pushed
/// onto `ring` as commit conditions are met.
pub struct Decoder {
    geometry: Geometry,
    config: Arc<RuntimeConfig>,
    ring: Arc<Ring>,
    source_id: i16,

    wrap_add: u32,
    current_ts: i32,
    last_ts: i32,

    dvs_last_y: u16,
    dvs_got_y: bool,
    dvs_ts: i32,

    aps_ignore_events: bool,
    aps_global_shutter: bool,
    aps_reset_read: bool,
    aps_current_readout: ApsReadoutType,
    aps_count_x: ApsCounts,
    aps_count_y: ApsCounts,
    aps_rgb_offset: i32,
    aps_rgb_offset_increasing: bool,
    reset_scratch: Vec<u16>,
    current_frame: Option<FrameEvent>,

    imu_ignore_events: bool,
    imu_count: u8,
    imu_tmp: u8,
    accel_scale: f32,
    gyro_scale: f32,
    current_imu: Option<Imu6Event>,

    polarity_packet: Packet<PolarityEvent>,
    special_packet: Packet<SpecialEvent>,
    frame_packet: Packet<FrameEvent>,
    imu_packet: Packet<Imu6Event>,

    on_increase: Option<NotifyHook>,
}

impl Decoder {
    pub fn new(source_id: i16, geometry: Geometry, config: Arc<RuntimeConfig>, ring: Arc<Ring>) -> Self {
        let reset_scratch = vec![0u16; geometry.reset_scratch_len()];
        let polarity_packet = Packet::new(source_id, config.max_packet_size(Stream::Polarity));
        let special_packet = Packet::new(source_id, config.max_packet_size(Stream::Special));
        let frame_packet = Packet::new(source_id, config.max_packet_size(Stream::Frame));
        let imu_packet = Packet::new(source_id, config.max_packet_size(Stream::Imu6));

        Decoder {
            geometry,
            config,
            ring,
            source_id,
            wrap_add: 0,
            current_ts: 0,
            last_ts: 0,
            dvs_last_y: 0,
            dvs_got_y: false,
            dvs_ts: 0,
            aps_ignore_events: true,
            aps_global_shutter: true,
            aps_reset_read: true,
            aps_current_readout: ApsReadoutType::Reset,
            aps_count_x: ApsCounts::default(),
            aps_count_y: ApsCounts::default(),
            aps_rgb_offset: 1,
            aps_rgb_offset_increasing: true,
            reset_scratch,
            current_frame: None,
            imu_ignore_events: true,
            imu_count: 0,
            imu_tmp: 0,
            accel_scale: accel_scale(0),
            gyro_scale: gyro_scale(0),
            current_imu: None,
            polarity_packet,
            special_packet,
            frame_packet,
            imu_packet,
            on_increase: None,
        }
    }

    /// Registers a callback fired once per successful commit onto the
    /// ring (see [`Self::maybe_commit`]). Not part of `new` since most
    /// callers (tests, `davis-dump`) have no use for it.
    pub fn set_increase_hook(&mut self, hook: NotifyHook) {
        self.on_increase = Some(hook);
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Processes a chunk of bytes read from the transport, decoding as
    /// many 16-bit little-endian words as it can. A trailing odd byte
    /// is truncated and logged.
    pub fn process_bytes(&mut self, buf: &[u8]) {
        let usable = buf.len() & !1;
        if usable != buf.len() {
            warn!(
                "{} bytes received, which is not a multiple of two; truncating trailing byte",
                buf.len()
            );
        }

        for word in buf[..usable].chunks_exact(2) {
            let event = u16::from_le_bytes([word[0], word[1]]);
            self.process_word(event);
        }
    }

    fn process_word(&mut self, event: u16) {
        let mut force_commit = false;

        if event & 0x8000 != 0 {
            self.last_ts = self.current_ts;
            self.current_ts = self.wrap_add.wrapping_add((event & 0x7FFF) as u32) as i32;
            self.check_monotonic_ts();
        } else {
            let code = ((event & 0x7000) >> 12) as u8;
            let data = event & 0x0FFF;

            match code {
                0 => self.handle_special(data, &mut force_commit),
                1 => self.handle_dvs_y(data),
                2 | 3 => self.handle_dvs_xy(code, data),
                4 => self.handle_aps_sample(data),
                5 => self.handle_misc8(data),
                7 => self.handle_ts_wrap(data),
                _ => error!("caught event that can't be handled: code={code}"),
            }
        }

        self.maybe_commit(force_commit);
    }

    fn check_monotonic_ts(&self) {
        if self.current_ts <= self.last_ts {
            warn!(
                "non-monotonic timestamp detected: last={}, current={}",
                self.last_ts, self.current_ts
            );
        }
    }

    fn handle_ts_wrap(&mut self, data: u16) {
        // Each wrap step is 2^15 µs; data carries the multiplier.
        self.wrap_add = self.wrap_add.wrapping_add(0x8000u32.wrapping_mul(data as u32));
        self.last_ts = self.current_ts;
        self.current_ts = self.wrap_add as i32;
        self.check_monotonic_ts();
        debug!("timestamp wrap event received with multiplier of {data}");
    }

    fn handle_special(&mut self, data: u16, force_commit: &mut bool) {
        match data {
            0 => error!("caught special reserved event"),

            1 => {
                self.wrap_add = 0;
                self.last_ts = 0;
                self.current_ts = 0;
                self.dvs_ts = 0;
                info!("timestamp reset event received");

                self.special_packet
                    .validate_and_push(SpecialEvent::new(TIMESTAMP_RESET_TS, SpecialEventType::TimestampReset, None));
                *force_commit = true;
            }

            2 => self.push_special_edge(SpecialEventType::ExternalInputFalling),
            3 => self.push_special_edge(SpecialEventType::ExternalInputRising),
            4 => self.push_special_edge(SpecialEventType::ExternalInputPulse),

            5 => {
                debug!("IMU6 start event received");
                self.imu_ignore_events = false;
                self.imu_count = 0;
                self.current_imu = Some(Imu6Event::new(self.current_ts));
            }

            7 => {
                debug!("IMU6 end event received");
                if self.imu_ignore_events {
                    return;
                }
                if self.imu_count == IMU6_COUNT {
                    if let Some(imu) = self.current_imu.take() {
                        self.imu_packet.validate_and_push(imu);
                    }
                } else {
                    info!(
                        "IMU6 end: failed to validate IMU sample count ({}), discarding sample",
                        self.imu_count
                    );
                    self.current_imu = None;
                }
            }

            8 => self.start_frame(true, true),
            9 => self.start_frame(false, true),
            14 => self.start_frame_no_reset_read(true),
            15 => self.start_frame_no_reset_read(false),

            10 => self.end_frame(),
            11 => self.start_column(ApsReadoutType::Reset),
            12 => self.start_column(ApsReadoutType::Signal),
            13 => self.end_column(),

            16..=31 => {
                debug!("IMU scale config event ({data}) received");
                if self.imu_ignore_events {
                    return;
                }
                self.accel_scale = accel_scale(((data >> 2) & 0x03) as u8);
                self.gyro_scale = gyro_scale((data & 0x03) as u8);

                if self.imu_count != 0 {
                    info!("IMU scale config: previous IMU start event missed, attempting recovery");
                }
                self.imu_count = 1;
            }

            _ => error!("caught special event that can't be handled: {data}"),
        }
    }

    fn push_special_edge(&mut self, kind: SpecialEventType) {
        self.special_packet
            .validate_and_push(SpecialEvent::new(self.current_ts as u32, kind, None));
    }

    fn handle_dvs_y(&mut self, data: u16) {
        if data >= self.geometry.dvs_h {
            warn!("DVS: Y address out of range (0-{}): {data}", self.geometry.dvs_h - 1);
            return;
        }

        if self.dvs_got_y {
            self.special_packet.validate_and_push(SpecialEvent::new(
                self.dvs_ts as u32,
                SpecialEventType::DvsRowOnly,
                Some(self.dvs_last_y as u32),
            ));
            debug!("DVS: row-only event received for address Y={}", self.dvs_last_y);
        }

        self.dvs_last_y = data;
        self.dvs_got_y = true;
        self.dvs_ts = self.current_ts;
    }

    fn handle_dvs_xy(&mut self, code: u8, data: u16) {
        if data >= self.geometry.dvs_w {
            warn!("DVS: X address out of range (0-{}): {data}", self.geometry.dvs_w - 1);
            return;
        }

        // code 2 = OFF, code 3 = ON; DAVIS208's high-gain rows invert
        // polarity because of the pre-amplifier's negative gain.
        let polarity_on = if self.geometry.chip_id == ChipId::Davis208 && data < 192 {
            code != 3
        } else {
            code == 3
        };

        let (x, y) = if self.geometry.orientation.dvs_invert_xy {
            (self.dvs_last_y, data)
        } else {
            (data, self.dvs_last_y)
        };

        self.polarity_packet
            .validate_and_push(PolarityEvent::new(self.dvs_ts as u32, x, y, polarity_on));
        self.dvs_got_y = false;
    }

    fn start_frame(&mut self, global_shutter: bool, reset_read: bool) {
        self.aps_ignore_events = false;
        self.aps_global_shutter = global_shutter;
        self.aps_reset_read = reset_read;
        self.init_frame();
    }

    fn start_frame_no_reset_read(&mut self, global_shutter: bool) {
        self.start_frame(global_shutter, false);
        if let Some(frame) = self.current_frame.as_mut() {
            frame.set_ts_start_of_exposure(self.current_ts);
        }
    }

    fn init_frame(&mut self) {
        self.aps_current_readout = ApsReadoutType::Reset;
        self.aps_count_x = ApsCounts::default();
        self.aps_count_y = ApsCounts::default();

        let channels = if self.geometry.channels == 4 {
            ChannelCount::Rgba
        } else {
            ChannelCount::Mono
        };
        self.current_frame = Some(FrameEvent::new(
            self.current_ts,
            self.geometry.aps_window0_w,
            self.geometry.aps_window0_h,
            channels,
        ));
    }

    fn start_column(&mut self, ty: ApsReadoutType) {
        if self.aps_ignore_events {
            return;
        }
        self.aps_current_readout = ty;
        self.aps_count_y.set(ty, 0);
        self.aps_rgb_offset_increasing = true;
        self.aps_rgb_offset = 1;

        let Some(frame) = self.current_frame.as_mut() else { return };
        match ty {
            ApsReadoutType::Reset => {
                if !self.aps_global_shutter && self.aps_count_x.get(ApsReadoutType::Reset) == 0 {
                    frame.set_ts_start_of_exposure(self.current_ts);
                }
            }
            ApsReadoutType::Signal => {
                if self.aps_count_x.get(ApsReadoutType::Signal) == 0 {
                    frame.set_ts_end_of_exposure(self.current_ts);
                }
            }
        }
    }

    fn end_column(&mut self) {
        if self.aps_ignore_events {
            return;
        }
        let ty = self.aps_current_readout;
        let Some(frame) = self.current_frame.as_mut() else { return };

        if self.aps_count_y.get(ty) != frame.height() {
            error!("APS column end: wrong row count [{:?} - {}] detected", ty, self.aps_count_y.get(ty));
        }

        self.aps_count_x.incr(ty);

        if self.aps_global_shutter && ty == ApsReadoutType::Reset && self.aps_count_x.get(ty) == frame.width() {
            frame.set_ts_start_of_exposure(self.current_ts);
        }
    }

    fn end_frame(&mut self) {
        if self.aps_ignore_events {
            return;
        }
        let Some(mut frame) = self.current_frame.take() else { return };

        let mut valid = true;
        for ty in [ApsReadoutType::Reset, ApsReadoutType::Signal] {
            let mut expect = frame.width();
            if ty == ApsReadoutType::Reset && !self.aps_reset_read {
                expect = 0;
            }
            if self.aps_count_x.get(ty) != expect {
                error!("APS frame end: wrong column count [{:?} - {}] detected", ty, self.aps_count_x.get(ty));
                valid = false;
            }
        }

        frame.set_ts_end_of_frame(self.current_ts);
        if valid {
            self.frame_packet.validate_and_push(frame);
        } else {
            self.frame_packet.push(frame);
        }
    }

    fn handle_aps_sample(&mut self, data: u16) {
        if self.aps_ignore_events {
            return;
        }
        let ty = self.aps_current_readout;

        let Some(frame) = self.current_frame.as_mut() else { return };
        if self.aps_count_y.get(ty) >= frame.height() {
            debug!("APS ADC sample: row count is at maximum, discarding further samples");
            return;
        }
        if self.aps_count_x.get(ty) >= frame.width() {
            debug!("APS ADC sample: column count is at maximum, discarding further samples");
            return;
        }

        let (width, height) = (frame.width(), frame.height());

        let mut x_pos = if self.geometry.orientation.aps_flip_x {
            width - 1 - self.aps_count_x.get(ty)
        } else {
            self.aps_count_x.get(ty)
        };
        let mut y_pos = if self.geometry.orientation.aps_flip_y {
            height - 1 - self.aps_count_y.get(ty)
        } else {
            self.aps_count_y.get(ty)
        };

        if self.geometry.chip_id == ChipId::DavisRgb {
            y_pos = (y_pos as i32 + self.aps_rgb_offset) as u16;
        }

        if self.geometry.orientation.aps_invert_xy {
            std::mem::swap(&mut x_pos, &mut y_pos);
        }

        let pixel_position = y_pos as usize * width as usize + x_pos as usize;

        let x_abs = x_pos + self.geometry.aps_window0_x;
        let y_abs = y_pos + self.geometry.aps_window0_y;
        let scratch_idx = self.geometry.reset_scratch_index(x_abs, y_abs);

        let is_rgb_gs = self.geometry.chip_id == ChipId::DavisRgb && self.aps_global_shutter;
        let stores_to_scratch = (ty == ApsReadoutType::Reset && !is_rgb_gs) || (ty == ApsReadoutType::Signal && is_rgb_gs);

        if stores_to_scratch {
            if let Some(slot) = self.reset_scratch.get_mut(scratch_idx) {
                *slot = data;
            }
        } else {
            let reset_sample = self.reset_scratch.get(scratch_idx).copied().unwrap_or(0) as i32;
            let mut pixel_value = if is_rgb_gs {
                data as i32 - reset_sample
            } else {
                reset_sample - data as i32
            };
            pixel_value = pixel_value.max(0);
            pixel_value <<= 16 - ADC_DEPTH;

            if let Some(slot) = frame.pixels_mut().get_mut(pixel_position) {
                *slot = pixel_value as u16;
            }
        }

        self.aps_count_y.incr(ty);

        if self.geometry.chip_id == ChipId::DavisRgb {
            if self.aps_rgb_offset_increasing {
                self.aps_rgb_offset += 1;
                if self.aps_rgb_offset == 321 {
                    self.aps_rgb_offset_increasing = false;
                    self.aps_rgb_offset = 318;
                }
            } else {
                self.aps_rgb_offset -= 3;
            }
        }
    }

    fn handle_misc8(&mut self, data: u16) {
        let misc8_code = ((data & 0x0F00) >> 8) as u8;
        let misc8_data = (data & 0x00FF) as u8;

        if misc8_code != 0 {
            error!("caught Misc8 event that can't be handled");
            return;
        }
        if self.imu_ignore_events {
            return;
        }
        if self.imu_count >= IMU6_COUNT {
            info!("IMU data: IMU sample count is at maximum, discarding further samples");
            return;
        }

        let mut count = self.imu_count;
        if count == 0 {
            error!("IMU data: missing IMU scale config event, parsing continues with default scales");
            count = 1;
        }

        let Some(imu) = self.current_imu.as_mut() else {
            self.imu_count = count + 1;
            return;
        };

        match count {
            1 | 3 | 5 | 7 | 9 | 11 | 13 => self.imu_tmp = misc8_data,
            2 => imu.set_accel_x(combine16(self.imu_tmp, misc8_data) as f32 / self.accel_scale),
            4 => imu.set_accel_y(combine16(self.imu_tmp, misc8_data) as f32 / self.accel_scale),
            6 => imu.set_accel_z(combine16(self.imu_tmp, misc8_data) as f32 / self.accel_scale),
            8 => imu.set_temp(combine16(self.imu_tmp, misc8_data) as f32 / 340.0 + 36.53),
            10 => imu.set_gyro_x(combine16(self.imu_tmp, misc8_data) as f32 / self.gyro_scale),
            12 => imu.set_gyro_y(combine16(self.imu_tmp, misc8_data) as f32 / self.gyro_scale),
            14 => imu.set_gyro_z(combine16(self.imu_tmp, misc8_data) as f32 / self.gyro_scale),
            _ => {}
        }

        self.imu_count = count + 1;
    }

    /// Evaluates the four streams' commit conditions and folds
    /// whichever just triggered into one container, put on the ring
    /// in a single attempt. A force-commit (from a `TIMESTAMP_RESET`)
    /// spins until the whole container lands, rather than dropping it.
    fn maybe_commit(&mut self, force: bool) {
        let commit_polarity = should_commit(&self.polarity_packet, force, self.config.max_packet_interval_us(Stream::Polarity));
        let commit_special = should_commit(&self.special_packet, force, self.config.max_packet_interval_us(Stream::Special));
        let commit_frame = should_commit(&self.frame_packet, force, self.config.max_packet_interval_us(Stream::Frame));
        let commit_imu = should_commit(&self.imu_packet, force, self.config.max_packet_interval_us(Stream::Imu6));

        if !(commit_polarity || commit_special || commit_frame || commit_imu) {
            return;
        }

        let mut container = Box::new(PacketContainer::empty());
        if commit_polarity {
            let cap = self.config.max_packet_size(Stream::Polarity);
            container.polarity = Some(std::mem::replace(&mut self.polarity_packet, Packet::new(self.source_id, cap)));
        }
        if commit_special {
            let cap = self.config.max_packet_size(Stream::Special);
            container.special = Some(std::mem::replace(&mut self.special_packet, Packet::new(self.source_id, cap)));
        }
        if commit_frame {
            let cap = self.config.max_packet_size(Stream::Frame);
            container.frame = Some(std::mem::replace(&mut self.frame_packet, Packet::new(self.source_id, cap)));
            // Mid-frame partial state must not bleed into the next packet;
            // cleared again by the next frame-start event.
            self.aps_ignore_events = true;
        }
        if commit_imu {
            let cap = self.config.max_packet_size(Stream::Imu6);
            container.imu6 = Some(std::mem::replace(&mut self.imu_packet, Packet::new(self.source_id, cap)));
            self.imu_ignore_events = true;
        }

        if container.is_empty() {
            return;
        }

        let mut pending = container;
        loop {
            match self.ring.put(pending) {
                Ok(()) => {
                    if let Some(hook) = &self.on_increase {
                        hook();
                    }
                    break;
                }
                Err(back) => {
                    if force {
                        // Special-stream force commits must not be dropped.
                        pending = back;
                        continue;
                    }
                    warn!("ring full, dropping packet container");
                    break;
                }
            }
        }
    }
}

fn combine16(hi: u8, lo: u8) -> i16 {
    (((hi as u16) << 8) | lo as u16) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::geometry::Orientation;

    fn test_geometry() -> Geometry {
        Geometry {
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
        }
    }

    fn test_decoder() -> Decoder {
        let ring = Arc::new(Ring::new(4));
        let config = Arc::new(RuntimeConfig::new());
        Decoder::new(1, test_geometry(), config, ring)
    }

    fn word(code: u8, data: u16) -> u16 {
        ((code as u16) << 12) | (data & 0x0FFF)
    }

    fn ts_word(raw: u16) -> u16 {
        0x8000 | (raw & 0x7FFF)
    }

    #[test]
    fn dvs_row_and_column_emit_polarity_event() {
        let mut decoder = test_decoder();
        decoder.process_word(ts_word(100));
        decoder.process_word(word(1, 50)); // Y
        decoder.process_word(word(3, 20)); // X, ON
        assert_eq!(decoder.polarity_packet.position(), 1);
        let ev = &decoder.polarity_packet.events()[0];
        assert_eq!(ev.x(), 20);
        assert_eq!(ev.y(), 50);
        assert!(ev.polarity_on());
    }

    #[test]
    fn out_of_range_dvs_address_is_skipped() {
        let mut decoder = test_decoder();
        decoder.process_word(ts_word(1));
        decoder.process_word(word(1, 50));
        decoder.process_word(word(2, 4095)); // out of range X (>= 240)
        assert_eq!(decoder.polarity_packet.position(), 0);
    }

    #[test]
    fn timestamp_reset_forces_commit_and_emits_special_event() {
        let mut decoder = test_decoder();
        decoder.process_word(ts_word(5));
        decoder.process_word(word(1, 10));
        decoder.process_word(word(3, 10));
        decoder.process_word(word(0, 1)); // timestamp reset
        assert_eq!(decoder.ring.len(), 1);
        let container = decoder.ring.get().unwrap();
        let special = container.special.unwrap();
        assert_eq!(special.events()[0].kind(), SpecialEventType::TimestampReset);
        let polarity = container.polarity.unwrap();
        assert_eq!(polarity.position(), 1);
    }

    #[test]
    fn imu6_sample_validates_after_fourteen_misc8_bytes() {
        let mut decoder = test_decoder();
        decoder.process_word(ts_word(1));
        decoder.process_word(word(0, 5)); // IMU6 start
        decoder.process_word(word(0, 16)); // scale config, all defaults
        for i in 0..14u8 {
            decoder.process_word(word(5, i as u16));
        }
        decoder.process_word(word(0, 7)); // IMU6 end
        assert_eq!(decoder.imu_packet.position(), 1);
        assert!(decoder.imu_packet.events()[0].is_valid());
    }

    #[test]
    fn imu6_end_without_full_count_discards_sample() {
        let mut decoder = test_decoder();
        decoder.process_word(ts_word(1));
        decoder.process_word(word(0, 5)); // IMU6 start
        decoder.process_word(word(0, 16)); // scale config
        decoder.process_word(word(5, 0)); // only one Misc8 byte
        decoder.process_word(word(0, 7)); // IMU6 end
        assert_eq!(decoder.imu_packet.position(), 0);
    }

    #[test]
    fn dvs_row_only_emitted_when_y_arrives_twice() {
        let mut decoder = test_decoder();
        decoder.process_word(ts_word(1));
        decoder.process_word(word(1, 5));
        decoder.process_word(word(1, 6));
        assert_eq!(decoder.special_packet.position(), 1);
        assert_eq!(decoder.special_packet.events()[0].kind(), SpecialEventType::DvsRowOnly);
        assert_eq!(decoder.special_packet.events()[0].data(), Some(5));
    }

    #[test]
    fn davis208_inverts_high_gain_row_polarity() {
        let mut geometry = test_geometry();
        geometry.chip_id = ChipId::Davis208;
        let ring = Arc::new(Ring::new(4));
        let config = Arc::new(RuntimeConfig::new());
        let mut decoder = Decoder::new(1, geometry, config, ring);

        decoder.process_word(ts_word(1));
        decoder.process_word(word(1, 50));
        decoder.process_word(word(3, 100)); // X < 192, ON code inverted to OFF
        assert!(!decoder.polarity_packet.events()[0].polarity_on());
    }

    #[test]
    fn odd_trailing_byte_is_truncated() {
        let mut decoder = test_decoder();
        decoder.process_bytes(&[0x00, 0x80, 0xFF]); // one full word + stray byte
        assert_eq!(decoder.current_ts, 0);
    }
}
