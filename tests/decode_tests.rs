use std::sync::Arc;

use davis_core::config::RuntimeConfig;
use davis_core::geometry::{ChipId, Geometry, Orientation};
use davis_core::ring::Ring;
use davis_core::{Decoder, SpecialEventType};

fn word(code: u8, data: u16) -> u16 {
    ((code as u16) << 12) | (data & 0x0FFF)
}

fn ts_word(raw: u16) -> u16 {
    0x8000 | (raw & 0x7FFF)
}

fn combine16(hi: u8, lo: u8) -> i16 {
    (((hi as u16) << 8) | lo as u16) as i16
}

fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

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

fn test_decoder() -> (Decoder, Arc<Ring>) {
    let ring = Arc::new(Ring::new(8));
    let config = Arc::new(RuntimeConfig::new());
    (Decoder::new(1, test_geometry(), config, Arc::clone(&ring)), ring)
}

#[test]
fn s1_minimal_polarity() {
    let (mut decoder, ring) = test_decoder();
    decoder.process_bytes(&words_to_bytes(&[ts_word(5), word(1, 2), word(3, 16)]));
    // nothing committed yet below threshold; force a commit to observe state
    decoder.process_bytes(&words_to_bytes(&[word(0, 1)]));

    let container = ring.get().expect("a container should have committed");
    let polarity = container.polarity.expect("polarity packet committed");
    assert_eq!(polarity.position(), 1);
    let ev = &polarity.events()[0];
    assert_eq!(ev.ts(), 5);
    assert_eq!(ev.x(), 16);
    assert_eq!(ev.y(), 2);
    assert!(ev.polarity_on());
    assert!(ev.is_valid());
}

#[test]
fn s2_row_only() {
    let (mut decoder, ring) = test_decoder();
    decoder.process_bytes(&words_to_bytes(&[ts_word(5), word(1, 2), word(1, 3), word(3, 16)]));
    decoder.process_bytes(&words_to_bytes(&[word(0, 1)]));

    let container = ring.get().unwrap();
    let special = container.special.expect("row-only special event committed");
    assert_eq!(special.events()[0].kind(), SpecialEventType::DvsRowOnly);
    assert_eq!(special.events()[0].ts(), 5);
    assert_eq!(special.events()[0].data(), Some(2));

    let polarity = container.polarity.expect("polarity packet committed");
    let ev = &polarity.events()[0];
    assert_eq!(ev.ts(), 5);
    assert_eq!(ev.x(), 16);
    assert_eq!(ev.y(), 3);
    assert!(ev.polarity_on());
}

#[test]
fn s3_timestamp_wrap_then_plain_timestamp_is_monotonic() {
    let (mut decoder, ring) = test_decoder();
    // wrap step (multiplier 1) followed by a plain ts word of 0 lands at 0x8000,
    // which must read back as the polarity event's expanded timestamp.
    decoder.process_bytes(&words_to_bytes(&[word(7, 1), ts_word(0), word(1, 1), word(3, 1)]));
    decoder.process_bytes(&words_to_bytes(&[word(0, 1)]));

    let container = ring.get().unwrap();
    let polarity = container.polarity.unwrap();
    assert_eq!(polarity.events()[0].ts(), 0x8000);
}

#[test]
fn s4_timestamp_reset_forces_commit_of_every_stream() {
    let (mut decoder, ring) = test_decoder();
    decoder.process_bytes(&words_to_bytes(&[
        ts_word(1),
        word(1, 0),
        word(3, 0),
        word(1, 1),
        word(3, 1),
        word(1, 2),
        word(3, 2),
        word(0, 1), // timestamp reset
    ]));

    let container = ring.get().unwrap();
    let special = container.special.unwrap();
    assert_eq!(special.events()[0].kind(), SpecialEventType::TimestampReset);
    assert_eq!(special.events()[0].ts(), u32::MAX);
    assert!(special.events()[0].is_valid());

    let polarity = container.polarity.unwrap();
    assert_eq!(polarity.position(), 3);
}

#[test]
fn s5_frame_end_with_mismatched_columns_is_not_validated() {
    let (mut decoder, ring) = test_decoder();
    let mut words = vec![ts_word(1), word(0, 8)]; // global-shutter frame start, reset read
    for _ in 0..3 {
        words.push(word(0, 11)); // reset-column start
        words.push(word(0, 13)); // reset-column end
    }
    words.push(word(0, 10)); // frame end; only 3 of 240 reset columns seen
    words.push(word(0, 1)); // timestamp reset, forces the frame stream to commit too
    decoder.process_bytes(&words_to_bytes(&words));

    let container = ring.get().unwrap();
    let frame = container.frame.expect("frame packet committed despite the mismatch");
    assert_eq!(frame.position(), 1);
    assert!(!frame.events()[0].is_valid());
}

#[test]
fn s6_imu_full_cycle() {
    let (mut decoder, ring) = test_decoder();
    let mut words = vec![ts_word(1), word(0, 5), word(0, 16)]; // IMU6 start, scale config (idx 0/0)
    for i in 0..14u8 {
        words.push(word(5, i as u16));
    }
    words.push(word(0, 7)); // IMU6 end
    words.push(word(0, 1)); // force commit
    decoder.process_bytes(&words_to_bytes(&words));

    let container = ring.get().unwrap();
    let imu6 = container.imu6.expect("imu6 packet committed");
    assert_eq!(imu6.position(), 1);
    let ev = &imu6.events()[0];
    assert!(ev.is_valid());

    // accel_scale(0) = 65536/4 = 16384; the first accel axis pairs misc8 bytes 0 and 1.
    let expected_accel_x = combine16(0, 1) as f32 / 16384.0;
    assert_eq!(ev.accel()[0], expected_accel_x);
}

#[test]
fn out_of_range_dvs_address_is_dropped_without_desync() {
    let (mut decoder, ring) = test_decoder();
    decoder.process_bytes(&words_to_bytes(&[
        ts_word(1),
        word(1, 4095), // Y out of range for a 180-row sensor, dropped
        word(1, 10),
        word(3, 10),
        word(0, 1),
    ]));
    let container = ring.get().unwrap();
    let polarity = container.polarity.unwrap();
    assert_eq!(polarity.position(), 1);
}

#[test]
fn arbitrary_bytes_never_panic() {
    let (mut decoder, _ring) = test_decoder();
    let garbage: Vec<u8> = (0u32..2000).map(|i| (i.wrapping_mul(37).wrapping_add(11)) as u8).collect();
    decoder.process_bytes(&garbage);
}

#[test]
fn odd_trailing_byte_is_truncated_without_panic() {
    let (mut decoder, _ring) = test_decoder();
    decoder.process_bytes(&[0x00, 0x80, 0xFF]);
}
