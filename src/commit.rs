//! Packet commit policy: deciding when to seal an in-flight
//! packet and hand it to the ring exchange.
//!
//! Commit triggers: a force-commit flag (set by a `TIMESTAMP_RESET`
//! marker), OR `position >= capacity`, OR `position > 1` and the
//! interval between the first and last event's commit-relevant
//! timestamp has reached the stream's configured maximum.

use crate::event::{FrameEvent, Imu6Event, Packet, PolarityEvent, SpecialEvent};

/// The timestamp a stream uses for its packet-interval commit check.
/// Frames use `ts_start_of_exposure` rather than their own event
/// timestamp (there is none; a frame carries four boundary
/// timestamps).
pub(crate) trait CommitTimestamp {
    fn commit_ts(&self) -> i64;
}

impl CommitTimestamp for PolarityEvent {
    fn commit_ts(&self) -> i64 {
        self.ts() as i64
    }
}
impl CommitTimestamp for SpecialEvent {
    fn commit_ts(&self) -> i64 {
        self.ts() as i64
    }
}
impl CommitTimestamp for Imu6Event {
    fn commit_ts(&self) -> i64 {
        self.ts() as i64
    }
}
impl CommitTimestamp for FrameEvent {
    fn commit_ts(&self) -> i64 {
        self.ts_start_of_exposure().unwrap_or(self.ts_start_of_frame()) as i64
    }
}

/// Evaluates the three commit triggers against a packet's current
/// contents. Does not itself touch the ring; the caller acts on the
/// verdict (see `Decoder::maybe_commit` in [`crate::decoder`]).
pub(crate) fn should_commit<T: CommitTimestamp>(packet: &Packet<T>, force: bool, max_interval_us: u32) -> bool {
    if force {
        return true;
    }
    if packet.position() >= packet.capacity() {
        return true;
    }
    if packet.position() > 1 {
        let events = packet.events();
        let first = events[0].commit_ts();
        let last = events[events.len() - 1].commit_ts();
        if last.wrapping_sub(first) >= max_interval_us as i64 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Validate;

    #[test]
    fn commits_on_capacity() {
        let mut packet: Packet<PolarityEvent> = Packet::new(1, 2);
        packet.validate_and_push(PolarityEvent::new(0, 0, 0, true));
        packet.validate_and_push(PolarityEvent::new(1, 0, 0, true));
        assert!(should_commit(&packet, false, 1_000_000));
    }

    #[test]
    fn commits_on_interval() {
        let mut packet: Packet<PolarityEvent> = Packet::new(1, 100);
        packet.validate_and_push(PolarityEvent::new(0, 0, 0, true));
        packet.validate_and_push(PolarityEvent::new(6000, 0, 0, true));
        assert!(should_commit(&packet, false, 5000));
    }

    #[test]
    fn does_not_commit_with_single_event_under_capacity() {
        let mut packet: Packet<PolarityEvent> = Packet::new(1, 100);
        packet.validate_and_push(PolarityEvent::new(0, 0, 0, true));
        assert!(!should_commit(&packet, false, 5000));
    }

    #[test]
    fn force_always_commits() {
        let packet: Packet<PolarityEvent> = Packet::new(1, 100);
        assert!(should_commit(&packet, true, 5000));
    }
}
