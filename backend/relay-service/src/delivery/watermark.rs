//! Sequence watermarks and gap bookkeeping.
//!
//! A stream is one conversation as seen by one reader. The cursor tracks the
//! last contiguously-confirmed sequence number; observing a new sequence
//! number either advances it, is stale, or opens a gap. All of this is pure
//! so ordering rules can be tested with no database.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Widest span a single repair request may cover.
pub const DEFAULT_MAX_REPAIR_SPAN: i64 = 500;

/// Repair attempts per gap before it is surfaced as failed.
pub const MAX_REPAIR_ATTEMPTS: u32 = 5;

/// Watermark over one sequence stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    last_contiguous_seq: i64,
}

/// Result of feeding one observed sequence number to a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// seq == watermark + 1; watermark advanced
    Advanced,
    /// seq <= watermark; already covered, nothing to do
    Stale,
    /// seq > watermark + 1; the range in between is missing. The watermark
    /// still advances to seq so later messages keep flowing while the hole
    /// is repaired.
    GapDetected { from_seq: i64, to_seq: i64 },
}

impl StreamCursor {
    pub fn new(last_contiguous_seq: i64) -> Self {
        Self {
            last_contiguous_seq: last_contiguous_seq.max(0),
        }
    }

    pub fn last_contiguous_seq(&self) -> i64 {
        self.last_contiguous_seq
    }

    pub fn observe(&mut self, seq: i64) -> Observation {
        let expected = self.last_contiguous_seq + 1;
        if seq == expected {
            self.last_contiguous_seq = seq;
            Observation::Advanced
        } else if seq <= self.last_contiguous_seq {
            Observation::Stale
        } else {
            let gap = Observation::GapDetected {
                from_seq: expected,
                to_seq: seq - 1,
            };
            self.last_contiguous_seq = seq;
            gap
        }
    }
}

impl Default for StreamCursor {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Lifecycle of a detected gap while it is being repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapStatus {
    PendingRepair,
    Repairing,
    Repaired,
    RepairFailed,
}

/// A detected hole in one stream. Ephemeral bookkeeping, never the source of
/// truth: the server's `server_seq` assignment is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageGap {
    pub stream_id: Uuid,
    pub from_seq: i64,
    pub to_seq: i64,
    pub status: GapStatus,
    pub retry_count: u32,
}

impl MessageGap {
    pub fn span(&self) -> i64 {
        self.to_seq - self.from_seq + 1
    }
}

/// Per-reader gap state across streams.
#[derive(Debug, Default)]
pub struct GapTracker {
    cursors: HashMap<Uuid, StreamCursor>,
    gaps: Vec<MessageGap>,
}

impl GapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_contiguous_seq(&self, stream_id: Uuid) -> i64 {
        self.cursors
            .get(&stream_id)
            .map(|c| c.last_contiguous_seq())
            .unwrap_or(0)
    }

    /// Feed one observed sequence number; records a gap when one opens.
    pub fn observe(&mut self, stream_id: Uuid, seq: i64) -> Observation {
        let cursor = self.cursors.entry(stream_id).or_default();
        let observation = cursor.observe(seq);
        if let Observation::GapDetected { from_seq, to_seq } = observation {
            self.gaps.push(MessageGap {
                stream_id,
                from_seq,
                to_seq,
                status: GapStatus::PendingRepair,
                retry_count: 0,
            });
        }
        observation
    }

    /// Gaps still awaiting repair (any status except REPAIRED, which is
    /// removed outright).
    pub fn active_gaps(&self, stream_id: Uuid) -> Vec<&MessageGap> {
        self.gaps
            .iter()
            .filter(|g| g.stream_id == stream_id)
            .collect()
    }

    /// Mark a gap as being repaired and count the attempt. Returns `false`
    /// once the attempt budget is exhausted, flipping the gap to
    /// REPAIR_FAILED instead of retrying forever.
    pub fn begin_repair(&mut self, stream_id: Uuid, from_seq: i64) -> bool {
        if let Some(gap) = self.find_mut(stream_id, from_seq) {
            if gap.status == GapStatus::RepairFailed {
                return false;
            }
            if gap.retry_count >= MAX_REPAIR_ATTEMPTS {
                gap.status = GapStatus::RepairFailed;
                return false;
            }
            gap.status = GapStatus::Repairing;
            gap.retry_count += 1;
            return true;
        }
        false
    }

    /// Repair succeeded: forget the gap.
    pub fn complete_repair(&mut self, stream_id: Uuid, from_seq: i64) {
        self.gaps
            .retain(|g| !(g.stream_id == stream_id && g.from_seq == from_seq));
    }

    /// Repair attempt failed; the gap stays active unless the budget ran out.
    pub fn fail_repair(&mut self, stream_id: Uuid, from_seq: i64) {
        if let Some(gap) = self.find_mut(stream_id, from_seq) {
            gap.status = if gap.retry_count >= MAX_REPAIR_ATTEMPTS {
                GapStatus::RepairFailed
            } else {
                GapStatus::PendingRepair
            };
        }
    }

    fn find_mut(&mut self, stream_id: Uuid, from_seq: i64) -> Option<&mut MessageGap> {
        self.gaps
            .iter_mut()
            .find(|g| g.stream_id == stream_id && g.from_seq == from_seq)
    }
}

/// Validated inclusive repair range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRange {
    pub from_seq: i64,
    pub to_seq: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("start_seq and end_seq must be positive with start_seq <= end_seq")]
    Invalid,
    #[error("requested span {span} exceeds the maximum of {max} messages per repair")]
    TooLarge { span: i64, max: i64 },
}

impl RepairRange {
    /// Check bounds and the span cap before a repair read is served.
    pub fn validate(from_seq: i64, to_seq: i64, max_span: i64) -> Result<Self, RangeError> {
        if from_seq <= 0 || to_seq <= 0 || from_seq > to_seq {
            return Err(RangeError::Invalid);
        }
        let span = to_seq - from_seq + 1;
        if span > max_span {
            return Err(RangeError::TooLarge {
                span,
                max: max_span,
            });
        }
        Ok(Self { from_seq, to_seq })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_observations_never_gap() {
        let mut cursor = StreamCursor::default();
        for seq in 1..=10 {
            assert_eq!(cursor.observe(seq), Observation::Advanced);
        }
        assert_eq!(cursor.last_contiguous_seq(), 10);
    }

    #[test]
    fn test_jump_opens_gap_and_advances() {
        let mut cursor = StreamCursor::default();
        assert_eq!(cursor.observe(1), Observation::Advanced);
        assert_eq!(cursor.observe(2), Observation::Advanced);
        assert_eq!(
            cursor.observe(5),
            Observation::GapDetected {
                from_seq: 3,
                to_seq: 4
            }
        );
        // Watermark does not block on the gap
        assert_eq!(cursor.last_contiguous_seq(), 5);
        assert_eq!(cursor.observe(6), Observation::Advanced);
    }

    #[test]
    fn test_stale_observation_is_ignored() {
        let mut cursor = StreamCursor::default();
        cursor.observe(1);
        cursor.observe(2);
        cursor.observe(3);
        assert_eq!(cursor.observe(2), Observation::Stale);
        assert_eq!(cursor.observe(3), Observation::Stale);
        assert_eq!(cursor.last_contiguous_seq(), 3);
    }

    #[test]
    fn test_first_observation_past_one_gaps_from_one() {
        let mut cursor = StreamCursor::default();
        assert_eq!(
            cursor.observe(5),
            Observation::GapDetected {
                from_seq: 1,
                to_seq: 4
            }
        );
    }

    #[test]
    fn test_large_jump_span() {
        let mut cursor = StreamCursor::default();
        cursor.observe(1);
        match cursor.observe(100) {
            Observation::GapDetected { from_seq, to_seq } => {
                assert_eq!(from_seq, 2);
                assert_eq!(to_seq, 99);
                assert_eq!(to_seq - from_seq + 1, 98);
            }
            other => panic!("expected gap, got {:?}", other),
        }
    }

    #[test]
    fn test_tracker_records_and_lists_gaps() {
        let mut tracker = GapTracker::new();
        let stream = Uuid::new_v4();

        tracker.observe(stream, 1);
        tracker.observe(stream, 2);
        tracker.observe(stream, 5);

        let gaps = tracker.active_gaps(stream);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].from_seq, 3);
        assert_eq!(gaps[0].to_seq, 4);
        assert_eq!(gaps[0].status, GapStatus::PendingRepair);
        assert_eq!(gaps[0].span(), 2);
    }

    #[test]
    fn test_tracker_streams_are_independent() {
        let mut tracker = GapTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        tracker.observe(a, 1);
        tracker.observe(a, 5);
        tracker.observe(b, 1);
        tracker.observe(b, 2);

        assert_eq!(tracker.active_gaps(a).len(), 1);
        assert!(tracker.active_gaps(b).is_empty());
        assert_eq!(tracker.last_contiguous_seq(a), 5);
        assert_eq!(tracker.last_contiguous_seq(b), 2);
    }

    #[test]
    fn test_repair_lifecycle() {
        let mut tracker = GapTracker::new();
        let stream = Uuid::new_v4();
        tracker.observe(stream, 1);
        tracker.observe(stream, 4);

        assert!(tracker.begin_repair(stream, 2));
        assert_eq!(tracker.active_gaps(stream)[0].status, GapStatus::Repairing);
        assert_eq!(tracker.active_gaps(stream)[0].retry_count, 1);

        tracker.complete_repair(stream, 2);
        assert!(tracker.active_gaps(stream).is_empty());

        // Later in-order delivery keeps working after the repair
        assert_eq!(tracker.observe(stream, 5), Observation::Advanced);
    }

    #[test]
    fn test_repair_attempts_are_bounded() {
        let mut tracker = GapTracker::new();
        let stream = Uuid::new_v4();
        tracker.observe(stream, 1);
        tracker.observe(stream, 3);

        for _ in 0..MAX_REPAIR_ATTEMPTS {
            assert!(tracker.begin_repair(stream, 2));
            tracker.fail_repair(stream, 2);
        }

        // Budget exhausted: surfaced as failed, no further attempts
        assert!(!tracker.begin_repair(stream, 2));
        assert_eq!(
            tracker.active_gaps(stream)[0].status,
            GapStatus::RepairFailed
        );
    }

    #[test]
    fn test_begin_repair_unknown_gap_is_false() {
        let mut tracker = GapTracker::new();
        assert!(!tracker.begin_repair(Uuid::new_v4(), 2));
    }

    #[test]
    fn test_repair_range_validation() {
        assert_eq!(
            RepairRange::validate(2, 4, DEFAULT_MAX_REPAIR_SPAN),
            Ok(RepairRange {
                from_seq: 2,
                to_seq: 4
            })
        );
        assert_eq!(
            RepairRange::validate(0, 4, DEFAULT_MAX_REPAIR_SPAN),
            Err(RangeError::Invalid)
        );
        assert_eq!(
            RepairRange::validate(5, 4, DEFAULT_MAX_REPAIR_SPAN),
            Err(RangeError::Invalid)
        );
        assert_eq!(
            RepairRange::validate(1, 501, 500),
            Err(RangeError::TooLarge {
                span: 501,
                max: 500
            })
        );
        // Exactly at the cap is allowed
        assert!(RepairRange::validate(1, 500, 500).is_ok());
    }
}
