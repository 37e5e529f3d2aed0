//! Sequence gap and reordering detection.
//!
//! Sequence numbers are 8 bit and wrap. A forward jump marks the skipped
//! numbers as *pending*; a pending number that turns up later is a
//! reordered packet, one that never turns up within the eviction window is
//! a drop.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

/// Default time a skipped sequence number may stay pending before it is
/// counted as dropped.
pub const EVICTION_WINDOW: Duration = Duration::from_secs(3);

/// Half the sequence space. Anything less than this far behind the last
/// sequence is a late packet, not a wrap.
const HALF_RANGE: u8 = 128;

/// How one sequence number was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// First packet seen.
    First,
    /// Exactly the expected successor.
    InOrder,
    /// Jumped ahead; `skipped` numbers are now pending.
    Gap { skipped: u8 },
    /// Filled a pending gap.
    Reordered,
    /// Behind the last sequence and not pending (duplicate or very late).
    Late,
}

/// Drop and bad-order counts accumulated since the last
/// [`SequenceTracker::take_counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCounts {
    pub dropped: u64,
    pub bad_order: u64,
}

/// Per-link sequence state.
#[derive(Debug)]
pub struct SequenceTracker {
    window: Duration,
    last_sequence: Option<u8>,
    pending: BTreeMap<u8, Instant>,
    counts: SequenceCounts,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(EVICTION_WINDOW)
    }
}

impl SequenceTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sequence: None,
            pending: BTreeMap::new(),
            counts: SequenceCounts::default(),
        }
    }

    /// Classify `sequence` received at `now`.
    pub fn track(&mut self, sequence: u8, now: Instant) -> SequenceOutcome {
        self.sweep(now);

        if self.pending.remove(&sequence).is_some() {
            self.counts.bad_order += 1;
            return SequenceOutcome::Reordered;
        }

        let Some(last) = self.last_sequence else {
            self.last_sequence = Some(sequence);
            return SequenceOutcome::First;
        };

        let expected = last.wrapping_add(1);
        if sequence == expected {
            self.last_sequence = Some(sequence);
            return SequenceOutcome::InOrder;
        }

        if last.wrapping_sub(sequence) < HALF_RANGE {
            self.counts.bad_order += 1;
            return SequenceOutcome::Late;
        }

        let skipped = sequence.wrapping_sub(expected);
        let mut missing = expected;
        for _ in 0..skipped {
            self.pending.insert(missing, now);
            missing = missing.wrapping_add(1);
        }
        self.last_sequence = Some(sequence);
        SequenceOutcome::Gap { skipped }
    }

    /// Evict pending entries older than the window, counting each as
    /// dropped. Returns how many were evicted.
    pub fn sweep(&mut self, now: Instant) -> u64 {
        let window = self.window;
        let before = self.pending.len();
        self.pending
            .retain(|_, missed_at| now.saturating_duration_since(*missed_at) <= window);
        let evicted = (before - self.pending.len()) as u64;
        self.counts.dropped += evicted;
        evicted
    }

    /// Return the counts accumulated since the previous call and reset them.
    pub fn take_counts(&mut self) -> SequenceCounts {
        std::mem::take(&mut self.counts)
    }

    pub fn last_sequence(&self) -> Option<u8> {
        self.last_sequence
    }

    /// Sequence numbers currently waited for, ascending.
    pub fn pending(&self) -> Vec<u8> {
        self.pending.keys().copied().collect()
    }

    pub fn is_pending(&self, sequence: u8) -> bool {
        self.pending.contains_key(&sequence)
    }

    /// Counts accumulated since the last [`take_counts`](Self::take_counts).
    pub fn counts(&self) -> SequenceCounts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut SequenceTracker, seqs: &[u8], now: Instant) {
        for seq in seqs {
            tracker.track(*seq, now);
        }
    }

    #[test]
    fn gap_leaves_skipped_numbers_pending() {
        let now = Instant::now();
        let mut t = SequenceTracker::default();
        feed(&mut t, &[0, 1, 2, 5], now);
        assert_eq!(t.pending(), vec![3, 4]);
        assert_eq!(t.counts(), SequenceCounts::default());
        assert_eq!(t.last_sequence(), Some(5));
    }

    #[test]
    fn late_arrival_fills_gap_as_bad_order() {
        let now = Instant::now();
        let mut t = SequenceTracker::default();
        feed(&mut t, &[0, 1, 2, 5], now);
        assert_eq!(t.track(3, now), SequenceOutcome::Reordered);
        assert_eq!(t.counts().bad_order, 1);
        assert_eq!(t.pending(), vec![4]);
        assert_eq!(t.last_sequence(), Some(5));
    }

    #[test]
    fn wraparound_is_in_order() {
        let now = Instant::now();
        let mut t = SequenceTracker::default();
        feed(&mut t, &[254, 255, 0, 1, 2], now);
        assert_eq!(t.last_sequence(), Some(2));
        assert!(t.pending().is_empty());
        assert_eq!(t.counts().dropped, 0);
        assert_eq!(t.counts().bad_order, 0);
    }

    #[test]
    fn gap_across_wrap() {
        let now = Instant::now();
        let mut t = SequenceTracker::default();
        feed(&mut t, &[253, 1], now);
        assert_eq!(t.pending(), vec![0, 254, 255]);
    }

    #[test]
    fn duplicates_and_stale_packets_are_bad_order() {
        let now = Instant::now();
        let mut t = SequenceTracker::default();
        feed(&mut t, &[10, 11, 12], now);
        assert_eq!(t.track(12, now), SequenceOutcome::Late);
        assert_eq!(t.track(0, now), SequenceOutcome::Late);
        assert_eq!(t.counts().bad_order, 2);
        assert_eq!(t.last_sequence(), Some(12));
        assert!(t.pending().is_empty());
    }

    #[test]
    fn far_behind_is_treated_as_a_forward_jump() {
        let now = Instant::now();
        let mut t = SequenceTracker::default();
        t.track(200, now);
        // 200 - 50 = 150 behind, so this is 106 ahead across the wrap.
        assert_eq!(t.track(50, now), SequenceOutcome::Gap { skipped: 105 });
        assert_eq!(t.last_sequence(), Some(50));
    }

    #[test]
    fn pending_entries_expire_into_drops() {
        let start = Instant::now();
        let mut t = SequenceTracker::new(Duration::from_secs(3));
        feed(&mut t, &[0, 1, 2, 5], start);

        // Still inside the window.
        t.track(6, start + Duration::from_secs(2));
        assert_eq!(t.counts().dropped, 0);

        t.track(7, start + Duration::from_millis(3_100));
        assert_eq!(t.counts().dropped, 2);
        assert!(t.pending().is_empty());
    }

    #[test]
    fn evicted_number_arriving_later_is_bad_order_only() {
        let start = Instant::now();
        let mut t = SequenceTracker::new(Duration::from_millis(100));
        feed(&mut t, &[0, 2], start);
        assert!(t.is_pending(1));

        t.track(1, start + Duration::from_millis(500));
        let counts = t.take_counts();
        assert_eq!(counts.dropped, 1);
        assert_eq!(counts.bad_order, 1);
    }

    #[test]
    fn each_skipped_number_is_counted_once() {
        let start = Instant::now();
        let mut t = SequenceTracker::new(Duration::from_secs(1));
        // 0..=20 with 5, 6 and 15 missing; 6 turns up late.
        let mut now = start;
        for seq in (0u8..=20).filter(|s| ![5, 6, 15].contains(s)) {
            t.track(seq, now);
            now += Duration::from_millis(10);
        }
        t.track(6, now);
        t.track(21, start + Duration::from_secs(5));

        let counts = t.take_counts();
        assert_eq!(counts.bad_order, 1);
        assert_eq!(counts.dropped, 2);
        assert_eq!(t.take_counts(), SequenceCounts::default());
    }
}
