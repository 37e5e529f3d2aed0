//! Round-trip latency from TIMESYNC echoes.

use std::collections::VecDeque;

use linkwatch_types::LatencyStats;
use tokio::time::Instant;

/// Outstanding probes kept for matching; older ones are forgotten.
pub const MAX_OUTSTANDING: usize = 10;

/// Stamps outgoing probes and matches echoes against them.
///
/// Probe stamps are nanoseconds since the tracker's epoch, which keeps them
/// on the same monotonic clock as everything else in the monitor.
#[derive(Debug)]
pub struct LatencyTracker {
    epoch: Instant,
    outstanding: VecDeque<i64>,
    current_ms: f64,
    samples: Vec<f64>,
}

impl LatencyTracker {
    pub fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            outstanding: VecDeque::with_capacity(MAX_OUTSTANDING + 1),
            current_ms: 0.0,
            samples: Vec::new(),
        }
    }

    fn stamp(&self, now: Instant) -> i64 {
        i64::try_from(now.saturating_duration_since(self.epoch).as_nanos()).unwrap_or(i64::MAX)
    }

    /// Register a probe sent at `now` and return the stamp to embed in it.
    pub fn probe(&mut self, now: Instant) -> i64 {
        let stamp = self.stamp(now);
        self.outstanding.push_back(stamp);
        while self.outstanding.len() > MAX_OUTSTANDING {
            self.outstanding.pop_front();
        }
        stamp
    }

    /// Match an echoed stamp. Returns the round trip in milliseconds when it
    /// belongs to an outstanding probe.
    pub fn echo(&mut self, stamp: i64, now: Instant) -> Option<f64> {
        let index = self.outstanding.iter().position(|s| *s == stamp)?;
        self.outstanding.remove(index);

        let rtt_ms = (self.stamp(now) - stamp) as f64 / 1_000_000.0;
        self.current_ms = rtt_ms;
        self.samples.push(rtt_ms);
        Some(rtt_ms)
    }

    /// Most recent round trip, carried forward until the next one.
    pub fn current_ms(&self) -> f64 {
        self.current_ms
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn stats(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.samples)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn echo_yields_round_trip() {
        let epoch = Instant::now();
        let mut t = LatencyTracker::new(epoch);
        let sent = epoch + Duration::from_secs(1);
        let stamp = t.probe(sent);
        assert_eq!(stamp, 1_000_000_000);

        let rtt = t.echo(stamp, sent + Duration::from_millis(42)).unwrap();
        assert!((rtt - 42.0).abs() < 1e-9);
        assert_eq!(t.current_ms(), rtt);
        assert_eq!(t.samples(), &[rtt]);
        assert_eq!(t.outstanding(), 0);
    }

    #[test]
    fn unmatched_and_repeated_echoes_are_ignored() {
        let epoch = Instant::now();
        let mut t = LatencyTracker::new(epoch);
        let stamp = t.probe(epoch + Duration::from_millis(5));

        assert!(t.echo(stamp + 1, epoch + Duration::from_millis(10)).is_none());
        assert!(t.echo(stamp, epoch + Duration::from_millis(10)).is_some());
        assert!(t.echo(stamp, epoch + Duration::from_millis(20)).is_none());
        assert_eq!(t.samples().len(), 1);
    }

    #[test]
    fn only_the_latest_stamps_are_kept() {
        let epoch = Instant::now();
        let mut t = LatencyTracker::new(epoch);
        let stamps: Vec<i64> = (1..=12)
            .map(|i| t.probe(epoch + Duration::from_secs(i)))
            .collect();
        assert_eq!(t.outstanding(), MAX_OUTSTANDING);

        let late = epoch + Duration::from_secs(20);
        assert!(t.echo(stamps[0], late).is_none());
        assert!(t.echo(stamps[1], late).is_none());
        assert!(t.echo(stamps[2], late).is_some());
    }

    #[test]
    fn current_latency_carries_forward() {
        let epoch = Instant::now();
        let mut t = LatencyTracker::new(epoch);
        let a = t.probe(epoch + Duration::from_millis(1));
        let _b = t.probe(epoch + Duration::from_millis(2));
        t.echo(a, epoch + Duration::from_millis(31));
        assert!((t.current_ms() - 30.0).abs() < 1e-9);

        let stats = t.stats();
        assert_eq!(stats.samples, 1);
        assert!(stats.mean_ms.is_some());
    }
}
