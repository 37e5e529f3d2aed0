//! Link outage detection with recovery hysteresis.

use std::time::Duration;

use tokio::time::Instant;

/// State change reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutageEvent {
    /// Silence exceeded the timeout.
    Started { silence: Duration },
    /// Enough consecutive packets arrived to end the outage.
    Recovered { duration: Duration },
}

/// Silence-based outage detector.
///
/// An outage is detected when a check finds no packet for longer than the
/// timeout, and ends only after `hysteresis` consecutive packets. Its
/// duration runs from the last packet before the silence. Nothing is
/// evaluated until the first packet has been seen.
#[derive(Debug)]
pub struct OutageTracker {
    timeout: Duration,
    hysteresis: u32,
    last_packet: Option<Instant>,
    in_outage: bool,
    outage_start: Option<Instant>,
    consecutive_good: u32,
    total: Duration,
}

impl OutageTracker {
    pub fn new(timeout: Duration, hysteresis: u32) -> Self {
        Self {
            timeout,
            hysteresis: hysteresis.max(1),
            last_packet: None,
            in_outage: false,
            outage_start: None,
            consecutive_good: 0,
            total: Duration::ZERO,
        }
    }

    /// Record an accepted packet.
    pub fn on_packet(&mut self, now: Instant) -> Option<OutageEvent> {
        self.last_packet = Some(now);

        if !self.in_outage {
            self.consecutive_good = 0;
            return None;
        }

        self.consecutive_good += 1;
        if self.consecutive_good < self.hysteresis {
            return None;
        }

        let duration = self
            .outage_start
            .take()
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.total += duration;
        self.in_outage = false;
        Some(OutageEvent::Recovered { duration })
    }

    /// Periodic evaluation. Returns whether this period counts as outage,
    /// plus the event if an outage has just started.
    pub fn check(&mut self, now: Instant) -> (bool, Option<OutageEvent>) {
        let Some(last) = self.last_packet else {
            return (false, None);
        };

        let silence = now.saturating_duration_since(last);
        if silence > self.timeout {
            if self.in_outage {
                return (true, None);
            }
            self.in_outage = true;
            self.outage_start = Some(last);
            self.consecutive_good = 0;
            return (true, Some(OutageEvent::Started { silence }));
        }

        // Recent traffic, but recovery may still be pending.
        (self.in_outage, None)
    }

    /// Close any open outage at `now` and return the accumulated total.
    pub fn finish(&mut self, now: Instant) -> Duration {
        if self.in_outage {
            if let Some(start) = self.outage_start.take() {
                self.total += now.saturating_duration_since(start);
            }
            self.in_outage = false;
        }
        self.total
    }

    #[cfg(test)]
    pub(crate) fn in_outage(&self) -> bool {
        self.in_outage
    }

    #[cfg(test)]
    pub(crate) fn consecutive_good(&self) -> u32 {
        self.consecutive_good
    }

    #[cfg(test)]
    pub(crate) fn last_packet(&self) -> Option<Instant> {
        self.last_packet
    }

    /// Outage time of completed outages.
    #[cfg(test)]
    pub(crate) fn total(&self) -> Duration {
        self.total
    }
}
