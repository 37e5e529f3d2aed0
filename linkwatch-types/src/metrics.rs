//! Link metrics: per-second records, lifetime totals and final reports.

use std::path::PathBuf;

use crate::LinkIdentity;

/// Header row of the per-second metrics CSV.
pub const METRICS_CSV_HEADER: &str =
    "elapsed_seconds,total_packets,dropped_packets,latency_ms,bad_order_packets,bytes,link_outage";

/// One per-second metrics record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsRecord {
    /// Whole seconds since the monitor started (rounded).
    pub elapsed_seconds: u64,
    /// Accepted packets in this second.
    pub total_packets: u64,
    /// Sequence numbers evicted as dropped in this second.
    pub dropped_packets: u64,
    /// Most recent round-trip latency.
    pub latency_ms: f64,
    /// Late arrivals in this second.
    pub bad_order_packets: u64,
    /// Bytes of accepted packets in this second.
    pub bytes: u64,
    /// Whether the link was in outage during this second.
    pub outage: bool,
}

impl MetricsRecord {
    /// Render as a CSV row matching [`METRICS_CSV_HEADER`].
    ///
    /// Latency is rounded to whole milliseconds and the outage flag is 0/1.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.elapsed_seconds,
            self.total_packets,
            self.dropped_packets,
            self.latency_ms.round() as i64,
            self.bad_order_packets,
            self.bytes,
            u8::from(self.outage)
        )
    }
}

/// Lifetime totals for one link.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkTotals {
    pub total_packets: u64,
    pub dropped_packets: u64,
    pub bad_order_packets: u64,
    pub bytes: u64,
    /// Accumulated outage time in seconds.
    pub outage_seconds: f64,
}

impl LinkTotals {
    /// Fold one per-second record into the totals. Outage time is tracked
    /// separately and is not touched.
    pub fn absorb(&mut self, record: &MetricsRecord) {
        self.total_packets += record.total_packets;
        self.dropped_packets += record.dropped_packets;
        self.bad_order_packets += record.bad_order_packets;
        self.bytes += record.bytes;
    }

    /// Dropped packets as a percentage of received packets.
    pub fn drop_percent(&self) -> Option<f64> {
        percent(self.dropped_packets, self.total_packets)
    }

    /// Bad-order packets as a percentage of received packets.
    pub fn bad_order_percent(&self) -> Option<f64> {
        percent(self.bad_order_packets, self.total_packets)
    }
}

fn percent(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64 * 100.0)
    }
}

/// Summary statistics over the recorded latency samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatencyStats {
    /// Number of valid samples.
    pub samples: usize,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub mean_ms: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub median_ms: Option<f64>,
}

impl LatencyStats {
    /// Compute statistics, ignoring negative and non-finite samples.
    ///
    /// The median is the upper median (`sorted[n / 2]`).
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut valid: Vec<f64> = samples
            .iter()
            .copied()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .collect();

        if valid.is_empty() {
            return Self::default();
        }

        valid.sort_by(|a, b| a.total_cmp(b));
        let mean = valid.iter().sum::<f64>() / valid.len() as f64;
        let median = valid[valid.len() / 2];

        Self {
            samples: valid.len(),
            mean_ms: Some(mean),
            median_ms: Some(median),
        }
    }
}

/// Final report produced by a stopped link monitor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkReport {
    pub link: LinkIdentity,
    pub totals: LinkTotals,
    pub latency: LatencyStats,
    /// Run time of the monitor in whole seconds.
    pub duration_seconds: u64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub metrics_path: Option<PathBuf>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub histogram_path: Option<PathBuf>,
    /// Teardown stages that failed, in order.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub errors: Vec<String>,
}

impl LinkReport {
    /// Outage time as a percentage of the run.
    pub fn outage_percent(&self) -> Option<f64> {
        if self.duration_seconds == 0 {
            None
        } else {
            Some(self.totals.outage_seconds / self.duration_seconds as f64 * 100.0)
        }
    }
}

/// A link that could not be stopped cleanly.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkFailure {
    pub link: LinkIdentity,
    pub error: String,
}

/// Consolidated result of a whole run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSummary {
    pub reports: Vec<LinkReport>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub failures: Vec<LinkFailure>,
}

impl RunSummary {
    /// Number of links that were active when the run stopped.
    pub fn links_tested(&self) -> usize {
        self.reports.len() + self.failures.len()
    }

    /// Every artifact written during the run, metrics files first.
    pub fn artifact_paths(&self) -> Vec<&PathBuf> {
        let metrics = self.reports.iter().filter_map(|r| r.metrics_path.as_ref());
        let histograms = self.reports.iter().filter_map(|r| r.histogram_path.as_ref());
        metrics.chain(histograms).collect()
    }
}
