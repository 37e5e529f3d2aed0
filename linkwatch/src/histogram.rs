//! Latency histogram accumulation and CSV report.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use linkwatch_types::{HistogramBin, TOTAL_BINS};

/// Buckets latency samples into the fixed 101-bin layout.
#[derive(Debug, Clone)]
pub struct HistogramAggregator {
    counts: [u64; TOTAL_BINS],
    samples: u64,
    total_seconds: u64,
}

impl Default for HistogramAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl HistogramAggregator {
    pub fn new() -> Self {
        Self {
            counts: [0; TOTAL_BINS],
            samples: 0,
            total_seconds: 0,
        }
    }

    /// Add one sample. Absent, negative and NaN values are ignored.
    ///
    /// ```rust
    /// use linkwatch::HistogramAggregator;
    ///
    /// let mut hist = HistogramAggregator::new();
    /// hist.add_latency_sample(25.0);
    /// hist.add_latency_sample(None::<f64>);
    /// hist.add_latency_sample(-3.0);
    /// assert_eq!(hist.sample_count(), 1);
    /// ```
    pub fn add_latency_sample(&mut self, latency_ms: impl Into<Option<f64>>) {
        let Some(index) = latency_ms.into().and_then(HistogramBin::index_of) else {
            return;
        };
        self.counts[index] += 1;
        self.samples += 1;
    }

    pub fn increment_total_seconds(&mut self) {
        self.total_seconds += 1;
    }

    /// Override the run duration, e.g. with the measured wall time at stop.
    pub fn set_total_seconds(&mut self, seconds: u64) {
        self.total_seconds = seconds;
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Every bin with its count, ascending. Empty bins are included.
    pub fn bins(&self) -> impl Iterator<Item = (HistogramBin, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(index, count)| (HistogramBin::at(index), *count))
    }

    /// Write the CSV report.
    pub fn render<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "Total_Test_Duration_Seconds,{}", self.total_seconds)?;
        writeln!(out, "Total_Latency_Samples,{}", self.samples)?;
        writeln!(out)?;
        writeln!(out, "Latency_Bin_Start_ms,Count")?;
        for (bin, count) in self.bins() {
            writeln!(out, "{},{}", bin.start_ms, count)?;
        }
        out.flush()
    }

    /// Write the report as `<sanitized>_histogram_<timestamp>.csv` in `dir`
    /// and return its path.
    pub fn generate(&self, dir: &Path, sanitized: &str, timestamp: &str) -> io::Result<PathBuf> {
        let path = dir.join(format!("{sanitized}_histogram_{timestamp}.csv"));
        let file = std::fs::File::create(&path)?;
        self.render(io::BufWriter::new(file))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(hist: &HistogramAggregator) -> Vec<String> {
        let mut buf = Vec::new();
        hist.render(&mut buf).unwrap();
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn samples_land_in_their_bins() {
        let mut hist = HistogramAggregator::new();
        for s in [0.0, 19.9, 20.0, 39.99, 2000.0, 12_345.0] {
            hist.add_latency_sample(s);
        }
        let counts: Vec<u64> = hist.bins().map(|(_, c)| c).collect();
        assert_eq!(counts[0], 2);
        assert_eq!(counts[1], 2);
        assert_eq!(counts[100], 2);
        assert_eq!(hist.sample_count(), 6);
    }

    #[test]
    fn invalid_samples_are_ignored() {
        let mut hist = HistogramAggregator::new();
        hist.add_latency_sample(f64::NAN);
        hist.add_latency_sample(-0.1);
        hist.add_latency_sample(None::<f64>);
        assert_eq!(hist.sample_count(), 0);
    }

    #[test]
    fn report_has_metadata_and_all_bins() {
        let mut hist = HistogramAggregator::new();
        hist.add_latency_sample(45.0);
        hist.increment_total_seconds();
        hist.increment_total_seconds();

        let lines = rendered(&hist);
        assert_eq!(lines.len(), 4 + 101);
        assert_eq!(lines[0], "Total_Test_Duration_Seconds,2");
        assert_eq!(lines[1], "Total_Latency_Samples,1");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "Latency_Bin_Start_ms,Count");
        assert_eq!(lines[4], "0,0");
        assert_eq!(lines[6], "40,1");
        assert_eq!(lines[103], "1980,0");
        assert_eq!(lines[104], "2000,0");
    }

    #[test]
    fn empty_report_is_zero_filled() {
        let hist = HistogramAggregator::new();
        let lines = rendered(&hist);
        assert_eq!(lines.len(), 105);
        assert!(lines[4..].iter().all(|l| l.ends_with(",0")));
    }

    #[test]
    fn generate_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut hist = HistogramAggregator::new();
        hist.set_total_seconds(30);

        let path = hist
            .generate(dir.path(), "udpin_0_0_0_0_14550", "20260101_120000")
            .unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "udpin_0_0_0_0_14550_histogram_20260101_120000.csv"
        );
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("Total_Test_Duration_Seconds,30\n"));
    }

    #[test]
    fn generate_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let hist = HistogramAggregator::new();
        assert!(hist
            .generate(&dir.path().join("nope"), "x", "20260101_120000")
            .is_err());
    }
}
