//! Fixed latency histogram bins.

/// Width of a regular bin in milliseconds.
pub const BIN_WIDTH_MS: u32 = 20;

/// Number of regular (bounded) bins.
pub const REGULAR_BINS: usize = 100;

/// Start of the overflow bin, `[2000, +inf)`.
pub const OVERFLOW_START_MS: u32 = BIN_WIDTH_MS * REGULAR_BINS as u32;

/// Total number of bins, overflow included.
pub const TOTAL_BINS: usize = REGULAR_BINS + 1;

/// A half-open latency range `[start_ms, end_ms)`.
///
/// `end_ms == None` marks the unbounded overflow bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistogramBin {
    pub start_ms: u32,
    pub end_ms: Option<u32>,
}

impl HistogramBin {
    /// All 101 bins in ascending order.
    pub fn all() -> Vec<HistogramBin> {
        (0..TOTAL_BINS).map(HistogramBin::at).collect()
    }

    /// The bin at `index`; indices past the regular bins give the overflow bin.
    pub fn at(index: usize) -> HistogramBin {
        if index >= REGULAR_BINS {
            HistogramBin {
                start_ms: OVERFLOW_START_MS,
                end_ms: None,
            }
        } else {
            let start = index as u32 * BIN_WIDTH_MS;
            HistogramBin {
                start_ms: start,
                end_ms: Some(start + BIN_WIDTH_MS),
            }
        }
    }

    /// Index of the bin that contains `latency_ms`, or `None` for negative
    /// and non-finite values.
    pub fn index_of(latency_ms: f64) -> Option<usize> {
        if !latency_ms.is_finite() && latency_ms != f64::INFINITY {
            return None;
        }
        if latency_ms < 0.0 {
            return None;
        }
        let index = (latency_ms / BIN_WIDTH_MS as f64).floor();
        if index >= REGULAR_BINS as f64 {
            Some(REGULAR_BINS)
        } else {
            Some(index as usize)
        }
    }

    /// Whether `latency_ms` lies inside this bin.
    pub fn contains(&self, latency_ms: f64) -> bool {
        latency_ms >= self.start_ms as f64 && self.end_ms.map_or(true, |end| latency_ms < end as f64)
    }

    /// Whether this is the unbounded overflow bin.
    pub fn is_overflow(&self) -> bool {
        self.end_ms.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn there_are_101_ascending_bins() {
        let bins = HistogramBin::all();
        assert_eq!(bins.len(), 101);
        assert_eq!(bins[0], HistogramBin { start_ms: 0, end_ms: Some(20) });
        assert_eq!(bins[99], HistogramBin { start_ms: 1980, end_ms: Some(2000) });
        assert!(bins[100].is_overflow());
        assert!(bins.windows(2).all(|w| w[0].start_ms < w[1].start_ms));
    }

    #[test]
    fn boundaries_fall_into_the_upper_bin() {
        assert_eq!(HistogramBin::index_of(0.0), Some(0));
        assert_eq!(HistogramBin::index_of(19.999), Some(0));
        assert_eq!(HistogramBin::index_of(20.0), Some(1));
        assert_eq!(HistogramBin::index_of(1999.9), Some(99));
        assert_eq!(HistogramBin::index_of(2000.0), Some(100));
        assert_eq!(HistogramBin::index_of(1.0e9), Some(100));
        assert_eq!(HistogramBin::index_of(f64::INFINITY), Some(100));
    }

    #[test]
    fn invalid_values_have_no_bin() {
        assert_eq!(HistogramBin::index_of(-0.5), None);
        assert_eq!(HistogramBin::index_of(f64::NAN), None);
        assert_eq!(HistogramBin::index_of(f64::NEG_INFINITY), None);
    }

    #[test]
    fn index_agrees_with_contains() {
        let bins = HistogramBin::all();
        for sample in [0.0, 5.5, 20.0, 39.9, 40.0, 777.7, 1980.0, 2000.0, 5000.0] {
            let index = HistogramBin::index_of(sample).unwrap();
            let first = bins.iter().position(|b| b.contains(sample)).unwrap();
            assert_eq!(index, first, "sample {sample}");
        }
    }
}
