use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::types::RegionSummary;
use crate::regions::wkt::WktStats;

/// Counters produced while assigning points to regions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BinStats {
    pub mapped: usize,
    pub unmapped: usize,
    pub geometry_errors: usize,
}

impl BinStats {
    pub fn total(&self) -> usize {
        self.mapped + self.unmapped
    }
}

/// One row per pipeline run, appended to the stats CSV.
#[derive(Debug, Default, Serialize)]
pub struct RunStats {
    pub timestamp: DateTime<Utc>,
    pub points_source: Option<String>,
    pub regions_source: Option<String>,
    pub crs: Option<String>,
    pub level: Option<String>,

    // inputs
    pub points: usize,
    pub dropped_rows: usize,
    pub regions: usize,

    // binning
    pub mapped: usize,
    pub unmapped: usize,
    pub geometry_errors: usize,

    // region table rows
    pub wkt_errors: usize,
    pub skipped_regions: Option<String>,

    // summary
    pub regions_with_data: usize,
    pub regions_without_data: usize,
    pub min_intensity: Option<f64>,
    pub max_intensity: Option<f64>,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl RunStats {
    pub fn new() -> Self {
        RunStats {
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn mapped_pct(&self) -> f64 {
        Self::pct(self.mapped, self.mapped + self.unmapped)
    }

    pub fn coverage_pct(&self) -> f64 {
        Self::pct(self.regions_with_data, self.regions)
    }

    pub fn with_bin_stats(mut self, bin: &BinStats) -> Self {
        self.mapped = bin.mapped;
        self.unmapped = bin.unmapped;
        self.geometry_errors = bin.geometry_errors;
        self
    }

    pub fn with_summary(mut self, summary: &RegionSummary) -> Self {
        let values: Vec<f64> = summary.values().filter_map(|i| i.value()).collect();
        self.regions_with_data = values.len();
        self.regions_without_data = summary.values().filter(|i| i.is_no_data()).count();
        self.min_intensity = values.iter().copied().reduce(f64::min);
        self.max_intensity = values.iter().copied().reduce(f64::max);
        self
    }

    /// Records the rejected rows of a WKT region table; skipped ids are `;`-joined.
    pub fn with_wkt_stats(mut self, wkt: &WktStats) -> Self {
        self.wkt_errors = wkt.errors;
        if !wkt.skipped_regions.is_empty() {
            self.skipped_regions = Some(wkt.skipped_regions.join(";"));
        }
        self
    }

    /// Set source metadata
    pub fn with_sources(mut self, points: &str, regions: &str) -> Self {
        self.points_source = Some(points.to_string());
        self.regions_source = Some(regions.to_string());
        self
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        RunStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::types::Intensity;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(RunStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_mapped_pct() {
        let stats = RunStats::new().with_bin_stats(&BinStats { mapped: 3, unmapped: 1, geometry_errors: 0 });
        assert_eq!(stats.mapped_pct(), 75.0);
    }

    #[test]
    fn test_with_summary_counts_no_data_separately() {
        let summary: RegionSummary = [
            ("A".to_string(), Intensity::Value(-1.0)),
            ("B".to_string(), Intensity::NoData),
            ("C".to_string(), Intensity::Value(4.0)),
        ]
        .into_iter()
        .collect();

        let mut stats = RunStats::new().with_summary(&summary);
        stats.regions = 3;

        assert_eq!(stats.regions_with_data, 2);
        assert_eq!(stats.regions_without_data, 1);
        assert_eq!(stats.min_intensity, Some(-1.0));
        assert_eq!(stats.max_intensity, Some(4.0));
        assert!((stats.coverage_pct() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_with_wkt_stats_joins_skipped_ids() {
        let wkt = WktStats { processed: 3, errors: 2, skipped_regions: vec!["AT2".into(), "AT3".into()] };
        let stats = RunStats::new().with_wkt_stats(&wkt);
        assert_eq!(stats.wkt_errors, 2);
        assert_eq!(stats.skipped_regions.as_deref(), Some("AT2;AT3"));

        let clean = RunStats::new().with_wkt_stats(&WktStats::default());
        assert!(clean.skipped_regions.is_none());
    }

    #[test]
    fn test_from_error() {
        let stats = RunStats::from_error("load_error", "boom").with_sources("p.csv", "r.geojson");
        assert_eq!(stats.error_type.as_deref(), Some("load_error"));
        assert_eq!(stats.points_source.as_deref(), Some("p.csv"));
        assert_eq!(stats.points, 0);
    }
}
