//! End-to-end region aggregation.
//!
//! Points and regions are loaded concurrently; once both are available the
//! bin, aggregate and enrich stages run as one synchronous pass.

use anyhow::Result;
use geojson::FeatureCollection;
use tracing::{info, warn};

use crate::aggregate::binner::bin_points;
use crate::aggregate::median::summarize;
use crate::aggregate::types::RegionSummary;
use crate::config::PipelineConfig;
use crate::enrich::{convert_coordinates, enrich};
use crate::fetch::HttpClient;
use crate::points::{PointSet, load_points, sample};
use crate::regions::{RegionCollection, load_regions};
use crate::state::{PipelineStore, Stage};
use crate::stats::{BinStats, RunStats};

/// Everything a run produces.
#[derive(Debug)]
pub struct Aggregation {
    pub summary: RegionSummary,
    pub bin_stats: BinStats,
    pub enriched: FeatureCollection,
}

/// Runs bin, aggregate and enrich over already-loaded inputs.
pub fn aggregate(
    regions: &RegionCollection,
    points: &PointSet,
    config: &PipelineConfig,
    store: &PipelineStore,
) -> Aggregation {
    let sampled;
    let points = if config.sample_rate < 1.0 {
        sampled = sample(&points.points, config.sample_rate);
        info!(kept = sampled.len(), total = points.len(), "Sampled points");
        &sampled[..]
    } else {
        &points.points[..]
    };

    store.set_stage(Stage::Binning);
    let (bucket, bin_stats) = bin_points(regions, points);
    store.binned(bin_stats);

    store.set_stage(Stage::Aggregating);
    let summary = summarize(&bucket);

    store.set_stage(Stage::Enriching);
    let mut enriched = enrich(regions, &summary, config.scale);
    if config.convert_coordinates && !regions.crs.is_geographic() {
        enriched = convert_coordinates(&enriched, regions.crs);
    }

    store.set_stage(Stage::Ready);
    Aggregation { summary, bin_stats, enriched }
}

/// Loads both sources, then aggregates. Either load failing fails the run.
#[tracing::instrument(skip(client, config, store))]
pub async fn run<C: HttpClient + ?Sized>(
    client: &C,
    points_source: &str,
    regions_source: &str,
    config: &PipelineConfig,
    store: &PipelineStore,
) -> Result<(Aggregation, RunStats)> {
    store.set_stage(Stage::Loading);

    let options = config.region_options();
    let loaded = tokio::try_join!(
        load_points(client, points_source),
        load_regions(client, regions_source, &options),
    );
    let (points, regions) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            store.fail(format!("{e:#}"));
            return Err(e);
        }
    };

    store.points_loaded(points.len(), points.dropped_rows);
    store.regions_loaded(regions.len());
    if regions.is_empty() {
        warn!("No regions matched; every point will be unmapped");
    }

    let result = aggregate(&regions, &points, config, store);

    let mut stats = RunStats::new()
        .with_sources(points_source, regions_source)
        .with_bin_stats(&result.bin_stats)
        .with_summary(&result.summary);
    stats.crs = Some(regions.crs.to_string());
    stats.level = config.level.clone();
    stats.points = points.len();
    stats.dropped_rows = points.dropped_rows;
    stats.regions = regions.len();
    if let Some(wkt) = &regions.wkt_stats {
        stats = stats.with_wkt_stats(wkt);
    }

    info!(
        regions = stats.regions,
        with_data = stats.regions_with_data,
        mapped_pct = stats.mapped_pct(),
        "Aggregation complete"
    );

    Ok((result, stats))
}
