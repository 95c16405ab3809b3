//! CLI entry point for the NUTS region aggregator.
//!
//! Provides subcommands for aggregating point measurements into region
//! medians, converting region sources to GeoJSON, and summarising a points
//! file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use nuts_mapper::aggregate::median::{mean, median, stddev};
use nuts_mapper::aggregate::scale::ColorScale;
use nuts_mapper::config::PipelineConfig;
use nuts_mapper::enrich::convert_coordinates;
use nuts_mapper::fetch::BasicClient;
use nuts_mapper::output::{append_record, print_json, write_geojson};
use nuts_mapper::pipeline;
use nuts_mapper::points::load_points;
use nuts_mapper::regions::{CoordinateSystem, RegionFormat, load_regions};
use nuts_mapper::state::{PipelineStore, StateEvent};
use nuts_mapper::stats::RunStats;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "nuts_mapper")]
#[command(about = "Aggregate point measurements into NUTS regions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bin points into regions and write the enriched GeoJSON
    Aggregate {
        /// Points CSV (time,lat,lng,value) as a file or URL
        #[arg(long, value_name = "FILE_OR_URL")]
        points: String,

        /// Region GeoJSON or WKT CSV as a file or URL. A WKT table's own
        /// intensity column is replaced by the median of the binned points.
        #[arg(long, value_name = "FILE_OR_URL")]
        regions: String,

        /// Only keep regions at this NUTS level
        #[arg(short, long)]
        level: Option<String>,

        /// Coordinate system of the regions (e.g. 3035, web-mercator)
        #[arg(long)]
        crs: Option<CoordinateSystem>,

        /// Region source format; inferred from the extension when omitted
        #[arg(long)]
        format: Option<RegionFormat>,

        /// Convert projected region coordinates back to WGS84 in the output
        #[arg(long, default_value_t = false)]
        convert: bool,

        /// Add a fill colour per region using this scale
        #[arg(long)]
        scale: Option<ColorScale>,

        /// Fraction of points to keep (0 < r <= 1)
        #[arg(long)]
        sample_rate: Option<f64>,

        /// Region id to drop; repeatable
        #[arg(long = "exclude", value_name = "ID")]
        exclude: Vec<String>,

        /// Enriched GeoJSON output path
        #[arg(short, long, default_value = "nuts_enriched.geojson")]
        output: String,

        /// Gzip compress the output
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// CSV file to append the run record to
        #[arg(long)]
        stats_csv: Option<String>,

        /// JSON config file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load, filter and write a region source as GeoJSON
    Regions {
        /// Region GeoJSON or WKT CSV as a file or URL
        #[arg(long, value_name = "FILE_OR_URL")]
        regions: String,

        /// Only keep regions at this NUTS level
        #[arg(short, long)]
        level: Option<String>,

        /// Coordinate system of the regions (e.g. 3035, web-mercator)
        #[arg(long)]
        crs: Option<CoordinateSystem>,

        /// Region source format; inferred from the extension when omitted
        #[arg(long)]
        format: Option<RegionFormat>,

        /// Region id to drop; repeatable
        #[arg(long = "exclude", value_name = "ID")]
        exclude: Vec<String>,

        /// Convert projected coordinates to WGS84
        #[arg(long, default_value_t = false)]
        convert: bool,

        /// GeoJSON output path
        #[arg(short, long, default_value = "regions.geojson")]
        output: String,

        /// JSON config file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load a points CSV and log a summary
    Points {
        /// Points CSV as a file or URL
        #[arg(long, value_name = "FILE_OR_URL")]
        points: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/nuts_mapper.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("nuts_mapper.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate {
            points,
            regions,
            level,
            crs,
            format,
            convert,
            scale,
            sample_rate,
            exclude,
            output,
            gzip,
            stats_csv,
            config,
        } => {
            let mut cfg = PipelineConfig::load_or_default(config.as_deref())?;
            cfg.override_regions(level, crs, format, exclude);
            if scale.is_some() {
                cfg.scale = scale;
            }
            if let Some(rate) = sample_rate {
                cfg.sample_rate = rate;
            }
            cfg.convert_coordinates |= convert;

            aggregate(&points, &regions, &cfg, &output, gzip, stats_csv.as_deref()).await?;
        }
        Commands::Regions {
            regions,
            level,
            crs,
            format,
            exclude,
            convert,
            output,
            config,
        } => {
            let mut cfg = PipelineConfig::load_or_default(config.as_deref())?;
            cfg.override_regions(level, crs, format, exclude);
            cfg.convert_coordinates |= convert;

            let client = BasicClient::with_timeout(Duration::from_secs(cfg.http_timeout_secs))?;
            let collection = load_regions(&client, &regions, &cfg.region_options()).await?;

            info!(regions = collection.len(), crs = %collection.crs, "Regions loaded");
            if let Some(wkt) = &collection.wkt_stats {
                info!(errors = wkt.errors, skipped = ?wkt.skipped_regions, "Region table rows rejected");
            }

            let features = if cfg.convert_coordinates && !collection.crs.is_geographic() {
                convert_coordinates(&collection.features, collection.crs)
            } else {
                collection.features
            };
            write_geojson(&output, &features, false)?;
        }
        Commands::Points { points } => {
            let timeout = PipelineConfig::default().http_timeout_secs;
            let client = BasicClient::with_timeout(Duration::from_secs(timeout))?;
            let set = load_points(&client, &points).await?;
            let values = set.values();
            let avg = mean(&values);

            info!(
                points = set.len(),
                dropped_rows = set.dropped_rows,
                mean = avg,
                stddev = stddev(&values, avg),
                median = %median(&values),
                "Points summary"
            );
        }
    }

    Ok(())
}

/// Runs the full pipeline and writes its outputs. On failure an error record
/// is still appended to `stats_csv`.
#[tracing::instrument(skip(cfg, stats_csv))]
async fn aggregate(
    points: &str,
    regions: &str,
    cfg: &PipelineConfig,
    output: &str,
    gzip: bool,
    stats_csv: Option<&str>,
) -> Result<()> {
    let client = BasicClient::with_timeout(Duration::from_secs(cfg.http_timeout_secs))?;

    let store = PipelineStore::new();
    let mut events = store.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StateEvent::Failed(message)) => error!(%message, "Pipeline failed"),
                Ok(event) => debug!(?event, "Pipeline state changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "State watcher fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = pipeline::run(&client, points, regions, cfg, &store).await;
    drop(store);
    let _ = watcher.await;

    match result {
        Ok((aggregation, stats)) => {
            print_json(&aggregation.summary)?;
            write_geojson(output, &aggregation.enriched, gzip)?;
            if let Some(path) = stats_csv {
                append_record(path, &stats)?;
            }
            info!(
                mapped = stats.mapped,
                unmapped = stats.unmapped,
                coverage_pct = stats.coverage_pct(),
                "Run finished"
            );
            Ok(())
        }
        Err(e) => {
            if let Some(path) = stats_csv {
                let record = RunStats::from_error("load_error", &format!("{e:#}"))
                    .with_sources(points, regions);
                if let Err(write_err) = append_record(path, &record) {
                    error!(error = %write_err, "Failed to write error record");
                }
            }
            Err(e)
        }
    }
}
