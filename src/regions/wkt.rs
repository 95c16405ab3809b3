//! Region tables stored as CSV with a WKT geometry column.
//!
//! Each row carries a region code, a `POLYGON` or `MULTIPOLYGON` in WGS84
//! degrees, and a precomputed intensity. Rows are turned into GeoJSON
//! features so the rest of the pipeline treats them like any other region
//! source.

use anyhow::{Context, Result, anyhow, bail};
use csv::{ReaderBuilder, Trim};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::RegionOptions;

const GEOMETRY_COLUMN: &str = "geometry";

type Ring = Vec<Vec<f64>>;
type PolygonRings = Vec<Ring>;

/// Outcome counters for one region table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WktStats {
    pub processed: usize,
    pub errors: usize,
    pub skipped_regions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedRegions {
    pub collection: FeatureCollection,
    pub stats: WktStats,
}

/// Parses a region table into a feature collection.
///
/// Fields may be double-quoted, so a geometry can contain commas and line
/// breaks; inside quotes a backslash escapes the next character. Rows with
/// unparsable geometry are skipped and recorded unless `options.strict_wkt`
/// is set, in which case the first one fails the load.
///
/// # Errors
///
/// Fails when the input is empty or lacks one of the id, `geometry` or
/// intensity columns.
pub fn parse_region_csv(bytes: &[u8], options: &RegionOptions) -> Result<ParsedRegions> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .escape(Some(b'\\'))
        .from_reader(bytes);

    let headers = rdr.headers().context("Failed to read region CSV header")?.clone();
    if headers.iter().all(str::is_empty) {
        bail!("No CSV data provided");
    }
    let find = |name: &str| headers.iter().position(|h| h == name);

    let (Some(id_idx), Some(geom_idx), Some(value_idx)) = (
        find(&options.id_property),
        find(GEOMETRY_COLUMN),
        find(&options.intensity_column),
    ) else {
        bail!(
            "CSV must contain {}, {} and {} columns. Found columns: {}",
            options.id_property,
            GEOMETRY_COLUMN,
            options.intensity_column,
            headers.iter().collect::<Vec<_>>().join(", ")
        );
    };

    let mut stats = WktStats::default();
    let mut features = Vec::new();

    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable row");
                stats.errors += 1;
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());

        let (Some(id), Some(wkt), Some(value)) =
            (record.get(id_idx), record.get(geom_idx), record.get(value_idx))
        else {
            warn!(line, "Skipping row with too few columns");
            stats.errors += 1;
            continue;
        };

        if options.exclude_ids.iter().any(|x| x == id) {
            continue;
        }

        let geometry = match parse_wkt(wkt) {
            Ok(value) => value,
            Err(e) if options.strict_wkt => {
                return Err(e.context(format!("Invalid geometry for region {id} on line {line}")));
            }
            Err(e) => {
                debug!(region = %id, error = %e, "Skipping region with invalid geometry");
                stats.errors += 1;
                stats.skipped_regions.push(id.to_string());
                continue;
            }
        };

        let intensity = value.parse::<f64>().ok().filter(|v| v.is_finite());

        let mut properties = JsonObject::new();
        properties.insert(options.id_property.clone(), json!(id));
        properties.insert("intensity".to_string(), json!(intensity));

        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(geometry)),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
        stats.processed += 1;
    }

    info!(
        processed = stats.processed,
        errors = stats.errors,
        skipped = ?stats.skipped_regions,
        "Region table parsed"
    );

    Ok(ParsedRegions {
        collection: FeatureCollection { bbox: None, features, foreign_members: None },
        stats,
    })
}

/// Parses a WKT `POLYGON` or `MULTIPOLYGON` into a GeoJSON geometry value.
pub fn parse_wkt(wkt: &str) -> Result<Value> {
    let clean = wkt.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = clean.to_ascii_uppercase();

    if let Some(body) = upper.strip_prefix("MULTIPOLYGON") {
        let inner = strip_outer_parens(body.trim())?;
        let polygons = balanced_groups(inner)?
            .into_iter()
            .map(parse_polygon_body)
            .collect::<Result<Vec<_>>>()?;
        if polygons.is_empty() {
            bail!("No valid polygons found in MULTIPOLYGON");
        }
        Ok(Value::MultiPolygon(polygons))
    } else if let Some(body) = upper.strip_prefix("POLYGON") {
        Ok(Value::Polygon(parse_polygon_body(body.trim())?))
    } else {
        let preview: String = clean.chars().take(20).collect();
        bail!("Unsupported WKT geometry: {preview}...")
    }
}

/// `((x y, ...), (x y, ...))` to a list of closed rings.
fn parse_polygon_body(body: &str) -> Result<PolygonRings> {
    let inner = strip_outer_parens(body)?;
    let rings = balanced_groups(inner)?
        .into_iter()
        .map(|ring| parse_ring(strip_outer_parens(ring)?))
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        bail!("Invalid POLYGON format");
    }
    Ok(rings)
}

fn parse_ring(text: &str) -> Result<Ring> {
    let mut ring = text
        .split(',')
        .map(|pair| {
            let mut parts = pair.split_whitespace();
            let (Some(x), Some(y)) = (parts.next(), parts.next()) else {
                bail!("Invalid coordinate pair: {}", pair.trim());
            };
            let x: f64 = x.parse().map_err(|_| anyhow!("Invalid coordinate values: {}", pair.trim()))?;
            let y: f64 = y.parse().map_err(|_| anyhow!("Invalid coordinate values: {}", pair.trim()))?;
            if !x.is_finite() || !y.is_finite() || x.abs() > 180.0 || y.abs() > 90.0 {
                bail!("Coordinate values out of range: {x}, {y}");
            }
            Ok(vec![x, y])
        })
        .collect::<Result<Ring>>()?;

    if ring.first() != ring.last() {
        let first = ring[0].clone();
        ring.push(first);
    }
    if ring.len() < 4 {
        bail!("Polygon ring must have at least 4 points, got {}", ring.len());
    }
    Ok(ring)
}

fn strip_outer_parens(s: &str) -> Result<&str> {
    s.trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| anyhow!("Expected parenthesised group: {s}"))
}

/// Top-level `( ... )` groups of `s`, including their parentheses.
fn balanced_groups(s: &str) -> Result<Vec<&str>> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("Unbalanced parentheses in WKT"))?;
                if depth == 0 {
                    groups.push(&s[start..=i]);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        bail!("Unbalanced parentheses in WKT");
    }
    Ok(groups)
}
