//! CSV point loader.
//!
//! Input is a header line followed by positional `time,lat,lng,value` rows.
//! Commas are never quoted or escaped in this format.

use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use serde::Serialize;
use tracing::{debug, info};

use crate::fetch::{HttpClient, fetch_source};

/// One measurement at a geographic position (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub time: f64,
    pub lat: f64,
    pub lng: f64,
    pub value: f64,
}

/// Parsed points plus the number of rows discarded for a bad position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    pub points: Vec<Point>,
    pub dropped_rows: usize,
}

impl PointSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

fn parse_field(record: &ByteRecord, idx: usize) -> f64 {
    record
        .get(idx)
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(f64::NAN)
}

fn or_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}

/// Parses CSV text into points, in input order.
///
/// The header is skipped without validation. A row whose latitude or
/// longitude is not a finite number is dropped; an unparsable or infinite
/// time or value becomes 0.
///
/// # Errors
///
/// Only fails on I/O errors from the underlying reader, which cannot happen
/// for an in-memory slice in practice.
pub fn parse_points(text: &[u8]) -> Result<PointSet> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(text);

    let mut set = PointSet::default();
    let mut record = ByteRecord::new();

    while rdr.read_byte_record(&mut record)? {
        if record.iter().all(|f| f.iter().all(u8::is_ascii_whitespace)) {
            continue;
        }

        let lat = parse_field(&record, 1);
        let lng = parse_field(&record, 2);
        if lat.is_nan() || lng.is_nan() {
            set.dropped_rows += 1;
            continue;
        }

        set.points.push(Point {
            time: or_zero(parse_field(&record, 0)),
            lat,
            lng,
            value: or_zero(parse_field(&record, 3)),
        });
    }

    debug!(points = set.points.len(), dropped = set.dropped_rows, "Parsed point CSV");
    Ok(set)
}

/// Fetches and parses a points CSV from a URL or local path.
#[tracing::instrument(skip(client), fields(source = %source))]
pub async fn load_points<C: HttpClient + ?Sized>(client: &C, source: &str) -> Result<PointSet> {
    let bytes = fetch_source(client, source)
        .await
        .with_context(|| format!("Failed to load points from {source}"))?;
    let set = parse_points(&bytes)?;
    info!(points = set.len(), dropped_rows = set.dropped_rows, "Points loaded");
    Ok(set)
}

/// Keeps `max(1, floor(n * rate))` points taken at a fixed stride.
///
/// A rate of 1.0 or more returns the input unchanged.
pub fn sample(points: &[Point], rate: f64) -> Vec<Point> {
    if points.is_empty() || rate >= 1.0 {
        return points.to_vec();
    }

    let sample_size = ((points.len() as f64 * rate.max(0.0)).floor() as usize).max(1);
    let step = (points.len() / sample_size).max(1);

    points
        .iter()
        .step_by(step)
        .take(sample_size)
        .copied()
        .collect()
}
