//! Output formatting and persistence for aggregation results.
//!
//! Supports JSON logging, GeoJSON files (optionally gzip-compressed), and
//! CSV append of run statistics.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Logs any serialisable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes `value` as pretty JSON to `path`, creating parent directories.
///
/// The file is gzip-compressed when `gzip` is set or the path ends in `.gz`.
pub fn write_geojson(path: &str, value: &impl Serialize, gzip: bool) -> Result<()> {
    let gzip = gzip || path.ends_with(".gz");

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("Failed to create {path}"))?;
    let writer = BufWriter::new(file);

    if gzip {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer_pretty(&mut encoder, value)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }

    info!(path, gzip, "GeoJSON written");
    Ok(())
}

/// Appends one serialisable record as a CSV row to `path`.
///
/// The header row is only written when the file is new, so repeated runs
/// accumulate into one table. Records used with the same file must share a
/// shape, such as [`RunStats`](crate::stats::RunStats).
pub fn append_record<T: Serialize>(path: &str, record: &T) -> Result<()> {
    let is_new = !Path::new(path).exists();
    debug!(path, is_new, "Appending CSV record");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open stats file {path}"))?;

    let mut writer = WriterBuilder::new().has_headers(is_new).from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}
