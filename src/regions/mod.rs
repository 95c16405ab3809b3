//! Region index: boundary collections keyed by region code.
//!
//! [`load_regions`] reads a GeoJSON FeatureCollection or a WKT region CSV,
//! keeps only the requested hierarchical level, and records the coordinate
//! system the boundaries are expressed in. Every retained feature becomes a
//! [`Region`], aligned by position with the features of the underlying
//! collection.

pub mod crs;
pub mod wkt;

use anyhow::{Context, Result, anyhow, bail};
use geo::{Coord, Intersects, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson, feature::Id};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::fetch::{HttpClient, fetch_source};
pub use crs::CoordinateSystem;
use wkt::WktStats;

/// Level property consulted when the configured one is absent on a feature.
const FALLBACK_LEVEL_PROPERTY: &str = "NUTS_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionFormat {
    GeoJson,
    WktCsv,
}

impl RegionFormat {
    /// `.csv` sources are WKT region tables, everything else is GeoJSON.
    pub fn infer(source: &str) -> Self {
        let path = source.split(['?', '#']).next().unwrap_or(source);
        if path.to_ascii_lowercase().ends_with(".csv") {
            RegionFormat::WktCsv
        } else {
            RegionFormat::GeoJson
        }
    }
}

impl FromStr for RegionFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(RegionFormat::GeoJson),
            "wkt-csv" | "csv" => Ok(RegionFormat::WktCsv),
            other => Err(anyhow!("Unknown region format '{other}'")),
        }
    }
}

/// How a region source is read and filtered.
#[derive(Debug, Clone)]
pub struct RegionOptions {
    pub id_property: String,
    pub level_property: String,
    pub level: Option<String>,
    pub crs: Option<CoordinateSystem>,
    pub format: Option<RegionFormat>,
    pub exclude_ids: Vec<String>,
    pub intensity_column: String,
    pub strict_wkt: bool,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            id_property: "NUTS_ID".to_string(),
            level_property: "LEVL_CODE".to_string(),
            level: None,
            crs: None,
            format: None,
            exclude_ids: Vec::new(),
            intensity_column: "t2m".to_string(),
            strict_wkt: false,
        }
    }
}

/// One region boundary.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    shape: Result<MultiPolygon<f64>, String>,
}

impl Region {
    pub fn new(id: impl Into<String>, shape: MultiPolygon<f64>) -> Self {
        Self { id: id.into(), shape: Ok(shape) }
    }

    /// A region whose every containment test fails with `reason`.
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { id: id.into(), shape: Err(reason.into()) }
    }

    fn from_feature(id: String, feature: &Feature) -> Self {
        let Some(geometry) = &feature.geometry else {
            return Self::invalid(id, "feature has no geometry");
        };

        // geo closes open rings on conversion, so short rings are caught here
        let short_ring = match &geometry.value {
            geojson::Value::Polygon(rings) => rings.iter().any(|r| r.len() < 4),
            geojson::Value::MultiPolygon(polys) => polys.iter().flatten().any(|r| r.len() < 4),
            _ => false,
        };
        if short_ring {
            return Self::invalid(id, "ring with fewer than 4 positions");
        }

        let converted: Result<geo::Geometry<f64>, _> = geometry.value.clone().try_into();
        match converted {
            Ok(geo::Geometry::MultiPolygon(mp)) => Self::new(id, mp),
            Ok(geo::Geometry::Polygon(p)) => Self::new(id, MultiPolygon::new(vec![p])),
            Ok(_) => Self::invalid(id, format!("unsupported geometry type {}", geometry_type(&geometry.value))),
            Err(e) => Self::invalid(id, format!("unconvertible geometry: {e:?}")),
        }
    }

    /// Boundary-inclusive point-in-polygon test in the region's own coordinates.
    ///
    /// # Errors
    ///
    /// Fails when the region geometry is missing, not polygonal, or has a ring
    /// with fewer than four positions.
    pub fn contains(&self, x: f64, y: f64) -> Result<bool> {
        let shape = self
            .shape
            .as_ref()
            .map_err(|reason| anyhow!("region {}: {reason}", self.id))?;

        for polygon in shape {
            let degenerate = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .any(|ring| ring.0.len() < 4);
            if degenerate {
                bail!("region {}: ring with fewer than 4 positions", self.id);
            }
        }

        Ok(shape.intersects(&Coord { x, y }))
    }
}

/// An immutable, filtered set of regions plus the features they came from.
#[derive(Debug, Clone)]
pub struct RegionCollection {
    pub crs: CoordinateSystem,
    pub regions: Vec<Region>,
    pub features: FeatureCollection,
    /// Row outcomes when the regions came from a WKT table.
    pub wkt_stats: Option<WktStats>,
}

impl RegionCollection {
    /// Builds the index from an already-parsed collection.
    ///
    /// `source` is only used as a CRS hint when neither `options.crs` nor the
    /// document's `crs` member names one.
    pub fn from_collection(
        collection: FeatureCollection,
        source: &str,
        options: &RegionOptions,
    ) -> Result<Self> {
        let crs = options
            .crs
            .or_else(|| declared_crs(&collection))
            .or_else(|| CoordinateSystem::from_hint(source))
            .unwrap_or_default();

        let total = collection.features.len();
        let mut features = Vec::with_capacity(total);
        let mut regions = Vec::with_capacity(total);

        for (idx, feature) in collection.features.into_iter().enumerate() {
            if let Some(level) = &options.level {
                if !matches_level(&feature, &options.level_property, level) {
                    continue;
                }
            }

            let id = region_id(&feature, &options.id_property).with_context(|| {
                format!("Feature {idx} has no '{}' region code", options.id_property)
            })?;

            if options.exclude_ids.iter().any(|x| x == &id) {
                debug!(region = %id, "Region excluded");
                continue;
            }

            regions.push(Region::from_feature(id, &feature));
            features.push(feature);
        }

        info!(
            total,
            retained = regions.len(),
            level = options.level.as_deref().unwrap_or("all"),
            crs = %crs,
            "Region index built"
        );

        Ok(Self {
            crs,
            regions,
            features: FeatureCollection {
                bbox: collection.bbox,
                features,
                foreign_members: collection.foreign_members,
            },
            wkt_stats: None,
        })
    }

    /// Parses GeoJSON bytes and builds the index.
    pub fn from_geojson(bytes: &[u8], source: &str, options: &RegionOptions) -> Result<Self> {
        let geojson = GeoJson::from_reader(bytes).context("Failed to parse region GeoJSON")?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => bail!("Region GeoJSON must be a FeatureCollection"),
        };
        Self::from_collection(collection, source, options)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.id.as_str())
    }
}

/// Loads a region collection from a URL or local path.
///
/// Fails as a whole on an unreachable source or a malformed collection.
#[tracing::instrument(skip(client, options), fields(source = %source))]
pub async fn load_regions<C: HttpClient + ?Sized>(
    client: &C,
    source: &str,
    options: &RegionOptions,
) -> Result<RegionCollection> {
    let bytes = fetch_source(client, source)
        .await
        .with_context(|| format!("Failed to load regions from {source}"))?;

    match options.format.unwrap_or_else(|| RegionFormat::infer(source)) {
        RegionFormat::GeoJson => RegionCollection::from_geojson(&bytes, source, options),
        RegionFormat::WktCsv => {
            let parsed = wkt::parse_region_csv(&bytes, options)?;
            let options = RegionOptions {
                crs: options.crs.or(Some(CoordinateSystem::Wgs84)),
                ..options.clone()
            };
            let mut regions = RegionCollection::from_collection(parsed.collection, source, &options)?;
            regions.wkt_stats = Some(parsed.stats);
            Ok(regions)
        }
    }
}

/// Reads `crs.properties.name` from a legacy GeoJSON `crs` member.
///
/// A declared but unrecognised name resolves to WGS84 rather than falling
/// through to the source-name hint.
fn declared_crs(collection: &FeatureCollection) -> Option<CoordinateSystem> {
    let member = collection.foreign_members.as_ref()?.get("crs")?;
    let name = member
        .pointer("/properties/name")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();

    match CoordinateSystem::from_hint(name) {
        Some(crs) => Some(crs),
        None => {
            warn!(crs = name, "Unrecognised coordinate system, assuming WGS84");
            Some(CoordinateSystem::Wgs84)
        }
    }
}

fn geometry_type(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn region_id(feature: &Feature, id_property: &str) -> Option<String> {
    match feature.property(id_property) {
        Some(JsonValue::String(s)) => return Some(s.clone()),
        Some(JsonValue::Number(n)) => return Some(n.to_string()),
        _ => {}
    }

    match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    }
}

/// Compares a level code as both number and string, so `2` and `"2"` match.
fn matches_level(feature: &Feature, level_property: &str, selector: &str) -> bool {
    let value = feature
        .property(level_property)
        .or_else(|| feature.property(FALLBACK_LEVEL_PROPERTY));

    let selector_num = selector.trim().parse::<f64>().ok();

    match value {
        Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|n| Some(n) == selector_num),
        Some(JsonValue::String(s)) => {
            s == selector || s.trim().parse::<f64>().ok().is_some_and(|n| Some(n) == selector_num)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square_feature(id: serde_json::Value, level: serde_json::Value, x0: f64, y0: f64) -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": { "NUTS_ID": id, "LEVL_CODE": level },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x0, y0], [x0 + 1.0, y0], [x0 + 1.0, y0 + 1.0], [x0, y0 + 1.0], [x0, y0]]]
            }
        })
    }

    fn collection_bytes(features: Vec<serde_json::Value>, extra: Option<(&str, serde_json::Value)>) -> Vec<u8> {
        let mut doc = json!({ "type": "FeatureCollection", "features": features });
        if let Some((k, v)) = extra {
            doc[k] = v;
        }
        serde_json::to_vec(&doc).unwrap()
    }

    #[test]
    fn test_level_filter_accepts_number_and_string() {
        let bytes = collection_bytes(
            vec![
                square_feature(json!("DE"), json!(0), 0.0, 0.0),
                square_feature(json!("DE1"), json!(1), 0.0, 0.0),
                square_feature(json!("DE2"), json!("1"), 1.0, 0.0),
            ],
            None,
        );
        let options = RegionOptions { level: Some("1".into()), ..Default::default() };

        let regions = RegionCollection::from_geojson(&bytes, "nuts.geojson", &options).unwrap();
        assert_eq!(regions.ids().collect::<Vec<_>>(), vec!["DE1", "DE2"]);
        assert_eq!(regions.features.features.len(), 2);
    }

    #[test]
    fn test_level_filter_no_match_is_empty_not_error() {
        let bytes = collection_bytes(vec![square_feature(json!("FR"), json!(0), 0.0, 0.0)], None);
        let options = RegionOptions { level: Some("3".into()), ..Default::default() };

        let regions = RegionCollection::from_geojson(&bytes, "nuts.geojson", &options).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_crs_from_document_member() {
        let bytes = collection_bytes(
            vec![square_feature(json!("A"), json!(2), 0.0, 0.0)],
            Some(("crs", json!({ "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3857" } }))),
        );

        let regions = RegionCollection::from_geojson(&bytes, "nuts_4326.geojson", &RegionOptions::default()).unwrap();
        assert_eq!(regions.crs, CoordinateSystem::WebMercator);
    }

    #[test]
    fn test_unknown_declared_crs_is_wgs84_not_source_hint() {
        let bytes = collection_bytes(
            vec![square_feature(json!("A"), json!(2), 0.0, 0.0)],
            Some(("crs", json!({ "type": "name", "properties": { "name": "EPSG:2154" } }))),
        );

        let regions = RegionCollection::from_geojson(&bytes, "nuts_3857.geojson", &RegionOptions::default()).unwrap();
        assert_eq!(regions.crs, CoordinateSystem::Wgs84);
    }

    #[test]
    fn test_level_falls_back_to_nuts_level() {
        let mut legacy = square_feature(json!("IE0"), json!(null), 0.0, 0.0);
        legacy["properties"] = json!({ "NUTS_ID": "IE0", "NUTS_LEVEL": "0" });
        let mut legacy_2 = square_feature(json!("IE05"), json!(null), 0.0, 0.0);
        legacy_2["properties"] = json!({ "NUTS_ID": "IE05", "NUTS_LEVEL": 2 });
        let bytes = collection_bytes(vec![legacy, legacy_2], None);
        let options = RegionOptions { level: Some("2".into()), ..Default::default() };

        let regions = RegionCollection::from_geojson(&bytes, "x.geojson", &options).unwrap();
        assert_eq!(regions.ids().collect::<Vec<_>>(), vec!["IE05"]);
    }

    #[test]
    fn test_crs_priority_config_then_source_then_default() {
        let bytes = collection_bytes(vec![square_feature(json!("A"), json!(2), 0.0, 0.0)], None);

        let from_source = RegionCollection::from_geojson(&bytes, "nuts_3035.json", &RegionOptions::default()).unwrap();
        assert_eq!(from_source.crs, CoordinateSystem::EuropeanLaea);

        let options = RegionOptions { crs: Some(CoordinateSystem::WebMercator), ..Default::default() };
        let configured = RegionCollection::from_geojson(&bytes, "nuts_3035.json", &options).unwrap();
        assert_eq!(configured.crs, CoordinateSystem::WebMercator);

        let default = RegionCollection::from_geojson(&bytes, "nuts.json", &RegionOptions::default()).unwrap();
        assert_eq!(default.crs, CoordinateSystem::Wgs84);
    }

    #[test]
    fn test_numeric_and_feature_level_ids() {
        let mut no_prop = square_feature(json!(null), json!(2), 0.0, 0.0);
        no_prop["id"] = json!("FEAT-1");
        let bytes = collection_bytes(vec![square_feature(json!(42), json!(2), 0.0, 0.0), no_prop], None);

        let regions = RegionCollection::from_geojson(&bytes, "x.geojson", &RegionOptions::default()).unwrap();
        assert_eq!(regions.ids().collect::<Vec<_>>(), vec!["42", "FEAT-1"]);
    }

    #[test]
    fn test_missing_region_code_fails_load() {
        let bytes = collection_bytes(vec![square_feature(json!(null), json!(2), 0.0, 0.0)], None);
        let err = RegionCollection::from_geojson(&bytes, "x.geojson", &RegionOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Feature 0"));
    }

    #[test]
    fn test_not_a_feature_collection_fails_load() {
        let bytes = serde_json::to_vec(&json!({ "type": "Point", "coordinates": [1.0, 2.0] })).unwrap();
        assert!(RegionCollection::from_geojson(&bytes, "x.geojson", &RegionOptions::default()).is_err());
        assert!(RegionCollection::from_geojson(b"not json", "x.geojson", &RegionOptions::default()).is_err());
    }

    #[test]
    fn test_exclude_ids() {
        let bytes = collection_bytes(
            vec![
                square_feature(json!("FR"), json!(0), 0.0, 0.0),
                square_feature(json!("FR1"), json!(1), 0.0, 0.0),
            ],
            None,
        );
        let options = RegionOptions { exclude_ids: vec!["FR".into()], ..Default::default() };

        let regions = RegionCollection::from_geojson(&bytes, "x.geojson", &options).unwrap();
        assert_eq!(regions.ids().collect::<Vec<_>>(), vec!["FR1"]);
    }

    #[test]
    fn test_contains_is_boundary_inclusive() {
        let bytes = collection_bytes(vec![square_feature(json!("A"), json!(2), 0.0, 0.0)], None);
        let regions = RegionCollection::from_geojson(&bytes, "x.geojson", &RegionOptions::default()).unwrap();
        let a = &regions.regions[0];

        assert!(a.contains(0.5, 0.5).unwrap());
        assert!(a.contains(1.0, 0.5).unwrap());
        assert!(!a.contains(1.5, 0.5).unwrap());
    }

    #[test]
    fn test_non_polygon_geometry_errors_on_contains() {
        let line = json!({
            "type": "Feature",
            "properties": { "NUTS_ID": "L" },
            "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] }
        });
        let empty = json!({ "type": "Feature", "properties": { "NUTS_ID": "E" }, "geometry": null });
        let bytes = collection_bytes(vec![line, empty], None);

        let regions = RegionCollection::from_geojson(&bytes, "x.geojson", &RegionOptions::default()).unwrap();
        assert_eq!(regions.len(), 2);
        assert!(regions.regions[0].contains(0.5, 0.5).is_err());
        assert!(regions.regions[1].contains(0.5, 0.5).is_err());
    }

    #[test]
    fn test_short_ring_errors_on_contains() {
        let triangle = json!({
            "type": "Feature",
            "properties": { "NUTS_ID": "T" },
            "geometry": { "type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]] }
        });
        let bytes = collection_bytes(vec![triangle], None);

        let regions = RegionCollection::from_geojson(&bytes, "x.geojson", &RegionOptions::default()).unwrap();
        assert_eq!(regions.ids().collect::<Vec<_>>(), vec!["T"]);
        assert!(regions.regions[0].contains(0.9, 0.1).is_err());
    }

    #[test]
    fn test_format_inference() {
        assert_eq!(RegionFormat::infer("data/nutsRegions.csv"), RegionFormat::WktCsv);
        assert_eq!(RegionFormat::infer("https://x/y.CSV?v=2"), RegionFormat::WktCsv);
        assert_eq!(RegionFormat::infer("nuts.geojson"), RegionFormat::GeoJson);
    }
}
