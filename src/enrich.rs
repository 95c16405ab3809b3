//! Merging region summaries back into boundary features.

use geojson::{FeatureCollection, Geometry, JsonObject, Position, Value};
use tracing::{debug, info, warn};

use crate::aggregate::scale::ColorScale;
use crate::aggregate::types::RegionSummary;
use crate::regions::{CoordinateSystem, RegionCollection};

pub const INTENSITY_PROPERTY: &str = "intensity";
pub const FILL_COLOR_PROPERTY: &str = "fill_color";

/// Returns a copy of the region features with an `intensity` property set
/// from `summary`, plus `fill_color` when a scale is given.
///
/// Regions without data, or missing from the summary, get `null`. The input
/// collection is left untouched.
pub fn enrich(
    regions: &RegionCollection,
    summary: &RegionSummary,
    scale: Option<ColorScale>,
) -> FeatureCollection {
    let mut enriched = regions.features.clone();

    for (feature, region) in enriched.features.iter_mut().zip(&regions.regions) {
        let intensity = summary.get(&region.id).copied().unwrap_or_default();
        let properties = feature.properties.get_or_insert_with(JsonObject::new);

        properties.insert(INTENSITY_PROPERTY.to_string(), intensity.to_json());
        if let Some(scale) = scale {
            properties.insert(FILL_COLOR_PROPERTY.to_string(), scale.color(intensity).into());
        }
    }

    debug!(features = enriched.features.len(), "Enriched region features");
    enriched
}

/// Returns a copy of `collection` with every position converted from `crs`
/// to WGS84 longitude / latitude.
///
/// Bounding boxes and the legacy `crs` member are dropped since they no
/// longer describe the output. With the approximate LAEA path this is lossy.
pub fn convert_coordinates(collection: &FeatureCollection, crs: CoordinateSystem) -> FeatureCollection {
    info!(from = %crs, "Converting coordinates to WGS84");

    let mut converted = collection.clone();
    converted.bbox = None;
    if let Some(members) = converted.foreign_members.as_mut() {
        members.remove("crs");
    }

    for feature in &mut converted.features {
        feature.bbox = None;
        if let Some(geometry) = feature.geometry.as_mut() {
            convert_geometry(geometry, crs);
        }
    }

    if let Some(sample) = converted
        .features
        .first()
        .and_then(|f| f.geometry.as_ref())
        .and_then(|g| first_position(&g.value))
    {
        if sample.len() >= 2 && (sample[0].abs() > 180.0 || sample[1].abs() > 90.0) {
            warn!(x = sample[0], y = sample[1], "Converted coordinates are outside the WGS84 range");
        }
    }

    converted
}

fn convert_geometry(geometry: &mut Geometry, crs: CoordinateSystem) {
    geometry.bbox = None;
    convert_value(&mut geometry.value, crs);
}

fn convert_value(value: &mut Value, crs: CoordinateSystem) {
    match value {
        Value::Point(p) => convert_position(p, crs),
        Value::MultiPoint(ps) | Value::LineString(ps) => {
            ps.iter_mut().for_each(|p| convert_position(p, crs))
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter_mut()
            .flatten()
            .for_each(|p| convert_position(p, crs)),
        Value::MultiPolygon(polys) => polys
            .iter_mut()
            .flatten()
            .flatten()
            .for_each(|p| convert_position(p, crs)),
        Value::GeometryCollection(geoms) => geoms.iter_mut().for_each(|g| convert_geometry(g, crs)),
    }
}

/// Rewrites x/y in place; any extra ordinates (elevation) are kept.
fn convert_position(position: &mut Position, crs: CoordinateSystem) {
    if position.len() < 2 {
        return;
    }
    let (lng, lat) = crs.to_wgs84(position[0], position[1]);
    position[0] = lng;
    position[1] = lat;
}

fn first_position(value: &Value) -> Option<&Position> {
    match value {
        Value::Point(p) => Some(p),
        Value::MultiPoint(ps) | Value::LineString(ps) => ps.first(),
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines.first()?.first(),
        Value::MultiPolygon(polys) => polys.first()?.first()?.first(),
        Value::GeometryCollection(geoms) => geoms.first().and_then(|g| first_position(&g.value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::types::Intensity;
    use crate::regions::RegionOptions;
    use serde_json::json;

    fn regions() -> RegionCollection {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "NUTS_ID": "R1", "NAME_LATN": "One" },
                    "geometry": { "type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]] }
                },
                {
                    "type": "Feature",
                    "properties": { "NUTS_ID": "R2" },
                    "geometry": { "type": "MultiPolygon", "coordinates": [[[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0], [2.0, 2.0]]]] }
                }
            ]
        });
        RegionCollection::from_geojson(&serde_json::to_vec(&doc).unwrap(), "r.geojson", &RegionOptions::default())
            .unwrap()
    }

    fn summary() -> RegionSummary {
        [("R1".to_string(), Intensity::Value(10.0)), ("R2".to_string(), Intensity::NoData)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_enrich_sets_intensity_and_null_for_no_data() {
        let base = regions();
        let enriched = enrich(&base, &summary(), None);

        assert_eq!(enriched.features[0].property(INTENSITY_PROPERTY), Some(&json!(10.0)));
        assert_eq!(enriched.features[0].property("NAME_LATN"), Some(&json!("One")));
        assert_eq!(enriched.features[1].property(INTENSITY_PROPERTY), Some(&serde_json::Value::Null));
        assert!(enriched.features[0].property(FILL_COLOR_PROPERTY).is_none());
    }

    #[test]
    fn test_enrich_is_idempotent_and_does_not_mutate_input() {
        let base = regions();
        let before = base.features.clone();

        let first = enrich(&base, &summary(), Some(ColorScale::Intensity));
        let second = enrich(&base, &summary(), Some(ColorScale::Intensity));

        assert_eq!(first, second);
        assert_eq!(base.features, before);
        assert!(base.features.features[0].property(INTENSITY_PROPERTY).is_none());
    }

    #[test]
    fn test_enrich_region_missing_from_summary_gets_null() {
        let enriched = enrich(&regions(), &RegionSummary::new(), Some(ColorScale::Temperature));
        assert_eq!(enriched.features[0].property(INTENSITY_PROPERTY), Some(&serde_json::Value::Null));
        assert_eq!(enriched.features[0].property(FILL_COLOR_PROPERTY), Some(&json!("#CCCCCC")));
    }

    #[test]
    fn test_convert_coordinates_web_mercator() {
        let crs = CoordinateSystem::WebMercator;
        let (x, y) = crs.from_wgs84(10.0, 50.0);
        let mut collection = FeatureCollection { bbox: Some(vec![0.0; 4]), features: vec![], foreign_members: None };
        collection.features.push(geojson::Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::MultiPolygon(vec![vec![vec![vec![x, y, 120.0]]]]))),
            id: None,
            properties: None,
            foreign_members: None,
        });

        let converted = convert_coordinates(&collection, crs);
        let Value::MultiPolygon(polys) = &converted.features[0].geometry.as_ref().unwrap().value else {
            panic!("geometry type changed");
        };
        let p = &polys[0][0][0];
        assert!((p[0] - 10.0).abs() < 1e-6);
        assert!((p[1] - 50.0).abs() < 1e-6);
        assert_eq!(p[2], 120.0);
        assert!(converted.bbox.is_none());

        // input untouched
        let Value::MultiPolygon(orig) = &collection.features[0].geometry.as_ref().unwrap().value else {
            panic!()
        };
        assert_eq!(orig[0][0][0][0], x);
    }

    #[test]
    fn test_convert_coordinates_laea_and_crs_member_removed() {
        let crs = CoordinateSystem::EuropeanLaea;
        let mut members = JsonObject::new();
        members.insert("crs".into(), json!({ "properties": { "name": "EPSG:3035" } }));
        let collection = FeatureCollection {
            bbox: None,
            features: vec![geojson::Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![4321000.0 + 85000.0, 3210000.0 + 220000.0]))),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: Some(members),
        };

        let converted = convert_coordinates(&collection, crs);
        assert!(!converted.foreign_members.as_ref().unwrap().contains_key("crs"));
        assert_eq!(converted.features[0].geometry.as_ref().unwrap().value, Value::Point(vec![1.0, 2.0]));
    }
}
