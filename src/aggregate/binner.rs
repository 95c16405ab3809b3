//! Point-to-region assignment.

use tracing::{debug, info};

use crate::aggregate::types::Bucket;
use crate::points::Point;
use crate::regions::RegionCollection;
use crate::stats::BinStats;

/// Id of the first region, in collection order, containing the WGS84 position.
///
/// The position is projected into the collection's coordinate system first.
/// Regions whose containment test errors are skipped; `geometry_errors` counts them.
pub fn find_region<'a>(
    regions: &'a RegionCollection,
    lng: f64,
    lat: f64,
    geometry_errors: &mut usize,
) -> Option<&'a str> {
    let (x, y) = regions.crs.from_wgs84(lng, lat);

    for region in &regions.regions {
        match region.contains(x, y) {
            Ok(true) => return Some(region.id.as_str()),
            Ok(false) => {}
            Err(e) => {
                *geometry_errors += 1;
                debug!(error = %e, "Point-in-polygon test failed");
            }
        }
    }
    None
}

/// Assigns each point's value to the first region containing it.
///
/// The returned bucket has an entry for every region, empty when no point
/// landed in it. Points outside all regions are only counted.
pub fn bin_points(regions: &RegionCollection, points: &[Point]) -> (Bucket, BinStats) {
    let mut bucket: Bucket = regions.ids().map(|id| (id.to_string(), Vec::new())).collect();
    let mut stats = BinStats::default();

    for point in points {
        match find_region(regions, point.lng, point.lat, &mut stats.geometry_errors) {
            Some(id) => {
                if let Some(values) = bucket.get_mut(id) {
                    values.push(point.value);
                }
                stats.mapped += 1;
            }
            None => stats.unmapped += 1,
        }
    }

    info!(
        total = stats.total(),
        mapped = stats.mapped,
        unmapped = stats.unmapped,
        geometry_errors = stats.geometry_errors,
        "Mapped points to regions"
    );

    (bucket, stats)
}
