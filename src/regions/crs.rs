//! Coordinate reference systems understood by the region index.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Half the Web Mercator world width in metres.
const MERCATOR_HALF_EXTENT: f64 = 20037508.34;

/// False origin and per-degree scale of the linear LAEA approximation.
const LAEA_X0: f64 = 4321000.0;
const LAEA_Y0: f64 = 3210000.0;
const LAEA_X_PER_DEG: f64 = 85000.0;
const LAEA_Y_PER_DEG: f64 = 110000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinateSystem {
    /// EPSG:4326, longitude / latitude in degrees.
    #[default]
    Wgs84,
    /// EPSG:3857.
    WebMercator,
    /// EPSG:3035, approximated linearly around Europe.
    EuropeanLaea,
}

impl CoordinateSystem {
    pub fn epsg(&self) -> u32 {
        match self {
            CoordinateSystem::Wgs84 => 4326,
            CoordinateSystem::WebMercator => 3857,
            CoordinateSystem::EuropeanLaea => 3035,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, CoordinateSystem::Wgs84)
    }

    /// Recognises a CRS from free text such as `EPSG:3857`,
    /// `urn:ogc:def:crs:EPSG::3035` or a file name containing the code.
    pub fn from_hint(text: &str) -> Option<Self> {
        if text.contains("3035") {
            Some(CoordinateSystem::EuropeanLaea)
        } else if text.contains("3857") || text.contains("900913") {
            Some(CoordinateSystem::WebMercator)
        } else if text.contains("4326") || text.contains("CRS84") {
            Some(CoordinateSystem::Wgs84)
        } else {
            None
        }
    }

    /// Projects a WGS84 position into this system.
    ///
    /// The LAEA path is a linear approximation, not a geodetic projection.
    pub fn from_wgs84(&self, lng: f64, lat: f64) -> (f64, f64) {
        match self {
            CoordinateSystem::Wgs84 => (lng, lat),
            CoordinateSystem::WebMercator => {
                let x = lng * MERCATOR_HALF_EXTENT / 180.0;
                let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
                (x, y * MERCATOR_HALF_EXTENT / 180.0)
            }
            CoordinateSystem::EuropeanLaea => (
                LAEA_X0 + lng * LAEA_X_PER_DEG,
                LAEA_Y0 + lat * LAEA_Y_PER_DEG,
            ),
        }
    }

    /// Inverse of [`from_wgs84`](Self::from_wgs84).
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            CoordinateSystem::Wgs84 => (x, y),
            CoordinateSystem::WebMercator => {
                let lng = x * 180.0 / MERCATOR_HALF_EXTENT;
                let lat = y * 180.0 / MERCATOR_HALF_EXTENT;
                let lat = (180.0 / PI) * (2.0 * (lat * PI / 180.0).exp().atan() - PI / 2.0);
                (lng, lat)
            }
            CoordinateSystem::EuropeanLaea => (
                (x - LAEA_X0) / LAEA_X_PER_DEG,
                (y - LAEA_Y0) / LAEA_Y_PER_DEG,
            ),
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for CoordinateSystem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wgs84" => Ok(CoordinateSystem::Wgs84),
            "web-mercator" | "webmercator" => Ok(CoordinateSystem::WebMercator),
            "european-laea" | "laea" => Ok(CoordinateSystem::EuropeanLaea),
            other => CoordinateSystem::from_hint(other)
                .ok_or_else(|| anyhow::anyhow!("Unknown coordinate system '{s}'")),
        }
    }
}
