use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::aggregate::types::Intensity;

/// Fill colour for regions without data.
pub const NO_DATA_COLOR: &str = "#CCCCCC";

/// Legend scales for choropleth fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorScale {
    /// Sequential yellow to dark red for non-negative intensities.
    Intensity,
    /// Diverging blue to red centred on 0 degrees Celsius.
    Temperature,
}

impl ColorScale {
    /// Converts an intensity into a hex fill colour.
    ///
    /// Intensity scale, value strictly greater than the bound:
    ///
    /// | Bound | Colour  |
    /// |-------|---------|
    /// | 80    | #800026 |
    /// | 60    | #BD0026 |
    /// | 40    | #E31A1C |
    /// | 20    | #FC4E2A |
    /// | 10    | #FD8D3C |
    /// | 5     | #FEB24C |
    /// | 0     | #FED976 |
    /// | else  | #FFEDA0 |
    ///
    /// Temperature scale uses inclusive bounds from 14 down to -14 in steps of 2.
    pub fn color(&self, intensity: Intensity) -> &'static str {
        let Some(v) = intensity.value() else {
            return NO_DATA_COLOR;
        };

        match self {
            ColorScale::Intensity => match v {
                v if v > 80.0 => "#800026",
                v if v > 60.0 => "#BD0026",
                v if v > 40.0 => "#E31A1C",
                v if v > 20.0 => "#FC4E2A",
                v if v > 10.0 => "#FD8D3C",
                v if v > 5.0 => "#FEB24C",
                v if v > 0.0 => "#FED976",
                _ => "#FFEDA0",
            },
            ColorScale::Temperature => match v {
                v if v >= 14.0 => "#800026",
                v if v >= 12.0 => "#BD0026",
                v if v >= 10.0 => "#E31A1C",
                v if v >= 8.0 => "#FC4E2A",
                v if v >= 6.0 => "#FD8D3C",
                v if v >= 4.0 => "#FEB24C",
                v if v >= 2.0 => "#FED976",
                v if v >= 0.0 => "#FFEDA0",
                v if v >= -2.0 => "#EFF3FF",
                v if v >= -4.0 => "#C6DBEF",
                v if v >= -6.0 => "#9ECAE1",
                v if v >= -8.0 => "#6BAED6",
                v if v >= -10.0 => "#4292C6",
                v if v >= -12.0 => "#2171B5",
                v if v >= -14.0 => "#08519C",
                _ => "#08306B",
            },
        }
    }
}

impl FromStr for ColorScale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intensity" => Ok(ColorScale::Intensity),
            "temperature" => Ok(ColorScale::Temperature),
            other => Err(anyhow::anyhow!("Unknown colour scale '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_boundaries() {
        let c = |v| ColorScale::Intensity.color(Intensity::Value(v));
        assert_eq!(c(100.0), "#800026");
        assert_eq!(c(80.0), "#BD0026");
        assert_eq!(c(20.5), "#FC4E2A");
        assert_eq!(c(5.0), "#FED976");
        assert_eq!(c(0.0), "#FFEDA0");
        assert_eq!(c(-3.0), "#FFEDA0");
    }

    #[test]
    fn test_temperature_boundaries() {
        let c = |v| ColorScale::Temperature.color(Intensity::Value(v));
        assert_eq!(c(14.0), "#800026");
        assert_eq!(c(0.0), "#FFEDA0");
        assert_eq!(c(-0.1), "#EFF3FF");
        assert_eq!(c(-14.0), "#08519C");
        assert_eq!(c(-30.0), "#08306B");
    }

    #[test]
    fn test_no_data_is_grey_not_zero_colour() {
        assert_eq!(ColorScale::Intensity.color(Intensity::NoData), NO_DATA_COLOR);
        assert_ne!(ColorScale::Temperature.color(Intensity::NoData), ColorScale::Temperature.color(Intensity::Value(0.0)));
    }
}
