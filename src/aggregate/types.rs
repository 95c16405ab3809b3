//! Data types shared by the binning and aggregation stages.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Region id to the point values assigned to it.
///
/// Every known region is present, possibly with an empty vector.
pub type Bucket = BTreeMap<String, Vec<f64>>;

/// Region id to its reduced value.
pub type RegionSummary = BTreeMap<String, Intensity>;

/// A per-region statistic, or an explicit absence of data.
///
/// `NoData` serialises as `null` and is never treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Intensity {
    Value(f64),
    #[default]
    NoData,
}

impl Intensity {
    pub fn value(&self) -> Option<f64> {
        match self {
            Intensity::Value(v) => Some(*v),
            Intensity::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Intensity::NoData)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Intensity::Value(v) => serde_json::json!(v),
            Intensity::NoData => serde_json::Value::Null,
        }
    }
}

impl Serialize for Intensity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Intensity::Value(v) => serializer.serialize_f64(*v),
            Intensity::NoData => serializer.serialize_none(),
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intensity::Value(v) => write!(f, "{v:.2}"),
            Intensity::NoData => f.write_str("No data"),
        }
    }
}
