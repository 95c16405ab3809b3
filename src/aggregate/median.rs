use crate::aggregate::types::{Bucket, Intensity, RegionSummary};

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Median of `values`; the mean of the two middle values for even lengths.
///
/// An empty slice has no median and yields [`Intensity::NoData`].
pub fn median(values: &[f64]) -> Intensity {
    if values.is_empty() {
        return Intensity::NoData;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        Intensity::Value((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Intensity::Value(sorted[mid])
    }
}

/// Reduces every bucket entry to its median. Keys are preserved exactly.
pub fn summarize(bucket: &Bucket) -> RegionSummary {
    bucket
        .iter()
        .map(|(id, values)| (id.clone(), median(values)))
        .collect()
}
