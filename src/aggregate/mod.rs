//! Binning of points into regions and reduction to per-region values.
//!
//! [`binner`] fills a [`Bucket`](types::Bucket) by point-in-polygon tests,
//! [`median`] reduces it to a [`RegionSummary`](types::RegionSummary), and
//! [`scale`] maps summary values to legend colours.

pub mod binner;
pub mod median;
pub mod scale;
pub mod types;
