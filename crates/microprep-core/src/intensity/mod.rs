//! Intensity sampling and z-score parameter aggregation
//!
//! Pixel intensities are block-sampled per frame (bounded, not exhaustive)
//! and aggregated into robust per-scope normalization parameters: the median
//! and the inter-quartile range, which tolerate masked and background pixels
//! far better than mean/stdev.

mod sample;
mod zscore;

pub use sample::{sample_block_medians, sample_dataset, IntensityRecord, IntensityTable};
pub use zscore::{compute_zscore_params, percentile};
