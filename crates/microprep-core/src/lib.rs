//! Microprep Core Library
//!
//! Prepares large, irregularly structured microscopy image collections for
//! model training: per-frame metadata tables, foreground masks, normalization
//! statistics, and spatially aligned tiles across channels.
//!
//! This crate is organized into the following modules:
//! - `meta`: frame metadata tables and index validation
//! - `naming`: file-name parsing and formatting schemes
//! - `image`: frame decode/encode and flat-field correction
//! - `threshold`: Otsu and unimodal threshold policies
//! - `masks`: foreground mask generation
//! - `intensity`: intensity sampling and z-score parameter aggregation
//! - `tiler`: the tile-correspondence engine
//! - `exec`: bounded batch job dispatch
//! - `metrics`: target/prediction evaluation metrics

pub mod errors;
pub mod exec;
pub mod image;
pub mod intensity;
pub mod masks;
pub mod meta;
pub mod metrics;
pub mod models;
pub mod naming;
pub mod threshold;
pub mod tiler;

// Re-export commonly used types
pub use errors::PreprocessError;
pub use exec::JobRunner;
pub use meta::{FrameTable, IndexTree, SelectedIndices};
pub use models::{
    FrameRecord, IndexSelection, MaskKind, MaskRecord, NormScheme, TileRecord, TilingConfig,
};
pub use tiler::Tiler;

/// File name of the per-directory frame metadata table.
pub const FRAMES_META_NAME: &str = "frames_meta.csv";

/// File name of the per-directory intensity sample table.
pub const INTENSITY_META_NAME: &str = "intensity_meta.csv";
