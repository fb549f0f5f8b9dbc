//! Error taxonomy for the preprocessing pipeline.
//!
//! All validation errors are raised before any expensive work begins, and a
//! failing worker job aborts its whole phase: a partially tiled channel would
//! silently break cross-channel alignment, so there is no per-item skipping
//! and no automatic retry.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    /// An explicitly requested index does not exist anywhere in the metadata
    /// table for its dimension.
    #[error("requested {dim} index {index} not found in metadata")]
    IndexNotFound { dim: &'static str, index: u32 },

    /// A uniform dataset structure was asserted but the metadata enumerates
    /// different positions/slices for different (time, channel) pairs.
    #[error("dataset structure is not uniform: {0}")]
    StructureMismatch(String),

    /// Thresholding input was degenerate (e.g. a constant image makes Otsu
    /// ill-defined). The caller decides whether to skip or abort; no default
    /// mask is substituted.
    #[error("mask computation failed: {0}")]
    MaskComputation(String),

    /// The target tile directory already holds a consolidated metadata table.
    /// Tiling into an existing tile set would mix inconsistent tile grids.
    #[error("tile directory {} already contains a metadata table", .0.display())]
    TileDirectoryConflict(PathBuf),

    /// Target/prediction/mask arrays disagree in shape.
    #[error("shape or dtype mismatch: {0}")]
    ShapeOrDtypeMismatch(String),

    /// A file name did not match the configured naming scheme.
    #[error("cannot parse file name {0:?}")]
    NameParse(String),

    /// Image decode/encode failure, wrapping the codec message.
    #[error("image I/O failed for {}: {message}", path.display())]
    Image { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PreprocessError {
    pub(crate) fn image<P: Into<PathBuf>, M: ToString>(path: P, message: M) -> Self {
        PreprocessError::Image {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
