//! Data models for microprep
//!
//! Core record types persisted to metadata tables, plus the closed strategy
//! enums that select masking and normalization policies at configuration
//! time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One physical 2-D image frame in a dataset.
///
/// Identity key is (dir_name, time_idx, channel_idx, slice_idx, pos_idx) and
/// must be unique within a metadata table. Derived columns (fg_frac and the
/// z-score parameters) are only ever added by merging on the identity key,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Directory the frame lives in
    pub dir_name: String,

    /// Time point index
    pub time_idx: u32,

    /// Acquisition channel index
    pub channel_idx: u32,

    /// Focal plane (z) index within the stack
    pub slice_idx: u32,

    /// Position (field of view) index
    pub pos_idx: u32,

    /// File name relative to `dir_name`
    pub file_name: String,

    /// Foreground fraction of the matching mask, merged back after masking
    #[serde(default)]
    pub fg_frac: Option<f64>,

    /// Robust center for z-scoring (median of sampled intensities)
    #[serde(default)]
    pub zscore_median: Option<f64>,

    /// Robust scale for z-scoring (inter-quartile range)
    #[serde(default)]
    pub zscore_iqr: Option<f64>,
}

impl FrameRecord {
    /// Identity key within a metadata table.
    pub fn key(&self) -> (&str, u32, u32, u32, u32) {
        (
            &self.dir_name,
            self.time_idx,
            self.channel_idx,
            self.slice_idx,
            self.pos_idx,
        )
    }
}

/// One generated mask, covering a (time, pos, slice) of the summed source
/// channels. Masks are assigned their own synthetic channel index so they can
/// be indexed like any other channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskRecord {
    pub dir_name: String,
    pub time_idx: u32,
    pub pos_idx: u32,
    pub slice_idx: u32,
    pub mask_channel_idx: u32,
    pub file_name: String,
    /// Mean foreground indicator over the mask
    pub fg_frac: f64,
}

impl MaskRecord {
    /// View the mask as a frame of its synthetic channel, so mask metadata
    /// tables can be validated and tiled like ordinary frame tables.
    pub fn to_frame_record(&self) -> FrameRecord {
        FrameRecord {
            dir_name: self.dir_name.clone(),
            time_idx: self.time_idx,
            channel_idx: self.mask_channel_idx,
            slice_idx: self.slice_idx,
            pos_idx: self.pos_idx,
            file_name: self.file_name.clone(),
            fg_frac: Some(self.fg_frac),
            zscore_median: None,
            zscore_iqr: None,
        }
    }
}

/// One tile cut from a frame (or frame stack) at a fixed spatial origin.
///
/// For a fixed (time, pos, slice) and tiling configuration, the set of
/// (row_start, col_start) origins recorded for the reference channel is
/// authoritative: every other channel reuses exactly that set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub dir_name: String,
    pub time_idx: u32,
    pub channel_idx: u32,
    pub slice_idx: u32,
    pub pos_idx: u32,
    pub row_start: u32,
    pub col_start: u32,
    pub file_name: String,
}

/// Requested indices along one metadata dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelection {
    /// Use every value present in the metadata table
    All,
    /// A single index
    One(u32),
    /// An explicit ordered set of indices
    List(Vec<u32>),
}

impl IndexSelection {
    /// Explicitly requested indices, or `None` for the all-values sentinel.
    pub fn requested(&self) -> Option<Vec<u32>> {
        match self {
            IndexSelection::All => None,
            IndexSelection::One(idx) => Some(vec![*idx]),
            IndexSelection::List(ids) => Some(ids.clone()),
        }
    }
}

impl Default for IndexSelection {
    fn default() -> Self {
        IndexSelection::All
    }
}

/// Mask generation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    /// Global Otsu threshold per summed image
    Otsu,
    /// Unimodal (Rosin) threshold per summed image
    Unimodal,
    /// One Otsu threshold per (directory, channel), computed once over
    /// sampled intensities and reused for every image in that scope
    DatasetOtsu,
    /// Per-pixel border weight map rather than a binary mask
    BordersWeightMap,
}

/// Scope over which z-score normalization parameters are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormScheme {
    /// No normalization: median 0, IQR 1 for every record
    None,
    /// Group by (directory, time, channel)
    Dataset,
    /// Group by (directory, time, channel, position)
    Volume,
    /// Group by (directory, time, channel, position, slice)
    Slice,
}

/// Immutable tiling configuration for one run of the tile engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Tile height and width in pixels
    pub tile_size: (u32, u32),

    /// Vertical and horizontal stride between tile origins
    pub step_size: (u32, u32),

    /// Number of consecutive slices stacked per tile, per channel.
    /// Channels not listed use `default_depth`.
    #[serde(default)]
    pub channel_depths: BTreeMap<u32, u32>,

    /// Depth for channels without an explicit entry in `channel_depths`
    #[serde(default = "default_depth")]
    pub default_depth: u32,

    /// Treat the stacked slices as one volumetric tile
    #[serde(default)]
    pub tile_3d: bool,

    /// Minimum foreground fraction for a tile to be retained when tiling
    /// against a mask. Discarded origins are not propagated to any channel.
    #[serde(default)]
    pub min_fraction: Option<f64>,
}

fn default_depth() -> u32 {
    1
}

impl TilingConfig {
    pub fn new(tile_size: (u32, u32), step_size: (u32, u32)) -> Self {
        TilingConfig {
            tile_size,
            step_size,
            channel_depths: BTreeMap::new(),
            default_depth: 1,
            tile_3d: false,
            min_fraction: None,
        }
    }

    /// Stack depth for `channel_idx`.
    pub fn depth(&self, channel_idx: u32) -> u32 {
        self.channel_depths
            .get(&channel_idx)
            .copied()
            .unwrap_or(self.default_depth)
    }

    /// Largest depth over the given channels.
    pub fn max_depth(&self, channel_ids: &[u32]) -> u32 {
        channel_ids
            .iter()
            .map(|&ch| self.depth(ch))
            .max()
            .unwrap_or(self.default_depth)
    }
}
