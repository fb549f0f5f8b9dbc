//! Tile-correspondence engine
//!
//! Tiles a designated reference channel (an ordinary channel or a
//! precomputed mask), records every tile's origin, then reuses those exact
//! origins to cut matching tiles from every other channel. The reference
//! grid is the only grid ever computed, which is what guarantees
//! pixel-for-pixel alignment across channels even when the set of
//! (time, position, slice) combinations differs per channel.
//!
//! A run proceeds in two phases, each a batch of independent jobs:
//! 1. tile the reference channel/mask, collecting the authoritative origins
//! 2. propagate: for every remaining (time, channel, pos, slice) leaf, look
//!    up the reference origins at the matching (time, pos, slice) key and
//!    crop exactly those; leaves without reference tiles are skipped, never
//!    fabricated

mod grid;
mod table;

pub use grid::{adjust_slice_margins, tile_grid};
pub use table::TileTable;

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::errors::PreprocessError;
use crate::exec::JobRunner;
use crate::image::{correct_flat_field, read_frame, write_frame, write_stack, Frame};
use crate::meta::validate_indices;
use crate::models::{IndexSelection, TileRecord, TilingConfig};
use crate::naming::tile_name;
use crate::{FrameTable, IndexTree, FRAMES_META_NAME};

/// One reference-phase work item: tile the full grid of this frame stack.
struct RefTileArgs {
    time_idx: u32,
    channel_idx: u32,
    pos_idx: u32,
    slice_idx: u32,
}

/// One propagation work item: crop the given origins from this frame stack.
struct CropTileArgs {
    time_idx: u32,
    channel_idx: u32,
    pos_idx: u32,
    slice_idx: u32,
    coords: Vec<(u32, u32)>,
}

/// The tile-correspondence engine for one dataset and tiling configuration.
#[derive(Debug)]
pub struct Tiler {
    input_dir: PathBuf,
    tile_dir: PathBuf,
    config: TilingConfig,
    table: FrameTable,
    tree: IndexTree,
    channel_ids: Vec<u32>,
    time_sel: IndexSelection,
    slice_sel: IndexSelection,
    pos_sel: IndexSelection,
    flat_field_dir: Option<PathBuf>,
    runner: JobRunner,
}

impl Tiler {
    /// Validate the requested indices (non-uniform structure allowed),
    /// create the tile directory, and check the pre-flight guard: a tile
    /// directory that already holds a metadata table cannot be tiled into
    /// again, since mixing tile grids would corrupt correspondence.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_dir: &Path,
        output_dir: &Path,
        config: TilingConfig,
        channel_sel: &IndexSelection,
        time_sel: &IndexSelection,
        slice_sel: &IndexSelection,
        pos_sel: &IndexSelection,
        flat_field_dir: Option<PathBuf>,
        runner: JobRunner,
    ) -> Result<Self, PreprocessError> {
        let table = FrameTable::read_dir(input_dir)?;
        let (selected, tree) =
            validate_indices(&table, time_sel, channel_sel, slice_sel, pos_sel, false)?;

        let (tile_h, tile_w) = config.tile_size;
        let (step_h, step_w) = config.step_size;
        let tile_dir = output_dir.join(format!(
            "tiles_{}-{}_step_{}-{}",
            tile_h, tile_w, step_h, step_w
        ));
        fs::create_dir_all(&tile_dir)?;
        if tile_dir.join(FRAMES_META_NAME).exists() {
            return Err(PreprocessError::TileDirectoryConflict(tile_dir));
        }

        Ok(Tiler {
            input_dir: input_dir.to_path_buf(),
            tile_dir,
            config,
            table,
            tree,
            channel_ids: selected.channel_ids,
            time_sel: time_sel.clone(),
            slice_sel: slice_sel.clone(),
            pos_sel: pos_sel.clone(),
            flat_field_dir,
            runner,
        })
    }

    pub fn tile_dir(&self) -> &Path {
        &self.tile_dir
    }

    /// Tile the requested channels, using the first requested channel as the
    /// reference. Returns the consolidated tile table, persisted to the tile
    /// directory.
    pub fn tile_stack(&self) -> Result<TileTable, PreprocessError> {
        let reference_channel = self.channel_ids[0];
        let channel0_ids = self.tree.restrict_to_channel(reference_channel);
        let remaining_ids = self.tree.without_channel(reference_channel);

        let reference = self.tile_first_channel(
            &channel0_ids,
            self.config.depth(reference_channel),
            &self.table,
            &self.input_dir,
            false,
        )?;
        if remaining_ids.is_empty() {
            return Ok(reference);
        }
        self.tile_remaining_channels(&remaining_ids, reference_channel, reference)
    }

    /// Tile against precomputed masks: the mask channel is the reference and
    /// only tiles whose mask foreground fraction clears the configured
    /// minimum are kept, and only those origins are propagated.
    pub fn tile_mask_stack(
        &self,
        mask_dir: &Path,
        mask_channel: u32,
        mask_depth: u32,
    ) -> Result<TileTable, PreprocessError> {
        if mask_depth > self.config.max_depth(&self.channel_ids) {
            return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
                "mask depth {} exceeds the largest channel depth {}",
                mask_depth,
                self.config.max_depth(&self.channel_ids)
            )));
        }

        // Mask metadata lives in the mask directory, not the input dir
        let mask_table = FrameTable::read_dir(mask_dir)?;
        let (_, mask_tree) = validate_indices(
            &mask_table,
            &self.time_sel,
            &IndexSelection::One(mask_channel),
            &self.slice_sel,
            &self.pos_sel,
            false,
        )?;
        let mask_ids = mask_tree.restrict_to_channel(mask_channel);

        let reference =
            self.tile_first_channel(&mask_ids, mask_depth, &mask_table, mask_dir, true)?;
        self.tile_remaining_channels(&self.tree, mask_channel, reference)
    }

    /// Phase 1: tile the reference channel or mask over its full grid.
    fn tile_first_channel(
        &self,
        channel0_ids: &IndexTree,
        channel0_depth: u32,
        source_table: &FrameTable,
        source_dir: &Path,
        is_mask: bool,
    ) -> Result<TileTable, PreprocessError> {
        let mut args = Vec::new();
        for (time_idx, channel_idx, pos_idx, slices) in channel0_ids.leaves() {
            for slice_idx in adjust_slice_margins(slices, channel0_depth)? {
                args.push(RefTileArgs {
                    time_idx,
                    channel_idx,
                    pos_idx,
                    slice_idx,
                });
            }
        }
        info!(
            "tiling reference channel: {} frame stacks into {}",
            args.len(),
            self.tile_dir.display()
        );

        let min_fraction = if is_mask { self.config.min_fraction } else { None };
        let per_frame = self.runner.run_batch(args, |arg| {
            let stack = self.read_stack(
                source_table,
                source_dir,
                arg.time_idx,
                arg.channel_idx,
                arg.pos_idx,
                arg.slice_idx,
                channel0_depth,
                // Flat-field correction applies to image channels only
                !is_mask,
            )?;
            let origins = tile_grid(
                stack[0].height(),
                stack[0].width(),
                self.config.tile_size,
                self.config.step_size,
            );

            let mut records = Vec::new();
            for (row_start, col_start) in origins {
                let tile = self.crop_stack(&stack, row_start, col_start)?;
                if let Some(min_fraction) = min_fraction {
                    if stack_foreground_fraction(&tile) < min_fraction {
                        continue;
                    }
                }
                records.push(self.write_tile(&tile, &arg, row_start, col_start)?);
            }
            Ok(records)
        })?;

        let mut tiles = TileTable::from_records(per_frame.into_iter().flatten().collect());
        tiles.sort_by_file_name();
        tiles.write_dir(&self.tile_dir)?;
        Ok(tiles)
    }

    /// Phase 2: propagate the reference origins to the remaining channels.
    fn tile_remaining_channels(
        &self,
        remaining_ids: &IndexTree,
        reference_channel: u32,
        reference: TileTable,
    ) -> Result<TileTable, PreprocessError> {
        let mut args = Vec::new();
        for (time_idx, channel_idx, pos_idx, slices) in remaining_ids.leaves() {
            // Each channel trims its own depth margin; depths may differ
            for slice_idx in adjust_slice_margins(slices, self.config.depth(channel_idx))? {
                let coords =
                    reference.coords_at(time_idx, reference_channel, pos_idx, slice_idx);
                if coords.is_empty() {
                    // No reference tiles at this key: nothing is invented
                    continue;
                }
                args.push(CropTileArgs {
                    time_idx,
                    channel_idx,
                    pos_idx,
                    slice_idx,
                    coords,
                });
            }
        }
        info!("propagating tile origins to {} frame stacks", args.len());

        let per_frame = self.runner.run_batch(args, |arg| {
            let depth = self.config.depth(arg.channel_idx);
            let stack = self.read_stack(
                &self.table,
                &self.input_dir,
                arg.time_idx,
                arg.channel_idx,
                arg.pos_idx,
                arg.slice_idx,
                depth,
                true,
            )?;
            let ref_args = RefTileArgs {
                time_idx: arg.time_idx,
                channel_idx: arg.channel_idx,
                pos_idx: arg.pos_idx,
                slice_idx: arg.slice_idx,
            };
            let mut records = Vec::new();
            for &(row_start, col_start) in &arg.coords {
                let tile = self.crop_stack(&stack, row_start, col_start)?;
                records.push(self.write_tile(&tile, &ref_args, row_start, col_start)?);
            }
            Ok(records)
        })?;

        let mut tiles = reference;
        tiles.extend(TileTable::from_records(
            per_frame.into_iter().flatten().collect(),
        ));
        tiles.sort_by_file_name();
        tiles.write_dir(&self.tile_dir)?;
        Ok(tiles)
    }

    /// Read the depth window of slices centered at `slice_idx`.
    #[allow(clippy::too_many_arguments)]
    fn read_stack(
        &self,
        source_table: &FrameTable,
        source_dir: &Path,
        time_idx: u32,
        channel_idx: u32,
        pos_idx: u32,
        slice_idx: u32,
        depth: u32,
        apply_flat_field: bool,
    ) -> Result<Vec<Frame>, PreprocessError> {
        let margin = depth / 2;
        let first = slice_idx.checked_sub(margin).ok_or_else(|| {
            PreprocessError::StructureMismatch(format!(
                "slice {} cannot anchor a depth-{} stack",
                slice_idx, depth
            ))
        })?;

        let flat = match (&self.flat_field_dir, apply_flat_field) {
            (Some(dir), true) => Some(read_frame(
                dir.join(format!("flat-field_channel-{}.tif", channel_idx)),
            )?),
            _ => None,
        };

        let mut frames = Vec::with_capacity(depth as usize);
        for cur_slice in first..first + depth {
            let record = source_table
                .find(time_idx, channel_idx, cur_slice, pos_idx)
                .ok_or_else(|| {
                    PreprocessError::StructureMismatch(format!(
                        "channel {} has no frame at time {}, pos {}, slice {}",
                        channel_idx, time_idx, pos_idx, cur_slice
                    ))
                })?;
            let mut frame = read_frame(source_dir.join(&record.file_name))?;
            if let Some(flat) = &flat {
                frame = correct_flat_field(&frame, flat)?;
            }
            frames.push(frame);
        }
        Ok(frames)
    }

    fn crop_stack(
        &self,
        stack: &[Frame],
        row_start: u32,
        col_start: u32,
    ) -> Result<Vec<Frame>, PreprocessError> {
        let (tile_h, tile_w) = self.config.tile_size;
        stack
            .iter()
            .map(|frame| frame.crop(row_start, col_start, tile_h, tile_w))
            .collect()
    }

    /// Write one tile and produce its record. Single-slice tiles are 16-bit
    /// PNG; depth stacks and volumetric tiles are multi-page float TIFF.
    fn write_tile(
        &self,
        tile: &[Frame],
        arg: &RefTileArgs,
        row_start: u32,
        col_start: u32,
    ) -> Result<TileRecord, PreprocessError> {
        let ext = if tile.len() > 1 || self.config.tile_3d {
            ".tif"
        } else {
            ".png"
        };
        let file_name = tile_name(
            arg.channel_idx,
            arg.slice_idx,
            arg.time_idx,
            arg.pos_idx,
            row_start,
            col_start,
            ext,
        );
        let path = self.tile_dir.join(&file_name);
        if tile.len() > 1 || self.config.tile_3d {
            write_stack(&path, tile)?;
        } else {
            write_frame(&path, &tile[0])?;
        }
        Ok(TileRecord {
            dir_name: self.tile_dir.to_string_lossy().into_owned(),
            time_idx: arg.time_idx,
            channel_idx: arg.channel_idx,
            slice_idx: arg.slice_idx,
            pos_idx: arg.pos_idx,
            row_start,
            col_start,
            file_name,
        })
    }
}

/// Mean foreground indicator over all slices of a tile stack.
fn stack_foreground_fraction(tile: &[Frame]) -> f64 {
    if tile.is_empty() {
        return 0.0;
    }
    tile.iter().map(Frame::foreground_fraction).sum::<f64>() / tile.len() as f64
}

#[cfg(test)]
mod tests;
