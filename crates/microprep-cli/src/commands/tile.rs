use std::collections::BTreeMap;
use std::path::PathBuf;

use microprep_core::models::{IndexSelection, TilingConfig};
use microprep_core::{JobRunner, Tiler};

#[allow(clippy::too_many_arguments)]
pub fn cmd_tile(
    input: PathBuf,
    output: PathBuf,
    channels: IndexSelection,
    times: IndexSelection,
    slices: IndexSelection,
    positions: IndexSelection,
    tile_size: (u32, u32),
    step_size: (u32, u32),
    depths: BTreeMap<u32, u32>,
    default_depth: u32,
    tile_3d: bool,
    min_fraction: Option<f64>,
    flat_field: Option<PathBuf>,
    mask_dir: Option<PathBuf>,
    mask_channel: Option<u32>,
    mask_depth: u32,
) -> Result<(), String> {
    let mut config = TilingConfig::new(tile_size, step_size);
    config.channel_depths = depths;
    config.default_depth = default_depth;
    config.tile_3d = tile_3d;
    config.min_fraction = min_fraction;

    let tiler = Tiler::new(
        &input,
        &output,
        config,
        &channels,
        &times,
        &slices,
        &positions,
        flat_field,
        JobRunner::default(),
    )
    .map_err(|e| e.to_string())?;
    println!("Tiling into {}...", tiler.tile_dir().display());

    let tiles = match mask_dir {
        Some(mask_dir) => {
            let mask_channel =
                mask_channel.ok_or("--mask-channel is required with --mask-dir")?;
            tiler
                .tile_mask_stack(&mask_dir, mask_channel, mask_depth)
                .map_err(|e| e.to_string())?
        }
        None => tiler.tile_stack().map_err(|e| e.to_string())?,
    };
    println!("Done! {} tiles written", tiles.len());
    Ok(())
}
