//! Scenario tests for the tile-correspondence engine, run against synthetic
//! datasets on disk with the serial job runner.

use std::collections::BTreeSet;
use std::path::Path;

use tempfile::TempDir;

use super::*;
use crate::models::FrameRecord;
use crate::naming::frame_name;

/// Add one constant-valued frame to the dataset and its metadata table.
fn add_frame(
    dir: &Path,
    table: &mut FrameTable,
    time_idx: u32,
    channel_idx: u32,
    slice_idx: u32,
    pos_idx: u32,
    size: u32,
    value: f32,
) {
    let file_name = frame_name(channel_idx, slice_idx, time_idx, pos_idx, ".png");
    write_frame(dir.join(&file_name), &Frame::filled(size, size, value)).unwrap();
    table.push(FrameRecord {
        dir_name: dir.to_string_lossy().into_owned(),
        time_idx,
        channel_idx,
        slice_idx,
        pos_idx,
        file_name,
        fg_frac: None,
        zscore_median: None,
        zscore_iqr: None,
    });
}

fn tiler(input: &Path, output: &Path, config: TilingConfig, channels: IndexSelection) -> Tiler {
    Tiler::new(
        input,
        output,
        config,
        &channels,
        &IndexSelection::All,
        &IndexSelection::All,
        &IndexSelection::All,
        None,
        JobRunner::Serial,
    )
    .unwrap()
}

#[test]
fn reference_grid_covers_the_frame() {
    // 256x256 frame, 128x128 tiles, step 64: 3x3 = 9 tiles per slice
    let dir = TempDir::new().unwrap();
    let mut table = FrameTable::new();
    add_frame(dir.path(), &mut table, 0, 0, 0, 0, 256, 50.0);
    table.write_dir(dir.path()).unwrap();

    let engine = tiler(
        dir.path(),
        dir.path(),
        TilingConfig::new((128, 128), (64, 64)),
        IndexSelection::All,
    );
    assert!(engine
        .tile_dir()
        .to_string_lossy()
        .ends_with("tiles_128-128_step_64-64"));

    let tiles = engine.tile_stack().unwrap();
    assert_eq!(tiles.len(), 9);
    for record in tiles.records() {
        assert!(Path::new(&record.dir_name).join(&record.file_name).exists());
    }
    // Consolidated table persisted and reloadable
    let reloaded = TileTable::read_dir(engine.tile_dir()).unwrap();
    assert_eq!(reloaded, tiles);
}

#[test]
fn tile_directory_conflict_aborts_before_any_work() {
    let dir = TempDir::new().unwrap();
    let mut table = FrameTable::new();
    add_frame(dir.path(), &mut table, 0, 0, 0, 0, 64, 1.0);
    table.write_dir(dir.path()).unwrap();

    let config = TilingConfig::new((32, 32), (32, 32));
    let engine = tiler(dir.path(), dir.path(), config.clone(), IndexSelection::All);
    engine.tile_stack().unwrap();

    let err = Tiler::new(
        dir.path(),
        dir.path(),
        config,
        &IndexSelection::All,
        &IndexSelection::All,
        &IndexSelection::All,
        &IndexSelection::All,
        None,
        JobRunner::Serial,
    )
    .unwrap_err();
    assert!(matches!(err, PreprocessError::TileDirectoryConflict(_)));
}

#[test]
fn propagation_reuses_reference_origins_and_skips_missing_keys() {
    // Non-uniform dataset: channel 0 has slices {0,1,2} at pos 0; channel 1
    // has slices {0,1} at pos 0 plus a pos 1 the reference never saw
    let dir = TempDir::new().unwrap();
    let mut table = FrameTable::new();
    for slice_idx in 0..3 {
        add_frame(dir.path(), &mut table, 0, 0, slice_idx, 0, 64, 10.0);
    }
    for slice_idx in 0..2 {
        add_frame(dir.path(), &mut table, 0, 1, slice_idx, 0, 64, 20.0);
    }
    add_frame(dir.path(), &mut table, 0, 1, 0, 1, 64, 30.0);
    table.write_dir(dir.path()).unwrap();

    let engine = tiler(
        dir.path(),
        dir.path(),
        TilingConfig::new((32, 32), (32, 32)),
        IndexSelection::List(vec![0, 1]),
    );
    let tiles = engine.tile_stack().unwrap();

    // Reference: 3 slices x 4 tiles; channel 1: only slices {0,1} at pos 0
    let ch0: Vec<_> = tiles.records().iter().filter(|r| r.channel_idx == 0).collect();
    let ch1: Vec<_> = tiles.records().iter().filter(|r| r.channel_idx == 1).collect();
    assert_eq!(ch0.len(), 12);
    assert_eq!(ch1.len(), 8);
    assert!(ch1.iter().all(|r| r.slice_idx < 2));
    // Nothing fabricated for the position the reference never tiled
    assert!(ch1.iter().all(|r| r.pos_idx == 0));

    // Every propagated origin matches a reference origin at the same key
    for record in &ch1 {
        let reference: BTreeSet<_> = tiles
            .coords_at(record.time_idx, 0, record.pos_idx, record.slice_idx)
            .into_iter()
            .collect();
        assert!(reference.contains(&(record.row_start, record.col_start)));
    }

    // Tile pixels come from the propagated channel, at the reference origin
    let sample = tiles
        .records()
        .iter()
        .find(|r| r.channel_idx == 1 && r.row_start == 32 && r.col_start == 0)
        .unwrap();
    let tile = read_frame(Path::new(&sample.dir_name).join(&sample.file_name)).unwrap();
    assert!(tile.data().iter().all(|&v| v == 20.0));
}

#[test]
fn depth_margins_are_per_channel() {
    // Channel 0 tiles at depth 1 (all slices); channel 1 stacks depth 3
    let dir = TempDir::new().unwrap();
    let mut table = FrameTable::new();
    for channel_idx in 0..2 {
        for slice_idx in 0..5 {
            add_frame(dir.path(), &mut table, 0, channel_idx, slice_idx, 0, 32, 5.0);
        }
    }
    table.write_dir(dir.path()).unwrap();

    let mut config = TilingConfig::new((32, 32), (32, 32));
    config.channel_depths.insert(1, 3);
    let engine = tiler(dir.path(), dir.path(), config, IndexSelection::List(vec![0, 1]));
    let tiles = engine.tile_stack().unwrap();

    let ch0_slices: BTreeSet<u32> = tiles
        .records()
        .iter()
        .filter(|r| r.channel_idx == 0)
        .map(|r| r.slice_idx)
        .collect();
    let ch1_slices: BTreeSet<u32> = tiles
        .records()
        .iter()
        .filter(|r| r.channel_idx == 1)
        .map(|r| r.slice_idx)
        .collect();
    assert_eq!(ch0_slices, BTreeSet::from([0, 1, 2, 3, 4]));
    assert_eq!(ch1_slices, BTreeSet::from([1, 2, 3]));
    // Depth stacks are written as multi-page TIFF
    assert!(tiles
        .records()
        .iter()
        .filter(|r| r.channel_idx == 1)
        .all(|r| r.file_name.ends_with(".tif")));
}

#[test]
fn mask_tiling_filters_low_foreground_origins_for_every_channel() {
    let dir = TempDir::new().unwrap();
    let size = 64;

    // Two image channels
    let mut table = FrameTable::new();
    add_frame(dir.path(), &mut table, 0, 0, 0, 0, size, 10.0);
    add_frame(dir.path(), &mut table, 0, 1, 0, 0, size, 20.0);
    table.write_dir(dir.path()).unwrap();

    // Mask channel 2: foreground only in the top-left 32x32 quarter
    let mask_dir = TempDir::new().unwrap();
    let mut mask = Frame::filled(size, size, 0.0);
    for row in 0..32 {
        for col in 0..32 {
            mask.set(row, col, u16::MAX as f32);
        }
    }
    let mask_name = frame_name(2, 0, 0, 0, ".png");
    write_frame(mask_dir.path().join(&mask_name), &mask).unwrap();
    let mut mask_table = FrameTable::new();
    mask_table.push(FrameRecord {
        dir_name: mask_dir.path().to_string_lossy().into_owned(),
        time_idx: 0,
        channel_idx: 2,
        slice_idx: 0,
        pos_idx: 0,
        file_name: mask_name,
        fg_frac: Some(0.25),
        zscore_median: None,
        zscore_iqr: None,
    });
    mask_table.write_dir(mask_dir.path()).unwrap();

    let mut config = TilingConfig::new((32, 32), (32, 32));
    config.min_fraction = Some(0.3);
    let engine = tiler(
        dir.path(),
        dir.path(),
        config,
        IndexSelection::List(vec![0, 1]),
    );
    let tiles = engine.tile_mask_stack(mask_dir.path(), 2, 1).unwrap();

    // Of the 4 grid origins only (0,0) clears min_fraction 0.3; the three
    // discarded origins are not propagated to any channel
    let mask_tiles: Vec<_> = tiles.records().iter().filter(|r| r.channel_idx == 2).collect();
    assert_eq!(mask_tiles.len(), 1);
    assert_eq!((mask_tiles[0].row_start, mask_tiles[0].col_start), (0, 0));
    for channel_idx in 0..2 {
        let channel_tiles: Vec<_> = tiles
            .records()
            .iter()
            .filter(|r| r.channel_idx == channel_idx)
            .collect();
        assert_eq!(channel_tiles.len(), 1);
        assert_eq!(
            (channel_tiles[0].row_start, channel_tiles[0].col_start),
            (0, 0)
        );
    }
}

#[test]
fn mask_depth_cannot_exceed_channel_depths() {
    let dir = TempDir::new().unwrap();
    let mut table = FrameTable::new();
    add_frame(dir.path(), &mut table, 0, 0, 0, 0, 32, 1.0);
    table.write_dir(dir.path()).unwrap();

    let engine = tiler(
        dir.path(),
        dir.path(),
        TilingConfig::new((32, 32), (32, 32)),
        IndexSelection::All,
    );
    let err = engine
        .tile_mask_stack(dir.path(), 1, 3)
        .unwrap_err();
    assert!(matches!(err, PreprocessError::ShapeOrDtypeMismatch(_)));
}

#[test]
fn consolidated_table_is_sorted_by_file_name() {
    let dir = TempDir::new().unwrap();
    let mut table = FrameTable::new();
    for channel_idx in 0..2 {
        add_frame(dir.path(), &mut table, 0, channel_idx, 0, 0, 64, 1.0);
    }
    table.write_dir(dir.path()).unwrap();

    let engine = tiler(
        dir.path(),
        dir.path(),
        TilingConfig::new((32, 32), (32, 32)),
        IndexSelection::List(vec![1, 0]),
    );
    let tiles = engine.tile_stack().unwrap();
    let names: Vec<_> = tiles.records().iter().map(|r| r.file_name.clone()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    // Reference was channel 1 (first requested), yet channel 0 sorts first
    assert_eq!(tiles.records()[0].channel_idx, 0);
}
