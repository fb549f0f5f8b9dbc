//! Tile grid computation and slice-margin adjustment.

use crate::errors::PreprocessError;

/// Regular grid of tile origins for a frame of the given size.
///
/// Origins are `(i * step_h, j * step_w)` for every i, j whose tile fits
/// fully within the frame; no partial edge tiles are produced. For an H x W
/// frame the grid holds `(floor((H - th) / sh) + 1) * (floor((W - tw) / sw)
/// + 1)` origins.
pub fn tile_grid(
    height: u32,
    width: u32,
    tile_size: (u32, u32),
    step_size: (u32, u32),
) -> Vec<(u32, u32)> {
    let (tile_h, tile_w) = tile_size;
    let (step_h, step_w) = step_size;
    if tile_h == 0 || tile_w == 0 || step_h == 0 || step_w == 0 {
        return Vec::new();
    }
    if tile_h > height || tile_w > width {
        return Vec::new();
    }

    let mut origins = Vec::new();
    let mut row = 0;
    while row + tile_h <= height {
        let mut col = 0;
        while col + tile_w <= width {
            origins.push((row, col));
            col += step_w;
        }
        row += step_h;
    }
    origins
}

/// Drop candidate slices whose depth window would exceed the available
/// slice range: a stack of `depth` consecutive slices must exist centered at
/// each retained slice, so `depth / 2` slices are trimmed from each end.
///
/// The slice list must be contiguous and ascending; the margin policy is
/// meaningless on gapped ranges.
pub fn adjust_slice_margins(slices: &[u32], depth: u32) -> Result<Vec<u32>, PreprocessError> {
    for window in slices.windows(2) {
        if window[1] != window[0] + 1 {
            return Err(PreprocessError::StructureMismatch(format!(
                "slice indices are not contiguous around {}..{}",
                window[0], window[1]
            )));
        }
    }
    let margin = (depth / 2) as usize;
    if slices.len() < 2 * margin + 1 {
        return Ok(Vec::new());
    }
    Ok(slices[margin..slices.len() - margin].to_vec())
}
