use std::path::PathBuf;

use microprep_core::intensity::IntensityTable;
use microprep_core::masks::{MaskConfig, MaskGenerator};
use microprep_core::models::{IndexSelection, MaskKind};
use microprep_core::JobRunner;

#[allow(clippy::too_many_arguments)]
pub fn cmd_mask(
    input: PathBuf,
    output: PathBuf,
    channels: IndexSelection,
    times: IndexSelection,
    slices: IndexSelection,
    positions: IndexSelection,
    uniform: bool,
    kind: MaskKind,
    str_elem_radius: u32,
    flat_field: Option<PathBuf>,
    mask_channel: Option<u32>,
) -> Result<(), String> {
    // The dataset-level policy thresholds over previously sampled
    // intensities; the per-image policies need no samples
    let intensity = if kind == MaskKind::DatasetOtsu {
        Some(IntensityTable::read_dir(&input).map_err(|e| {
            format!("reading intensity samples (run `microprep stats` first): {e}")
        })?)
    } else {
        None
    };

    let config = MaskConfig {
        kind,
        str_elem_radius,
        flat_field_dir: flat_field,
        mask_channel,
    };
    let generator = MaskGenerator::new(
        &input,
        &output,
        &channels,
        &times,
        &slices,
        &positions,
        uniform,
        config,
        intensity.as_ref(),
    )
    .map_err(|e| e.to_string())?;

    println!(
        "Generating {:?} masks as channel {} into {}...",
        kind,
        generator.mask_channel(),
        generator.mask_dir().display()
    );
    let (masks, _) = generator
        .generate(JobRunner::default())
        .map_err(|e| e.to_string())?;
    println!("Done! {} masks written", masks.len());
    Ok(())
}
