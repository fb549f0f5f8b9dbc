use std::path::PathBuf;

use microprep_core::intensity::{compute_zscore_params, sample_dataset};
use microprep_core::models::NormScheme;
use microprep_core::{FrameTable, JobRunner};

/// Block-sample pixel intensities and aggregate them into z-score
/// normalization parameters, both persisted next to the frames.
pub fn cmd_stats(
    input: PathBuf,
    block_size: u32,
    scheme: NormScheme,
    min_fraction: f64,
) -> Result<(), String> {
    let table = FrameTable::read_dir(&input).map_err(|e| e.to_string())?;
    println!(
        "Sampling {} frames with {}x{} blocks...",
        table.len(),
        block_size,
        block_size
    );

    let samples =
        sample_dataset(&table, block_size, JobRunner::default()).map_err(|e| e.to_string())?;
    samples.write_dir(&input).map_err(|e| e.to_string())?;
    println!("  {} intensity samples collected", samples.len());

    let merged = compute_zscore_params(&table, &samples, scheme, min_fraction);
    merged.write_dir(&input).map_err(|e| e.to_string())?;
    println!(
        "Normalization parameters ({:?} scope) written to {}",
        scheme,
        input.display()
    );
    Ok(())
}
