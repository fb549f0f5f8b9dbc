use std::path::PathBuf;

use microprep_core::naming::{scan_frames_meta, NameScheme};

/// Scan a dataset directory and write its `frames_meta.csv`.
pub fn cmd_meta(input: PathBuf, scheme: NameScheme) -> Result<(), String> {
    println!("Scanning {} for frames...", input.display());

    let table = scan_frames_meta(&input, scheme).map_err(|e| e.to_string())?;
    if table.is_empty() {
        return Err(format!("no image files found in {}", input.display()));
    }
    table.write_dir(&input).map_err(|e| e.to_string())?;

    println!(
        "Indexed {} frames: {} times, {} channels, {} slices, {} positions",
        table.len(),
        table.unique_times().len(),
        table.unique_channels().len(),
        table.unique_slices().len(),
        table.unique_positions().len()
    );
    Ok(())
}
