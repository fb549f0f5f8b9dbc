use std::fs;
use std::path::{Path, PathBuf};

use microprep_core::image::{read_frame, Frame};
use microprep_core::metrics::{compute, MetricKind};
use microprep_core::naming::is_image_name;

/// Compare predictions against targets, pairing files by name, and write one
/// CSV row per pair.
pub fn cmd_metrics(
    target_dir: PathBuf,
    prediction_dir: PathBuf,
    kinds: Vec<MetricKind>,
    mask_dir: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<(), String> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(&prediction_dir).map_err(|e| e.to_string())? {
        let entry = entry.map_err(|e| e.to_string())?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_image_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    if names.is_empty() {
        return Err(format!("no images found in {}", prediction_dir.display()));
    }
    println!("Evaluating {} prediction(s)...", names.len());

    let out_path = out.unwrap_or_else(|| prediction_dir.join("metrics_meta.csv"));
    let mut writer = csv::Writer::from_path(&out_path).map_err(|e| e.to_string())?;
    let mut header = vec!["file_name".to_string()];
    for kind in &kinds {
        header.push(metric_label(*kind).to_string());
        if mask_dir.is_some() {
            header.push(format!("{}_masked", metric_label(*kind)));
        }
    }
    writer.write_record(&header).map_err(|e| e.to_string())?;

    for name in &names {
        let target = read_named(&target_dir, name)?;
        let prediction = read_named(&prediction_dir, name)?;
        let mask = match &mask_dir {
            Some(dir) => Some(read_named(dir, name)?),
            None => None,
        };

        let mut row = vec![name.clone()];
        for kind in &kinds {
            let value = compute(*kind, &target, &prediction, mask.as_ref())
                .map_err(|e| format!("{name}: {e}"))?;
            row.push(format!("{:.6}", value.value));
            if let Some(masked) = value.masked {
                row.push(format!("{masked:.6}"));
            }
        }
        writer.write_record(&row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;

    println!("Metrics written to {}", out_path.display());
    Ok(())
}

fn read_named(dir: &Path, name: &str) -> Result<Frame, String> {
    read_frame(dir.join(name)).map_err(|e| e.to_string())
}

fn metric_label(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Mse => "mse",
        MetricKind::Mae => "mae",
        MetricKind::RSquared => "r2",
        MetricKind::Pearson => "pearson",
    }
}
