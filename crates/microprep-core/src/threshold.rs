//! Threshold policies for foreground detection.
//!
//! Both policies operate on a 256-bin histogram of the input values and
//! return a cut point in intensity units. Degenerate input (constant or
//! empty) makes both ill-defined and fails with `MaskComputation`; callers
//! never get a silently substituted default.

use crate::errors::PreprocessError;

const HIST_BINS: usize = 256;

struct Histogram {
    counts: Vec<u64>,
    min: f32,
    bin_width: f32,
}

impl Histogram {
    fn bin_center(&self, bin: usize) -> f32 {
        self.min + (bin as f32 + 0.5) * self.bin_width
    }
}

fn build_histogram(values: &[f32]) -> Result<Histogram, PreprocessError> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &value in values {
        if value.is_finite() {
            min = min.min(value);
            max = max.max(value);
        }
    }
    if !min.is_finite() || !max.is_finite() || max <= min {
        return Err(PreprocessError::MaskComputation(
            "threshold input is empty or constant".to_string(),
        ));
    }

    let bin_width = (max - min) / HIST_BINS as f32;
    let mut counts = vec![0u64; HIST_BINS];
    for &value in values {
        if !value.is_finite() {
            continue;
        }
        let bin = (((value - min) / bin_width) as usize).min(HIST_BINS - 1);
        counts[bin] += 1;
    }
    Ok(Histogram {
        counts,
        min,
        bin_width,
    })
}

/// Otsu's method: the cut point maximizing between-class variance.
pub fn otsu_threshold(values: &[f32]) -> Result<f32, PreprocessError> {
    let hist = build_histogram(values)?;
    let total: u64 = hist.counts.iter().sum();

    let mut weighted_total = 0.0f64;
    for (bin, &count) in hist.counts.iter().enumerate() {
        weighted_total += bin as f64 * count as f64;
    }

    let mut background_count = 0u64;
    let mut background_sum = 0.0f64;
    let mut best_variance = f64::MIN;
    let mut best_bin = 0usize;
    for (bin, &count) in hist.counts.iter().enumerate() {
        background_count += count;
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }
        background_sum += bin as f64 * count as f64;

        let mean_background = background_sum / background_count as f64;
        let mean_foreground = (weighted_total - background_sum) / foreground_count as f64;
        let variance = background_count as f64
            * foreground_count as f64
            * (mean_background - mean_foreground).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_bin = bin;
        }
    }
    Ok(hist.bin_center(best_bin))
}

/// Unimodal (Rosin) threshold: the bin farthest from the line joining the
/// histogram peak to the last occupied bin. Suited to images dominated by a
/// single background mode with a sparse foreground tail.
pub fn unimodal_threshold(values: &[f32]) -> Result<f32, PreprocessError> {
    let hist = build_histogram(values)?;

    let (peak_bin, &peak_count) = hist
        .counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &count)| count)
        .ok_or_else(|| {
            PreprocessError::MaskComputation("threshold input is empty".to_string())
        })?;
    let last_bin = hist
        .counts
        .iter()
        .rposition(|&count| count > 0)
        .unwrap_or(peak_bin);
    if last_bin <= peak_bin {
        return Err(PreprocessError::MaskComputation(
            "histogram has no tail beyond its peak".to_string(),
        ));
    }

    // Perpendicular distance from each bin to the peak-to-tail chord
    let dx = (last_bin - peak_bin) as f64;
    let dy = 0.0 - peak_count as f64;
    let norm = (dx * dx + dy * dy).sqrt();
    let mut best_distance = f64::MIN;
    let mut best_bin = peak_bin;
    for bin in peak_bin..=last_bin {
        let px = (bin - peak_bin) as f64;
        let py = hist.counts[bin] as f64 - peak_count as f64;
        let distance = (px * dy - py * dx).abs() / norm;
        if distance > best_distance {
            best_distance = distance;
            best_bin = bin;
        }
    }
    Ok(hist.bin_center(best_bin))
}
