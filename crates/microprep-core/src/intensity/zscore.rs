//! Aggregation of intensity samples into per-scope z-score parameters.

use std::collections::BTreeMap;

use log::debug;

use super::{IntensityRecord, IntensityTable};
use crate::models::{FrameRecord, NormScheme};
use crate::FrameTable;

/// Grouping key for one normalization scope. Unused dimensions stay `None`
/// so the same key type serves all schemes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScopeKey {
    dir_name: String,
    time_idx: u32,
    channel_idx: u32,
    pos_idx: Option<u32>,
    slice_idx: Option<u32>,
}

impl ScopeKey {
    fn for_sample(record: &IntensityRecord, scheme: NormScheme) -> ScopeKey {
        ScopeKey::build(
            record.dir_name.clone(),
            record.time_idx,
            record.channel_idx,
            record.pos_idx,
            record.slice_idx,
            scheme,
        )
    }

    fn for_frame(record: &FrameRecord, scheme: NormScheme) -> ScopeKey {
        ScopeKey::build(
            record.dir_name.clone(),
            record.time_idx,
            record.channel_idx,
            record.pos_idx,
            record.slice_idx,
            scheme,
        )
    }

    fn build(
        dir_name: String,
        time_idx: u32,
        channel_idx: u32,
        pos_idx: u32,
        slice_idx: u32,
        scheme: NormScheme,
    ) -> ScopeKey {
        let (pos_idx, slice_idx) = match scheme {
            NormScheme::None | NormScheme::Dataset => (None, None),
            NormScheme::Volume => (Some(pos_idx), None),
            NormScheme::Slice => (Some(pos_idx), Some(slice_idx)),
        };
        ScopeKey {
            dir_name,
            time_idx,
            channel_idx,
            pos_idx,
            slice_idx,
        }
    }
}

/// Linear-interpolation percentile of a sorted slice, `q` in [0, 1].
pub fn percentile(sorted: &[f32], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] as f64 * (1.0 - weight) + sorted[upper] as f64 * weight
}

/// Aggregate samples into per-scope median and inter-quartile range, and
/// merge the parameters into the frame table by the scope's grouping columns.
///
/// Samples whose foreground fraction falls below `min_fraction` are dropped
/// before aggregation so background-dominated slices do not bias the
/// statistics. Rows with no matching scope keep their prior values
/// (left-merge semantics). With `NormScheme::None`, every record gets
/// median 0 and IQR 1 regardless of pixel content.
pub fn compute_zscore_params(
    frames: &FrameTable,
    samples: &IntensityTable,
    scheme: NormScheme,
    min_fraction: f64,
) -> FrameTable {
    if scheme == NormScheme::None {
        let records = frames
            .records()
            .iter()
            .map(|r| {
                let mut out = r.clone();
                out.zscore_median = Some(0.0);
                out.zscore_iqr = Some(1.0);
                out
            })
            .collect();
        return FrameTable::from_records(records);
    }

    let mut groups: BTreeMap<ScopeKey, Vec<f32>> = BTreeMap::new();
    for record in samples.records() {
        if record.fg_frac.unwrap_or(0.0) < min_fraction {
            continue;
        }
        groups
            .entry(ScopeKey::for_sample(record, scheme))
            .or_default()
            .push(record.intensity);
    }

    let mut params: BTreeMap<ScopeKey, (f64, f64)> = BTreeMap::new();
    for (key, mut values) in groups {
        values.sort_by(|a, b| a.total_cmp(b));
        let median = percentile(&values, 0.5);
        let iqr = percentile(&values, 0.75) - percentile(&values, 0.25);
        params.insert(key, (median, iqr));
    }
    debug!("aggregated z-score parameters for {} scopes", params.len());

    let records = frames
        .records()
        .iter()
        .map(|r| {
            let mut out = r.clone();
            if let Some(&(median, iqr)) = params.get(&ScopeKey::for_frame(r, scheme)) {
                out.zscore_median = Some(median);
                out.zscore_iqr = Some(iqr);
            }
            out
        })
        .collect();
    FrameTable::from_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_record(time: u32, channel: u32, slice: u32, pos: u32) -> FrameRecord {
        FrameRecord {
            dir_name: "input".to_string(),
            time_idx: time,
            channel_idx: channel,
            slice_idx: slice,
            pos_idx: pos,
            file_name: format!("im_c{:03}_z{:03}_t{:03}_p{:03}.png", channel, slice, time, pos),
            fg_frac: None,
            zscore_median: None,
            zscore_iqr: None,
        }
    }

    fn sample(channel: u32, slice: u32, intensity: f32, fg_frac: Option<f64>) -> IntensityRecord {
        IntensityRecord {
            dir_name: "input".to_string(),
            time_idx: 0,
            channel_idx: channel,
            slice_idx: slice,
            pos_idx: 0,
            intensity,
            fg_frac,
        }
    }

    #[test]
    fn none_scheme_writes_constants_to_every_record() {
        let frames = FrameTable::from_records(vec![
            frame_record(0, 0, 0, 0),
            frame_record(0, 1, 4, 2),
        ]);
        let samples = IntensityTable::from_records(vec![sample(0, 0, 999.0, None)]);
        let merged = compute_zscore_params(&frames, &samples, NormScheme::None, 0.0);
        for record in merged.records() {
            assert_eq!(record.zscore_median, Some(0.0));
            assert_eq!(record.zscore_iqr, Some(1.0));
        }
    }

    #[test]
    fn dataset_scheme_groups_by_channel() {
        let frames = FrameTable::from_records(vec![
            frame_record(0, 0, 0, 0),
            frame_record(0, 0, 1, 0),
        ]);
        let samples = IntensityTable::from_records(vec![
            sample(0, 0, 10.0, None),
            sample(0, 1, 20.0, None),
            sample(0, 0, 30.0, None),
        ]);
        let merged = compute_zscore_params(&frames, &samples, NormScheme::Dataset, 0.0);
        // Both slices share the dataset scope statistics
        assert_eq!(merged.records()[0].zscore_median, Some(20.0));
        assert_eq!(merged.records()[0].zscore_iqr, Some(10.0));
        assert_eq!(merged.records()[1].zscore_median, Some(20.0));
    }

    #[test]
    fn slice_scheme_keeps_slices_separate() {
        let frames = FrameTable::from_records(vec![
            frame_record(0, 0, 0, 0),
            frame_record(0, 0, 1, 0),
        ]);
        let samples = IntensityTable::from_records(vec![
            sample(0, 0, 10.0, None),
            sample(0, 1, 50.0, None),
        ]);
        let merged = compute_zscore_params(&frames, &samples, NormScheme::Slice, 0.0);
        assert_eq!(merged.records()[0].zscore_median, Some(10.0));
        assert_eq!(merged.records()[1].zscore_median, Some(50.0));
    }

    #[test]
    fn low_foreground_samples_are_filtered_out() {
        let frames = FrameTable::from_records(vec![frame_record(0, 0, 0, 0)]);
        let samples = IntensityTable::from_records(vec![
            sample(0, 0, 10.0, Some(0.9)),
            sample(0, 0, 1000.0, Some(0.01)),
        ]);
        let merged = compute_zscore_params(&frames, &samples, NormScheme::Dataset, 0.5);
        assert_eq!(merged.records()[0].zscore_median, Some(10.0));
    }

    #[test]
    fn unmatched_rows_keep_prior_values() {
        let mut stale = frame_record(0, 1, 0, 0);
        stale.zscore_median = Some(7.0);
        stale.zscore_iqr = Some(2.0);
        let frames = FrameTable::from_records(vec![stale]);
        // Samples only cover channel 0
        let samples = IntensityTable::from_records(vec![sample(0, 0, 10.0, None)]);
        let merged = compute_zscore_params(&frames, &samples, NormScheme::Dataset, 0.0);
        assert_eq!(merged.records()[0].zscore_median, Some(7.0));
        assert_eq!(merged.records()[0].zscore_iqr, Some(2.0));
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [0.0f32, 10.0];
        assert_eq!(percentile(&values, 0.25), 2.5);
        assert_eq!(percentile(&values, 0.5), 5.0);
    }
}
