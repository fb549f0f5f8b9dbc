//! Frame metadata table with CSV persistence and immutable merges.

use std::collections::BTreeSet;
use std::path::Path;

use crate::errors::PreprocessError;
use crate::models::{FrameRecord, MaskRecord};
use crate::FRAMES_META_NAME;

/// Ordered table of [`FrameRecord`] rows.
///
/// Derived columns are never assigned in place: merge operations return a new
/// table so the identity invariants stay auditable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTable {
    records: Vec<FrameRecord>,
}

impl FrameTable {
    pub fn new() -> Self {
        FrameTable::default()
    }

    pub fn from_records(records: Vec<FrameRecord>) -> Self {
        FrameTable { records }
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: FrameRecord) {
        self.records.push(record);
    }

    /// Load the table from `dir/frames_meta.csv`.
    pub fn read_dir<P: AsRef<Path>>(dir: P) -> Result<Self, PreprocessError> {
        Self::read_csv(dir.as_ref().join(FRAMES_META_NAME))
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self, PreprocessError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(FrameTable { records })
    }

    /// Persist the table to `dir/frames_meta.csv`.
    pub fn write_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(), PreprocessError> {
        self.write_csv(dir.as_ref().join(FRAMES_META_NAME))
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), PreprocessError> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Stable sort by file name, the canonical order of persisted tables.
    pub fn sort_by_file_name(&mut self) {
        self.records
            .sort_by(|a, b| a.file_name.cmp(&b.file_name));
    }

    /// Look up the frame at the given indices, ignoring `dir_name`.
    pub fn find(
        &self,
        time_idx: u32,
        channel_idx: u32,
        slice_idx: u32,
        pos_idx: u32,
    ) -> Option<&FrameRecord> {
        self.records.iter().find(|r| {
            r.time_idx == time_idx
                && r.channel_idx == channel_idx
                && r.slice_idx == slice_idx
                && r.pos_idx == pos_idx
        })
    }

    /// Highest channel index present, used to assign synthetic mask channels.
    pub fn max_channel_idx(&self) -> Option<u32> {
        self.records.iter().map(|r| r.channel_idx).max()
    }

    pub fn unique_times(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.time_idx).collect()
    }

    pub fn unique_channels(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.channel_idx).collect()
    }

    pub fn unique_slices(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.slice_idx).collect()
    }

    pub fn unique_positions(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.pos_idx).collect()
    }

    /// Merge mask foreground fractions into the table, keyed by
    /// (pos_idx, time_idx, slice_idx). Rows without a matching mask keep
    /// their prior value; matched rows have any stale fg_frac overwritten.
    pub fn merge_fg_frac(&self, masks: &[MaskRecord]) -> FrameTable {
        let records = self
            .records
            .iter()
            .map(|r| {
                let merged = masks.iter().find(|m| {
                    m.pos_idx == r.pos_idx
                        && m.time_idx == r.time_idx
                        && m.slice_idx == r.slice_idx
                });
                let mut out = r.clone();
                if let Some(mask) = merged {
                    out.fg_frac = Some(mask.fg_frac);
                }
                out
            })
            .collect();
        FrameTable { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time: u32, channel: u32, slice: u32, pos: u32) -> FrameRecord {
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

    #[test]
    fn csv_round_trip_preserves_identity_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = FrameTable::new();
        let mut with_stats = record(0, 1, 2, 3);
        with_stats.fg_frac = Some(0.25);
        with_stats.zscore_median = Some(101.5);
        with_stats.zscore_iqr = Some(12.0);
        table.push(with_stats);
        table.push(record(1, 0, 0, 0));
        table.write_dir(dir.path()).unwrap();

        let reloaded = FrameTable::read_dir(dir.path()).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn merge_fg_frac_is_left_merge() {
        let table = FrameTable::from_records(vec![record(0, 0, 0, 0), record(0, 0, 1, 0)]);
        let masks = vec![MaskRecord {
            dir_name: "masks".to_string(),
            time_idx: 0,
            pos_idx: 0,
            slice_idx: 0,
            mask_channel_idx: 2,
            file_name: "im_c002_z000_t000_p000.png".to_string(),
            fg_frac: 0.4,
        }];
        let merged = table.merge_fg_frac(&masks);
        assert_eq!(merged.records()[0].fg_frac, Some(0.4));
        // Unmatched slice keeps its prior (empty) value
        assert_eq!(merged.records()[1].fg_frac, None);
        // Source table untouched
        assert_eq!(table.records()[0].fg_frac, None);
    }

    #[test]
    fn max_channel_for_synthetic_mask_numbering() {
        let table = FrameTable::from_records(vec![record(0, 0, 0, 0), record(0, 3, 0, 0)]);
        assert_eq!(table.max_channel_idx(), Some(3));
    }
}
