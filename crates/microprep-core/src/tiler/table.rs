//! Consolidated tile metadata table.

use std::path::Path;

use crate::errors::PreprocessError;
use crate::models::TileRecord;
use crate::FRAMES_META_NAME;

/// Ordered table of [`TileRecord`] rows; the durable output of a tiling run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileTable {
    records: Vec<TileRecord>,
}

impl TileTable {
    pub fn from_records(records: Vec<TileRecord>) -> Self {
        TileTable { records }
    }

    pub fn records(&self) -> &[TileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append another table's records (phase concatenation).
    pub fn extend(&mut self, other: TileTable) {
        self.records.extend(other.records);
    }

    /// Stable sort by file name, restoring determinism after parallel
    /// collection.
    pub fn sort_by_file_name(&mut self) {
        self.records
            .sort_by(|a, b| a.file_name.cmp(&b.file_name));
    }

    /// The authoritative tile origins recorded for a channel at one
    /// (time, pos, slice) key. Empty if the channel has no tiles there.
    pub fn coords_at(
        &self,
        time_idx: u32,
        channel_idx: u32,
        pos_idx: u32,
        slice_idx: u32,
    ) -> Vec<(u32, u32)> {
        self.records
            .iter()
            .filter(|r| {
                r.time_idx == time_idx
                    && r.channel_idx == channel_idx
                    && r.pos_idx == pos_idx
                    && r.slice_idx == slice_idx
            })
            .map(|r| (r.row_start, r.col_start))
            .collect()
    }

    pub fn read_dir<P: AsRef<Path>>(dir: P) -> Result<Self, PreprocessError> {
        let mut reader = csv::Reader::from_path(dir.as_ref().join(FRAMES_META_NAME))?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(TileTable { records })
    }

    pub fn write_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(), PreprocessError> {
        let mut writer = csv::Writer::from_path(dir.as_ref().join(FRAMES_META_NAME))?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
