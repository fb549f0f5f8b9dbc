//! Block-sampled intensity records.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::PreprocessError;
use crate::exec::JobRunner;
use crate::image::{read_frame, Frame};
use crate::models::FrameRecord;
use crate::{FrameTable, INTENSITY_META_NAME};

/// One sampled intensity value, carrying the owning frame's identity so
/// aggregation can group by any scope, plus the frame's foreground fraction
/// for downstream filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityRecord {
    pub dir_name: String,
    pub time_idx: u32,
    pub channel_idx: u32,
    pub slice_idx: u32,
    pub pos_idx: u32,
    pub intensity: f32,
    #[serde(default)]
    pub fg_frac: Option<f64>,
}

/// Ordered table of intensity samples with CSV persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensityTable {
    records: Vec<IntensityRecord>,
}

impl IntensityTable {
    pub fn from_records(records: Vec<IntensityRecord>) -> Self {
        IntensityTable { records }
    }

    pub fn records(&self) -> &[IntensityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load from `dir/intensity_meta.csv`.
    pub fn read_dir<P: AsRef<Path>>(dir: P) -> Result<Self, PreprocessError> {
        let mut reader = csv::Reader::from_path(dir.as_ref().join(INTENSITY_META_NAME))?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(IntensityTable { records })
    }

    /// Persist to `dir/intensity_meta.csv`.
    pub fn write_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(), PreprocessError> {
        let mut writer = csv::Writer::from_path(dir.as_ref().join(INTENSITY_META_NAME))?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Sample one frame as the median of each `block_size` x `block_size` block.
/// Partial edge blocks are included so small frames still contribute.
pub fn sample_block_medians(frame: &Frame, block_size: u32) -> Vec<f32> {
    let block = block_size.max(1);
    let mut samples = Vec::new();
    let mut row = 0;
    while row < frame.height() {
        let block_height = block.min(frame.height() - row);
        let mut col = 0;
        while col < frame.width() {
            let block_width = block.min(frame.width() - col);
            let mut values = Vec::with_capacity((block_height * block_width) as usize);
            for r in row..row + block_height {
                for c in col..col + block_width {
                    values.push(frame.get(r, c));
                }
            }
            values.sort_by(|a, b| a.total_cmp(b));
            samples.push(values[values.len() / 2]);
            col += block;
        }
        row += block;
    }
    samples
}

/// Sample every frame in the table, one job per frame.
pub fn sample_dataset(
    table: &FrameTable,
    block_size: u32,
    runner: JobRunner,
) -> Result<IntensityTable, PreprocessError> {
    let args: Vec<FrameRecord> = table.records().to_vec();
    let per_frame = runner.run_batch(args, |record| {
        let path = Path::new(&record.dir_name).join(&record.file_name);
        let frame = read_frame(&path)?;
        let samples = sample_block_medians(&frame, block_size);
        Ok(samples
            .into_iter()
            .map(|intensity| IntensityRecord {
                dir_name: record.dir_name.clone(),
                time_idx: record.time_idx,
                channel_idx: record.channel_idx,
                slice_idx: record.slice_idx,
                pos_idx: record.pos_idx,
                intensity,
                fg_frac: record.fg_frac,
            })
            .collect::<Vec<_>>())
    })?;
    Ok(IntensityTable::from_records(
        per_frame.into_iter().flatten().collect(),
    ))
}
