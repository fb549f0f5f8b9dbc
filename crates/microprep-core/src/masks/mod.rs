//! Foreground mask generation
//!
//! Masks are computed per (time, position, slice) from the sum of the
//! requested channels, thresholded by a selectable policy, cleaned up with a
//! morphological closing and opening, and written to a dedicated mask
//! directory with their own metadata table. The per-mask foreground fraction
//! is merged back into the source frame table.

mod morphology;
mod weight_map;

pub use morphology::{closing, dilate, erode, opening};
pub use weight_map::{borders_weight_map, distance_to_foreground};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::errors::PreprocessError;
use crate::exec::JobRunner;
use crate::image::{correct_flat_field, read_frame, write_frame, Frame};
use crate::intensity::IntensityTable;
use crate::meta::validate_indices;
use crate::models::{IndexSelection, MaskKind, MaskRecord};
use crate::naming::frame_name;
use crate::threshold::{otsu_threshold, unimodal_threshold};
use crate::{FrameTable, IndexTree};

/// Configuration for one mask-generation run.
#[derive(Debug, Clone)]
pub struct MaskConfig {
    pub kind: MaskKind,
    /// Radius of the disk structuring element for closing/opening
    pub str_elem_radius: u32,
    /// Directory with per-channel flat-field images, if correction applies
    pub flat_field_dir: Option<PathBuf>,
    /// Channel index assigned to the generated masks; defaults to
    /// max(existing channels) + 1
    pub mask_channel: Option<u32>,
}

impl Default for MaskConfig {
    fn default() -> Self {
        MaskConfig {
            kind: MaskKind::Otsu,
            str_elem_radius: 5,
            flat_field_dir: None,
            mask_channel: None,
        }
    }
}

/// Generates masks for a dataset and maintains the associated metadata.
pub struct MaskGenerator {
    input_dir: PathBuf,
    mask_dir: PathBuf,
    table: FrameTable,
    tree: IndexTree,
    channel_ids: Vec<u32>,
    mask_channel: u32,
    kind: MaskKind,
    str_elem_radius: u32,
    flat_field_dir: Option<PathBuf>,
    /// Per (dir_name, channel) thresholds for the dataset-otsu policy
    channel_thresholds: BTreeMap<(String, u32), f32>,
}

impl MaskGenerator {
    /// Validate indices, resolve the mask channel, and create the mask
    /// directory `<output_dir>/mask_channels_<ids-or-mask_channel>`.
    ///
    /// `intensity` is required for [`MaskKind::DatasetOtsu`]: its per-scope
    /// thresholds are computed here, once, and reused for every image.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_dir: &Path,
        output_dir: &Path,
        channel_sel: &IndexSelection,
        time_sel: &IndexSelection,
        slice_sel: &IndexSelection,
        pos_sel: &IndexSelection,
        uniform: bool,
        config: MaskConfig,
        intensity: Option<&IntensityTable>,
    ) -> Result<Self, PreprocessError> {
        let table = FrameTable::read_dir(input_dir)?;
        let (selected, tree) =
            validate_indices(&table, time_sel, channel_sel, slice_sel, pos_sel, uniform)?;
        let channel_ids = selected.channel_ids;
        if channel_ids.is_empty() {
            return Err(PreprocessError::MaskComputation(
                "no channels selected for masking".to_string(),
            ));
        }

        let mask_channel = match config.mask_channel {
            Some(channel) => channel,
            None => table.max_channel_idx().map(|c| c + 1).unwrap_or(0),
        };

        // Weighted border maps use the synthetic channel id in the directory
        // name; binary masks use the source channel list
        let dir_suffix = if config.kind == MaskKind::BordersWeightMap {
            mask_channel.to_string()
        } else {
            channel_ids
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("-")
        };
        let mask_dir = output_dir.join(format!("mask_channels_{}", dir_suffix));
        fs::create_dir_all(&mask_dir)?;

        let channel_thresholds = if config.kind == MaskKind::DatasetOtsu {
            let samples = intensity.ok_or_else(|| {
                PreprocessError::MaskComputation(
                    "dataset otsu requires an intensity sample table".to_string(),
                )
            })?;
            dataset_thresholds(samples, &channel_ids)?
        } else {
            BTreeMap::new()
        };

        Ok(MaskGenerator {
            input_dir: input_dir.to_path_buf(),
            mask_dir,
            table,
            tree,
            channel_ids,
            mask_channel,
            kind: config.kind,
            str_elem_radius: config.str_elem_radius,
            flat_field_dir: config.flat_field_dir,
            channel_thresholds,
        })
    }

    pub fn mask_dir(&self) -> &Path {
        &self.mask_dir
    }

    pub fn mask_channel(&self) -> u32 {
        self.mask_channel
    }

    /// Generate all masks, persist the mask metadata table, and merge the
    /// foreground fractions back into the source frame table (also
    /// persisted). Returns the mask records and the merged source table.
    pub fn generate(
        &self,
        runner: JobRunner,
    ) -> Result<(Vec<MaskRecord>, FrameTable), PreprocessError> {
        // The first selected channel's structure enumerates the
        // (time, pos, slice) combinations to mask
        let structure = self.tree.restrict_to_channel(self.channel_ids[0]);
        let mut args = Vec::new();
        for (time_idx, _, pos_idx, slices) in structure.leaves() {
            for &slice_idx in slices {
                args.push((time_idx, pos_idx, slice_idx));
            }
        }
        info!(
            "generating {} {:?} masks into {}",
            args.len(),
            self.kind,
            self.mask_dir.display()
        );

        let mut masks =
            runner.run_batch(args, |(time_idx, pos_idx, slice_idx)| {
                self.mask_job(time_idx, pos_idx, slice_idx)
            })?;
        masks.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let mut mask_meta = FrameTable::from_records(
            masks.iter().map(MaskRecord::to_frame_record).collect(),
        );
        mask_meta.sort_by_file_name();
        mask_meta.write_dir(&self.mask_dir)?;

        let merged = self.table.merge_fg_frac(&masks);
        merged.write_dir(&self.input_dir)?;
        Ok((masks, merged))
    }

    /// Compute and write one mask. Pure function of its indices; runs on the
    /// worker pool.
    fn mask_job(
        &self,
        time_idx: u32,
        pos_idx: u32,
        slice_idx: u32,
    ) -> Result<MaskRecord, PreprocessError> {
        let frames = self.read_source_frames(time_idx, pos_idx, slice_idx)?;

        let binary = match self.kind {
            MaskKind::Otsu | MaskKind::BordersWeightMap => {
                let sum = sum_frames(&frames)?;
                let threshold = otsu_threshold(sum.data())?;
                binarize(&sum, threshold)
            }
            MaskKind::Unimodal => {
                let sum = sum_frames(&frames)?;
                let threshold = unimodal_threshold(sum.data())?;
                binarize(&sum, threshold)
            }
            MaskKind::DatasetOtsu => {
                // Union of the per-channel dataset thresholds
                let mut combined = Frame::filled(frames[0].width(), frames[0].height(), 0.0);
                for (channel_idx, frame) in self.channel_ids.iter().zip(&frames) {
                    let key = (self.input_dir.to_string_lossy().into_owned(), *channel_idx);
                    let threshold = self.channel_thresholds.get(&key).ok_or_else(|| {
                        PreprocessError::MaskComputation(format!(
                            "no dataset threshold for channel {}",
                            channel_idx
                        ))
                    })?;
                    let channel_mask = binarize(frame, *threshold);
                    combined.add(&channel_mask)?;
                }
                binarize(&combined, 0.5)
            }
        };
        let cleaned = opening(&closing(&binary, self.str_elem_radius), self.str_elem_radius);
        let fg_frac = cleaned.foreground_fraction();

        let (output, ext) = if self.kind == MaskKind::BordersWeightMap {
            // Weighted f32 map; lossless TIFF
            (borders_weight_map(&cleaned), ".tif")
        } else {
            (scale_binary(&cleaned), ".png")
        };

        let file_name = frame_name(self.mask_channel, slice_idx, time_idx, pos_idx, ext);
        write_frame(self.mask_dir.join(&file_name), &output)?;

        Ok(MaskRecord {
            dir_name: self.mask_dir.to_string_lossy().into_owned(),
            time_idx,
            pos_idx,
            slice_idx,
            mask_channel_idx: self.mask_channel,
            file_name,
            fg_frac,
        })
    }

    /// Read the selected channels at one (time, pos, slice), flat-field
    /// corrected if configured.
    fn read_source_frames(
        &self,
        time_idx: u32,
        pos_idx: u32,
        slice_idx: u32,
    ) -> Result<Vec<Frame>, PreprocessError> {
        let mut frames = Vec::with_capacity(self.channel_ids.len());
        for &channel_idx in &self.channel_ids {
            let record = self
                .table
                .find(time_idx, channel_idx, slice_idx, pos_idx)
                .ok_or_else(|| {
                    PreprocessError::StructureMismatch(format!(
                        "channel {} has no frame at time {}, pos {}, slice {}",
                        channel_idx, time_idx, pos_idx, slice_idx
                    ))
                })?;
            let mut frame = read_frame(self.input_dir.join(&record.file_name))?;
            if let Some(flat_field_dir) = &self.flat_field_dir {
                let flat_path =
                    flat_field_dir.join(format!("flat-field_channel-{}.tif", channel_idx));
                let flat = read_frame(flat_path)?;
                frame = correct_flat_field(&frame, &flat)?;
            }
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// One Otsu threshold per (directory, channel) over the sampled intensities.
/// A pure function of the sample table, so repeated runs yield identical
/// thresholds.
pub fn dataset_thresholds(
    samples: &IntensityTable,
    channel_ids: &[u32],
) -> Result<BTreeMap<(String, u32), f32>, PreprocessError> {
    let mut groups: BTreeMap<(String, u32), Vec<f32>> = BTreeMap::new();
    for record in samples.records() {
        if channel_ids.contains(&record.channel_idx) {
            groups
                .entry((record.dir_name.clone(), record.channel_idx))
                .or_default()
                .push(record.intensity);
        }
    }
    let mut thresholds = BTreeMap::new();
    for (key, values) in groups {
        thresholds.insert(key, otsu_threshold(&values)?);
    }
    Ok(thresholds)
}

fn sum_frames(frames: &[Frame]) -> Result<Frame, PreprocessError> {
    let mut sum = frames[0].clone();
    for frame in &frames[1..] {
        sum.add(frame)?;
    }
    Ok(sum)
}

fn binarize(frame: &Frame, threshold: f32) -> Frame {
    let data = frame
        .data()
        .iter()
        .map(|&v| if v >= threshold { 1.0 } else { 0.0 })
        .collect();
    Frame::new(frame.width(), frame.height(), data).expect("same shape as input")
}

/// Scale a 0/1 mask to the full 16-bit range for PNG output.
fn scale_binary(mask: &Frame) -> Frame {
    let data = mask
        .data()
        .iter()
        .map(|&v| if v > 0.0 { u16::MAX as f32 } else { 0.0 })
        .collect();
    Frame::new(mask.width(), mask.height(), data).expect("same shape as input")
}
