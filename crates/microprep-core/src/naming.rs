//! File-name parsing and formatting schemes.
//!
//! Two naming conventions are supported:
//! - indexed: `im_c###_z###_t###_p###.png` (ordered-token scheme)
//! - sms: `img_<channelname>_t###_p###_z###.tif` (named-channel scheme,
//!   channel names are assigned indices in order of first appearance)
//!
//! The rest of the engine treats parsing as an opaque pure function over the
//! file name; formatting is the inverse used when writing masks and tiles.

use std::fs;
use std::path::Path;

use crate::errors::PreprocessError;
use crate::models::FrameRecord;
use crate::FrameTable;

/// Zero-padded width used for indices embedded in file names.
const INT2STR_LEN: usize = 3;

/// File-name scheme for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScheme {
    /// `im_c###_z###_t###_p###.<ext>`
    Indexed,
    /// `img_<channelname>_t###_p###_z###.<ext>`
    Sms,
}

/// Indices parsed from one image file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
    pub channel_idx: u32,
    pub slice_idx: u32,
    pub time_idx: u32,
    pub pos_idx: u32,
}

/// Parse an indexed-scheme name such as `im_c001_z000_t000_p003.png`.
/// Token order after the `im` prefix is not significant.
pub fn parse_indexed_name(file_name: &str) -> Result<ParsedName, PreprocessError> {
    let stem = strip_extension(file_name);
    let mut tokens = stem.split('_');
    if tokens.next() != Some("im") {
        return Err(PreprocessError::NameParse(file_name.to_string()));
    }

    let mut channel_idx = None;
    let mut slice_idx = None;
    let mut time_idx = None;
    let mut pos_idx = None;
    for token in tokens {
        if token.len() < 2 {
            return Err(PreprocessError::NameParse(file_name.to_string()));
        }
        let (prefix, digits) = token.split_at(1);
        let value: u32 = digits
            .parse()
            .map_err(|_| PreprocessError::NameParse(file_name.to_string()))?;
        match prefix {
            "c" => channel_idx = Some(value),
            "z" => slice_idx = Some(value),
            "t" => time_idx = Some(value),
            "p" => pos_idx = Some(value),
            _ => return Err(PreprocessError::NameParse(file_name.to_string())),
        }
    }

    match (channel_idx, slice_idx, time_idx, pos_idx) {
        (Some(channel_idx), Some(slice_idx), Some(time_idx), Some(pos_idx)) => Ok(ParsedName {
            channel_idx,
            slice_idx,
            time_idx,
            pos_idx,
        }),
        _ => Err(PreprocessError::NameParse(file_name.to_string())),
    }
}

/// Parse an sms-scheme name such as `img_phase_t000_p003_z012.tif`.
///
/// `channel_names` is the registry of channel names seen so far; unseen names
/// are appended and their index is their position in the registry.
pub fn parse_sms_name(
    file_name: &str,
    channel_names: &mut Vec<String>,
) -> Result<ParsedName, PreprocessError> {
    let stem = strip_extension(file_name);
    let tokens: Vec<&str> = stem.split('_').collect();
    // img_<channelname...>_t###_p###_z###, channel names may contain '_'
    if tokens.len() < 5 || tokens[0] != "img" {
        return Err(PreprocessError::NameParse(file_name.to_string()));
    }
    let index_tokens = &tokens[tokens.len() - 3..];
    let channel_name = tokens[1..tokens.len() - 3].join("_");
    if channel_name.is_empty() {
        return Err(PreprocessError::NameParse(file_name.to_string()));
    }

    let mut time_idx = None;
    let mut pos_idx = None;
    let mut slice_idx = None;
    for token in index_tokens {
        if token.len() < 2 {
            return Err(PreprocessError::NameParse(file_name.to_string()));
        }
        let (prefix, digits) = token.split_at(1);
        let value: u32 = digits
            .parse()
            .map_err(|_| PreprocessError::NameParse(file_name.to_string()))?;
        match prefix {
            "t" => time_idx = Some(value),
            "p" => pos_idx = Some(value),
            "z" => slice_idx = Some(value),
            _ => return Err(PreprocessError::NameParse(file_name.to_string())),
        }
    }

    let channel_idx = match channel_names.iter().position(|n| n == &channel_name) {
        Some(existing) => existing as u32,
        None => {
            channel_names.push(channel_name);
            (channel_names.len() - 1) as u32
        }
    };

    match (time_idx, pos_idx, slice_idx) {
        (Some(time_idx), Some(pos_idx), Some(slice_idx)) => Ok(ParsedName {
            channel_idx,
            slice_idx,
            time_idx,
            pos_idx,
        }),
        _ => Err(PreprocessError::NameParse(file_name.to_string())),
    }
}

/// Canonical indexed-scheme frame name, also used for generated masks.
pub fn frame_name(channel_idx: u32, slice_idx: u32, time_idx: u32, pos_idx: u32, ext: &str) -> String {
    format!(
        "im_c{:0w$}_z{:0w$}_t{:0w$}_p{:0w$}{}",
        channel_idx,
        slice_idx,
        time_idx,
        pos_idx,
        ext,
        w = INT2STR_LEN
    )
}

/// Tile file name: the frame name extended with the tile origin.
pub fn tile_name(
    channel_idx: u32,
    slice_idx: u32,
    time_idx: u32,
    pos_idx: u32,
    row_start: u32,
    col_start: u32,
    ext: &str,
) -> String {
    format!(
        "im_c{:0w$}_z{:0w$}_t{:0w$}_p{:0w$}_r{:04}-{:04}{}",
        channel_idx,
        slice_idx,
        time_idx,
        pos_idx,
        row_start,
        col_start,
        ext,
        w = INT2STR_LEN
    )
}

/// Build a frame metadata table by scanning `input_dir` for image files.
///
/// File names are sorted before parsing so sms channel indices are assigned
/// deterministically. The caller persists the table.
pub fn scan_frames_meta<P: AsRef<Path>>(
    input_dir: P,
    scheme: NameScheme,
) -> Result<FrameTable, PreprocessError> {
    let input_dir = input_dir.as_ref();
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_image_name(&name) {
            names.push(name);
        }
    }
    names.sort();

    let dir_name = input_dir.to_string_lossy().into_owned();
    let mut channel_names = Vec::new();
    let mut table = FrameTable::new();
    for name in names {
        let parsed = match scheme {
            NameScheme::Indexed => parse_indexed_name(&name)?,
            NameScheme::Sms => parse_sms_name(&name, &mut channel_names)?,
        };
        table.push(FrameRecord {
            dir_name: dir_name.clone(),
            time_idx: parsed.time_idx,
            channel_idx: parsed.channel_idx,
            slice_idx: parsed.slice_idx,
            pos_idx: parsed.pos_idx,
            file_name: name,
            fg_frac: None,
            zscore_median: None,
            zscore_iqr: None,
        });
    }
    Ok(table)
}

/// True for the image extensions the pipeline reads and writes.
pub fn is_image_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".png") || lower.ends_with(".tif") || lower.ends_with(".tiff")
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(dot) => &file_name[..dot],
        None => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_name_round_trip() {
        let name = frame_name(1, 15, 0, 3, ".png");
        assert_eq!(name, "im_c001_z015_t000_p003.png");
        let parsed = parse_indexed_name(&name).unwrap();
        assert_eq!(
            parsed,
            ParsedName {
                channel_idx: 1,
                slice_idx: 15,
                time_idx: 0,
                pos_idx: 3
            }
        );
    }

    #[test]
    fn indexed_name_token_order_is_free() {
        let parsed = parse_indexed_name("im_t002_p001_c000_z004.tif").unwrap();
        assert_eq!(parsed.time_idx, 2);
        assert_eq!(parsed.channel_idx, 0);
        assert_eq!(parsed.slice_idx, 4);
    }

    #[test]
    fn sms_names_assign_channels_by_first_appearance() {
        let mut channels = Vec::new();
        let first = parse_sms_name("img_phase_t000_p000_z000.tif", &mut channels).unwrap();
        let second = parse_sms_name("img_retardance_t000_p000_z000.tif", &mut channels).unwrap();
        let repeat = parse_sms_name("img_phase_t001_p000_z000.tif", &mut channels).unwrap();
        assert_eq!(first.channel_idx, 0);
        assert_eq!(second.channel_idx, 1);
        assert_eq!(repeat.channel_idx, 0);
        assert_eq!(channels, vec!["phase", "retardance"]);
    }

    #[test]
    fn sms_channel_names_may_contain_underscores() {
        let mut channels = Vec::new();
        let parsed = parse_sms_name("img_bright_field_t000_p002_z001.tif", &mut channels).unwrap();
        assert_eq!(channels, vec!["bright_field"]);
        assert_eq!(parsed.pos_idx, 2);
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(parse_indexed_name("image_c000.png").is_err());
        assert!(parse_indexed_name("im_c000_z000_t000.png").is_err());
        let mut channels = Vec::new();
        assert!(parse_sms_name("img_t000_p000_z000.tif", &mut channels).is_err());
    }

    #[test]
    fn tile_names_sort_by_origin_within_a_frame() {
        let a = tile_name(0, 0, 0, 0, 0, 64, ".png");
        let b = tile_name(0, 0, 0, 0, 64, 0, ".png");
        assert!(a < b);
    }
}
