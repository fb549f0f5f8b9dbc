//! Parsers for command-line argument values.

use std::collections::BTreeMap;

use microprep_core::metrics::MetricKind;
use microprep_core::models::{IndexSelection, MaskKind, NormScheme};
use microprep_core::naming::NameScheme;

/// Parse an index selection: `all` (or `-1`), a single index, or a
/// comma-separated list such as `0,2,5`.
pub fn parse_index_selection(value: &str) -> Result<IndexSelection, String> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("all") || trimmed == "-1" {
        return Ok(IndexSelection::All);
    }
    let indices: Result<Vec<u32>, _> = trimmed.split(',').map(|t| t.trim().parse()).collect();
    let indices = indices.map_err(|_| format!("invalid index selection: {value:?}"))?;
    match indices.as_slice() {
        [] => Err(format!("empty index selection: {value:?}")),
        [single] => Ok(IndexSelection::One(*single)),
        _ => Ok(IndexSelection::List(indices)),
    }
}

/// Parse a `height,width` pair; a single number applies to both axes.
pub fn parse_size_pair(value: &str) -> Result<(u32, u32), String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let parse = |t: &str| {
        t.parse::<u32>()
            .map_err(|_| format!("invalid size value: {t:?}"))
    };
    match parts.as_slice() {
        [both] => {
            let v = parse(both)?;
            Ok((v, v))
        }
        [h, w] => Ok((parse(h)?, parse(w)?)),
        _ => Err(format!("expected height,width - got {value:?}")),
    }
}

/// Parse per-channel depths such as `0=5,1=3`.
pub fn parse_depths(value: &str) -> Result<BTreeMap<u32, u32>, String> {
    let mut depths = BTreeMap::new();
    for pair in value.split(',') {
        let (channel, depth) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected channel=depth, got {pair:?}"))?;
        let channel: u32 = channel
            .trim()
            .parse()
            .map_err(|_| format!("invalid channel: {channel:?}"))?;
        let depth: u32 = depth
            .trim()
            .parse()
            .map_err(|_| format!("invalid depth: {depth:?}"))?;
        depths.insert(channel, depth);
    }
    Ok(depths)
}

pub fn parse_mask_kind(value: &str) -> Result<MaskKind, String> {
    match value {
        "otsu" => Ok(MaskKind::Otsu),
        "unimodal" => Ok(MaskKind::Unimodal),
        "dataset_otsu" => Ok(MaskKind::DatasetOtsu),
        "borders_weight_map" => Ok(MaskKind::BordersWeightMap),
        other => Err(format!(
            "unknown mask type {other:?} (expected otsu, unimodal, dataset_otsu or \
             borders_weight_map)"
        )),
    }
}

pub fn parse_norm_scheme(value: &str) -> Result<NormScheme, String> {
    match value {
        "none" => Ok(NormScheme::None),
        "dataset" => Ok(NormScheme::Dataset),
        "volume" => Ok(NormScheme::Volume),
        "slice" => Ok(NormScheme::Slice),
        other => Err(format!(
            "unknown normalization scheme {other:?} (expected none, dataset, volume or slice)"
        )),
    }
}

pub fn parse_name_scheme(value: &str) -> Result<NameScheme, String> {
    match value {
        "indexed" => Ok(NameScheme::Indexed),
        "sms" => Ok(NameScheme::Sms),
        other => Err(format!("unknown naming scheme {other:?} (expected indexed or sms)")),
    }
}

pub fn parse_metric_kind(value: &str) -> Result<MetricKind, String> {
    match value.trim() {
        "mse" => Ok(MetricKind::Mse),
        "mae" => Ok(MetricKind::Mae),
        "r2" => Ok(MetricKind::RSquared),
        "pearson" => Ok(MetricKind::Pearson),
        other => Err(format!(
            "unknown metric {other:?} (expected mse, mae, r2 or pearson)"
        )),
    }
}

/// Parse a comma-separated metric list such as `mse,mae,pearson`.
pub fn parse_metric_kinds(value: &str) -> Result<Vec<MetricKind>, String> {
    value.split(',').map(parse_metric_kind).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_selections() {
        assert_eq!(parse_index_selection("all").unwrap(), IndexSelection::All);
        assert_eq!(parse_index_selection("-1").unwrap(), IndexSelection::All);
        assert_eq!(parse_index_selection("4").unwrap(), IndexSelection::One(4));
        assert_eq!(
            parse_index_selection("1, 0,2").unwrap(),
            IndexSelection::List(vec![1, 0, 2])
        );
        assert!(parse_index_selection("x").is_err());
    }

    #[test]
    fn size_pairs() {
        assert_eq!(parse_size_pair("256").unwrap(), (256, 256));
        assert_eq!(parse_size_pair("128, 64").unwrap(), (128, 64));
        assert!(parse_size_pair("1,2,3").is_err());
    }

    #[test]
    fn depth_maps() {
        let depths = parse_depths("0=5,1=3").unwrap();
        assert_eq!(depths[&0], 5);
        assert_eq!(depths[&1], 3);
        assert!(parse_depths("0:5").is_err());
    }

    #[test]
    fn metric_lists() {
        let kinds = parse_metric_kinds("mse, r2").unwrap();
        assert_eq!(kinds, vec![MetricKind::Mse, MetricKind::RSquared]);
        assert!(parse_metric_kinds("ssim").is_err());
    }
}
