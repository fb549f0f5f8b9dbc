//! Requested-index validation and the nested index tree.
//!
//! `validate_indices` is a pure function over the metadata table: it resolves
//! the per-dimension selections into a flat selection plus a nested
//! time -> channel -> position -> slices tree. The tree may be non-uniform
//! (different (time, channel) pairs enumerating different positions/slices),
//! which is what the non-uniform tiling path relies on.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::PreprocessError;
use crate::models::IndexSelection;
use crate::FrameTable;

/// Flat result of index validation: the resolved indices per dimension.
///
/// Channel order follows the request for explicit selections (the first
/// requested channel becomes the tiling reference); the all-values sentinel
/// resolves in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedIndices {
    pub time_ids: Vec<u32>,
    pub channel_ids: Vec<u32>,
    pub slice_ids: Vec<u32>,
    pub pos_ids: Vec<u32>,
}

/// Immutable nested mapping time -> channel -> position -> ordered slices.
///
/// Built once per masking/tiling operation and never mutated afterwards;
/// derivations like [`IndexTree::without_channel`] copy on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTree {
    inner: BTreeMap<u32, BTreeMap<u32, BTreeMap<u32, Vec<u32>>>>,
}

impl IndexTree {
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Slice indices at a (time, channel, position) leaf, if present.
    pub fn slices_at(&self, time_idx: u32, channel_idx: u32, pos_idx: u32) -> Option<&[u32]> {
        self.inner
            .get(&time_idx)
            .and_then(|tp| tp.get(&channel_idx))
            .and_then(|ch| ch.get(&pos_idx))
            .map(|slices| slices.as_slice())
    }

    /// Iterate (time, channel, position, slices) leaves in index order.
    pub fn leaves(&self) -> impl Iterator<Item = (u32, u32, u32, &[u32])> + '_ {
        self.inner.iter().flat_map(|(&time_idx, tp)| {
            tp.iter().flat_map(move |(&channel_idx, ch)| {
                ch.iter().map(move |(&pos_idx, slices)| {
                    (time_idx, channel_idx, pos_idx, slices.as_slice())
                })
            })
        })
    }

    /// Channels appearing anywhere in the tree, ascending.
    pub fn channels(&self) -> BTreeSet<u32> {
        self.inner
            .values()
            .flat_map(|tp| tp.keys().copied())
            .collect()
    }

    /// Derive the tree restricted to a single channel. Time points without
    /// that channel are dropped entirely.
    pub fn restrict_to_channel(&self, channel_idx: u32) -> IndexTree {
        let mut inner = BTreeMap::new();
        for (&time_idx, tp) in &self.inner {
            if let Some(ch) = tp.get(&channel_idx) {
                let mut tp_out = BTreeMap::new();
                tp_out.insert(channel_idx, ch.clone());
                inner.insert(time_idx, tp_out);
            }
        }
        IndexTree { inner }
    }

    /// Derive the tree with one channel removed, dropping emptied time
    /// points. Used to exclude the reference channel from propagation.
    pub fn without_channel(&self, channel_idx: u32) -> IndexTree {
        let mut inner = BTreeMap::new();
        for (&time_idx, tp) in &self.inner {
            let mut tp_out = tp.clone();
            tp_out.remove(&channel_idx);
            if !tp_out.is_empty() {
                inner.insert(time_idx, tp_out);
            }
        }
        IndexTree { inner }
    }
}

/// Validate requested indices against the metadata table.
///
/// Each selection accepts the all-values sentinel, a single index, or an
/// explicit index list. Fails with [`PreprocessError::IndexNotFound`] if an
/// explicitly requested index is absent from the table for every combination
/// of the other dimensions, and with
/// [`PreprocessError::StructureMismatch`] if `uniform` is set but the
/// requested (time, channel) pairs expose differing (position, slice) sets.
pub fn validate_indices(
    table: &FrameTable,
    time_sel: &IndexSelection,
    channel_sel: &IndexSelection,
    slice_sel: &IndexSelection,
    pos_sel: &IndexSelection,
    uniform: bool,
) -> Result<(SelectedIndices, IndexTree), PreprocessError> {
    let time_ids = resolve(time_sel, table.unique_times(), "time")?;
    let channel_ids = resolve(channel_sel, table.unique_channels(), "channel")?;
    let slice_ids = resolve(slice_sel, table.unique_slices(), "slice")?;
    let pos_ids = resolve(pos_sel, table.unique_positions(), "position")?;

    let time_set: BTreeSet<u32> = time_ids.iter().copied().collect();
    let channel_set: BTreeSet<u32> = channel_ids.iter().copied().collect();
    let slice_set: BTreeSet<u32> = slice_ids.iter().copied().collect();
    let pos_set: BTreeSet<u32> = pos_ids.iter().copied().collect();

    let mut inner: BTreeMap<u32, BTreeMap<u32, BTreeMap<u32, Vec<u32>>>> = BTreeMap::new();
    for record in table.records() {
        if !time_set.contains(&record.time_idx)
            || !channel_set.contains(&record.channel_idx)
            || !slice_set.contains(&record.slice_idx)
            || !pos_set.contains(&record.pos_idx)
        {
            continue;
        }
        inner
            .entry(record.time_idx)
            .or_default()
            .entry(record.channel_idx)
            .or_default()
            .entry(record.pos_idx)
            .or_default()
            .push(record.slice_idx);
    }
    for tp in inner.values_mut() {
        for ch in tp.values_mut() {
            for slices in ch.values_mut() {
                slices.sort_unstable();
                slices.dedup();
            }
        }
    }
    let tree = IndexTree { inner };

    if uniform {
        assert_uniform(&tree)?;
    }

    let selected = SelectedIndices {
        time_ids,
        channel_ids,
        slice_ids,
        pos_ids,
    };
    Ok((selected, tree))
}

/// Resolve one dimension's selection against the values present in the table.
fn resolve(
    selection: &IndexSelection,
    available: BTreeSet<u32>,
    dim: &'static str,
) -> Result<Vec<u32>, PreprocessError> {
    match selection.requested() {
        None => Ok(available.into_iter().collect()),
        Some(requested) => {
            let mut seen = BTreeSet::new();
            let mut resolved = Vec::with_capacity(requested.len());
            for index in requested {
                if !available.contains(&index) {
                    return Err(PreprocessError::IndexNotFound { dim, index });
                }
                if seen.insert(index) {
                    resolved.push(index);
                }
            }
            Ok(resolved)
        }
    }
}

/// Check that every (time, channel) pair exposes an identical
/// (position, slice) structure.
fn assert_uniform(tree: &IndexTree) -> Result<(), PreprocessError> {
    let mut reference: Option<(u32, u32, &BTreeMap<u32, Vec<u32>>)> = None;
    for (&time_idx, tp) in &tree.inner {
        for (&channel_idx, ch) in tp {
            match reference {
                None => reference = Some((time_idx, channel_idx, ch)),
                Some((ref_time, ref_channel, ref_struct)) => {
                    if ch != ref_struct {
                        return Err(PreprocessError::StructureMismatch(format!(
                            "(time {}, channel {}) and (time {}, channel {}) enumerate \
                             different positions/slices; use the non-uniform path",
                            ref_time, ref_channel, time_idx, channel_idx
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrameRecord;

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

    /// Channel 0 has slices {0,1,2} at pos 0; channel 1 only {0,1}.
    fn non_uniform_table() -> FrameTable {
        FrameTable::from_records(vec![
            record(0, 0, 0, 0),
            record(0, 0, 1, 0),
            record(0, 0, 2, 0),
            record(0, 1, 0, 0),
            record(0, 1, 1, 0),
        ])
    }

    #[test]
    fn all_sentinel_resolves_every_value() {
        let table = non_uniform_table();
        let (selected, tree) = validate_indices(
            &table,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            false,
        )
        .unwrap();
        assert_eq!(selected.channel_ids, vec![0, 1]);
        assert_eq!(selected.slice_ids, vec![0, 1, 2]);
        assert_eq!(tree.slices_at(0, 0, 0), Some(&[0, 1, 2][..]));
        assert_eq!(tree.slices_at(0, 1, 0), Some(&[0, 1][..]));
    }

    #[test]
    fn explicit_channel_order_is_preserved() {
        let table = non_uniform_table();
        let (selected, _) = validate_indices(
            &table,
            &IndexSelection::All,
            &IndexSelection::List(vec![1, 0]),
            &IndexSelection::All,
            &IndexSelection::All,
            false,
        )
        .unwrap();
        assert_eq!(selected.channel_ids, vec![1, 0]);
    }

    #[test]
    fn missing_index_is_rejected() {
        let table = non_uniform_table();
        let err = validate_indices(
            &table,
            &IndexSelection::All,
            &IndexSelection::One(7),
            &IndexSelection::All,
            &IndexSelection::All,
            false,
        )
        .unwrap_err();
        match err {
            PreprocessError::IndexNotFound { dim, index } => {
                assert_eq!(dim, "channel");
                assert_eq!(index, 7);
            }
            other => panic!("expected IndexNotFound, got {other:?}"),
        }
    }

    #[test]
    fn uniform_assertion_rejects_irregular_structure() {
        let table = non_uniform_table();
        let err = validate_indices(
            &table,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, PreprocessError::StructureMismatch(_)));
    }

    #[test]
    fn uniform_assertion_accepts_regular_structure() {
        let table = FrameTable::from_records(vec![
            record(0, 0, 0, 0),
            record(0, 0, 1, 0),
            record(0, 1, 0, 0),
            record(0, 1, 1, 0),
        ]);
        let result = validate_indices(
            &table,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            true,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn derived_trees_are_copies() {
        let table = non_uniform_table();
        let (_, tree) = validate_indices(
            &table,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            &IndexSelection::All,
            false,
        )
        .unwrap();
        let reference = tree.restrict_to_channel(0);
        let remaining = tree.without_channel(0);
        assert_eq!(reference.channels().into_iter().collect::<Vec<_>>(), [0]);
        assert_eq!(remaining.channels().into_iter().collect::<Vec<_>>(), [1]);
        // Original untouched
        assert_eq!(tree.channels().len(), 2);
    }
}
