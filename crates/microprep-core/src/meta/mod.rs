//! Frame metadata tables and index validation
//!
//! The metadata table is the single persisted contract between preprocessing
//! phases and downstream training code. This module provides:
//! - `table`: the ordered frame-record table with CSV round-trip and
//!   immutable merge operations for derived columns
//! - `index`: validation of requested time/channel/slice/position indices
//!   and construction of the nested index tree

mod index;
mod table;

pub use index::{validate_indices, IndexTree, SelectedIndices};
pub use table::FrameTable;
