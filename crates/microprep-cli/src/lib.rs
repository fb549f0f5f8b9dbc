//! Shared utilities for microprep-cli
//!
//! Argument parsing helpers and the command implementations, kept in a
//! library so they stay testable without spawning the binary.

pub mod commands;
pub mod parsers;

pub use parsers::{
    parse_depths, parse_index_selection, parse_mask_kind, parse_metric_kind, parse_metric_kinds,
    parse_name_scheme, parse_norm_scheme, parse_size_pair,
};
