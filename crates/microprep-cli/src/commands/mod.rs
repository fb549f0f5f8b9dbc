//! Command implementations for the microprep CLI.

mod mask;
mod meta;
mod metrics;
mod stats;
mod tile;

// Re-export all command functions
pub use mask::cmd_mask;
pub use meta::cmd_meta;
pub use metrics::cmd_metrics;
pub use stats::cmd_stats;
pub use tile::cmd_tile;
