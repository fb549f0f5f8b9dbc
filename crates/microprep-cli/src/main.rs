use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use microprep_cli::commands::{cmd_mask, cmd_meta, cmd_metrics, cmd_stats, cmd_tile};
use microprep_cli::{
    parse_depths, parse_index_selection, parse_mask_kind, parse_metric_kind, parse_name_scheme,
    parse_norm_scheme, parse_size_pair,
};
use microprep_core::metrics::MetricKind;
use microprep_core::models::{IndexSelection, MaskKind, NormScheme};
use microprep_core::naming::NameScheme;

#[derive(Parser)]
#[command(name = "microprep")]
#[command(version, about = "Microscopy dataset preprocessing pipeline", long_about = None)]
struct Cli {
    /// Number of worker threads (defaults to the number of cores)
    #[arg(short = 'j', long, global = true, value_name = "N")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a dataset directory and build its frame metadata table
    Meta {
        /// Dataset directory
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// File naming scheme: "indexed" or "sms"
        #[arg(long, value_name = "SCHEME", default_value = "indexed", value_parser = parse_name_scheme)]
        scheme: NameScheme,
    },

    /// Sample intensities and compute z-score normalization parameters
    Stats {
        /// Dataset directory with a frames_meta.csv
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Side of the square sampling blocks, in pixels
        #[arg(long, value_name = "N", default_value = "32")]
        block_size: u32,

        /// Normalization scope: "none", "dataset", "volume" or "slice"
        #[arg(long, value_name = "SCHEME", default_value = "dataset", value_parser = parse_norm_scheme)]
        scheme: NormScheme,

        /// Minimum foreground fraction for a frame to contribute samples
        #[arg(long, value_name = "FLOAT", default_value = "0.0")]
        min_fraction: f64,
    },

    /// Generate foreground masks for the selected channels
    Mask {
        /// Dataset directory with a frames_meta.csv
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory; the mask directory is created inside it
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Channels to mask: "all", one index, or a comma-separated list
        #[arg(short, long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        channels: IndexSelection,

        /// Time points to mask
        #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        times: IndexSelection,

        /// Slices to mask
        #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        slices: IndexSelection,

        /// Positions to mask
        #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        positions: IndexSelection,

        /// Require every channel to share the same index structure
        #[arg(long)]
        uniform: bool,

        /// Thresholding policy: "otsu", "unimodal", "dataset_otsu" or
        /// "borders_weight_map"
        #[arg(long, value_name = "KIND", default_value = "otsu", value_parser = parse_mask_kind)]
        kind: MaskKind,

        /// Radius of the disk structuring element for closing/opening
        #[arg(long, value_name = "N", default_value = "5")]
        str_elem_radius: u32,

        /// Directory with per-channel flat-field images
        #[arg(long, value_name = "DIR")]
        flat_field: Option<PathBuf>,

        /// Channel index for the generated masks (default: max + 1)
        #[arg(long, value_name = "N")]
        mask_channel: Option<u32>,
    },

    /// Cut aligned tiles across the selected channels
    Tile {
        /// Dataset directory with a frames_meta.csv
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory; the tile directory is created inside it
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Channels to tile; the first one is the reference
        #[arg(short, long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        channels: IndexSelection,

        /// Time points to tile
        #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        times: IndexSelection,

        /// Slices to tile
        #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        slices: IndexSelection,

        /// Positions to tile
        #[arg(long, value_name = "SEL", default_value = "all", value_parser = parse_index_selection)]
        positions: IndexSelection,

        /// Tile size as height,width (one number applies to both)
        #[arg(long, value_name = "H,W", default_value = "256,256", value_parser = parse_size_pair)]
        tile_size: (u32, u32),

        /// Step between tile origins as height,width
        #[arg(long, value_name = "H,W", default_value = "256,256", value_parser = parse_size_pair)]
        step_size: (u32, u32),

        /// Per-channel slice depths, e.g. "0=5,1=3"
        #[arg(long, value_name = "CH=D,...", value_parser = parse_depths)]
        depths: Option<BTreeMap<u32, u32>>,

        /// Depth for channels without an explicit entry in --depths
        #[arg(long, value_name = "N", default_value = "1")]
        default_depth: u32,

        /// Write single-slice tiles as TIFF stacks of depth one
        #[arg(long)]
        tile_3d: bool,

        /// Keep only tile origins whose mask foreground fraction clears this
        #[arg(long, value_name = "FLOAT")]
        min_fraction: Option<f64>,

        /// Directory with per-channel flat-field images
        #[arg(long, value_name = "DIR")]
        flat_field: Option<PathBuf>,

        /// Mask directory; when given, the mask channel becomes the reference
        #[arg(long, value_name = "DIR")]
        mask_dir: Option<PathBuf>,

        /// Channel index of the masks inside --mask-dir
        #[arg(long, value_name = "N")]
        mask_channel: Option<u32>,

        /// Slice depth for the mask tiles
        #[arg(long, value_name = "N", default_value = "1")]
        mask_depth: u32,
    },

    /// Evaluate predictions against targets, pairing files by name
    Metrics {
        /// Directory with the target frames
        #[arg(value_name = "TARGETS")]
        target_dir: PathBuf,

        /// Directory with the predicted frames
        #[arg(value_name = "PREDICTIONS")]
        prediction_dir: PathBuf,

        /// Metrics to compute: comma-separated "mse", "mae", "r2", "pearson"
        #[arg(long, value_name = "LIST", default_value = "mse,mae", value_delimiter = ',', value_parser = parse_metric_kind)]
        metrics: Vec<MetricKind>,

        /// Mask directory; adds a foreground-restricted column per metric
        #[arg(long, value_name = "DIR")]
        mask_dir: Option<PathBuf>,

        /// Output CSV path (default: <PREDICTIONS>/metrics_meta.csv)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if let Some(num_threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| format!("Failed to configure thread pool: {}", e))?;
    }

    match cli.command {
        Commands::Meta { input, scheme } => cmd_meta(input, scheme),

        Commands::Stats {
            input,
            block_size,
            scheme,
            min_fraction,
        } => cmd_stats(input, block_size, scheme, min_fraction),

        Commands::Mask {
            input,
            out,
            channels,
            times,
            slices,
            positions,
            uniform,
            kind,
            str_elem_radius,
            flat_field,
            mask_channel,
        } => {
            let out = out.unwrap_or_else(|| input.clone());
            cmd_mask(
                input,
                out,
                channels,
                times,
                slices,
                positions,
                uniform,
                kind,
                str_elem_radius,
                flat_field,
                mask_channel,
            )
        }

        Commands::Tile {
            input,
            out,
            channels,
            times,
            slices,
            positions,
            tile_size,
            step_size,
            depths,
            default_depth,
            tile_3d,
            min_fraction,
            flat_field,
            mask_dir,
            mask_channel,
            mask_depth,
        } => {
            let out = out.unwrap_or_else(|| input.clone());
            cmd_tile(
                input,
                out,
                channels,
                times,
                slices,
                positions,
                tile_size,
                step_size,
                depths.unwrap_or_default(),
                default_depth,
                tile_3d,
                min_fraction,
                flat_field,
                mask_dir,
                mask_channel,
                mask_depth,
            )
        }

        Commands::Metrics {
            target_dir,
            prediction_dir,
            metrics,
            mask_dir,
            out,
        } => cmd_metrics(target_dir, prediction_dir, metrics, mask_dir, out),
    }
}
