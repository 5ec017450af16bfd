use clap::{Parser, Subcommand, ValueEnum};

use crate::padding::EdgePolicy;

#[derive(Parser, Debug)]
#[command(name = "rastile")]
#[command(about = "Windowed raster processing: filters and terrain tools over tiled GeoTIFFs")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a sliding-window filter to each band
    Filter {
        /// Filter to apply
        #[arg(value_enum)]
        kind: FilterKind,

        /// Kernel size in pixels (odd for median)
        #[arg(short, long, value_name = "PIXELS", default_value_t = 8)]
        kernel_size: usize,

        /// Gaussian standard deviation (adaptive-gaussian only)
        #[arg(long, value_name = "SIGMA", default_value_t = 1.0)]
        sigma: f64,

        #[command(flatten)]
        common: CommonOpts,
    },

    /// Compute a cast-shadow mask of a height model for a sun position
    Hillshade {
        /// Sun elevation above the horizon, in degrees
        #[arg(short, long, value_name = "DEGREES")]
        elevation: f64,

        /// Sun azimuth clockwise from north, in degrees
        #[arg(short, long, value_name = "DEGREES")]
        azimuth: f64,

        /// Maximum shadowing distance in pixels (default: derived from
        /// the altitude range of the model)
        #[arg(short, long, value_name = "PIXELS")]
        radius: Option<usize>,

        /// Pixel size in the same unit as the altitudes
        #[arg(long, value_name = "SIZE", default_value_t = 0.5)]
        resolution: f64,

        #[command(flatten)]
        common: CommonOpts,
    },

    /// Compute the sky view factor of a height model
    Svf {
        /// Horizon search distance in pixels
        #[arg(short, long, value_name = "PIXELS", default_value_t = 100)]
        radius: usize,

        /// Number of horizon directions
        #[arg(short, long, value_name = "N", default_value_t = 16)]
        directions: usize,

        /// Pixel size in the same unit as the altitudes
        #[arg(long, value_name = "SIZE", default_value_t = 0.5)]
        resolution: f64,

        /// Evaluate the view factor at this altitude instead of the
        /// altitude of each pixel
        #[arg(long, value_name = "ALTITUDE")]
        altitude: Option<f64>,

        #[command(flatten)]
        common: CommonOpts,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FilterKind {
    Median,
    Sum,
    Mean,
    AdaptiveGaussian,
}

/// Windowing and output options shared by every subcommand.
#[derive(clap::Args, Debug)]
pub struct CommonOpts {
    /// Input GeoTIFF path
    #[arg(short, long, value_name = "FILE")]
    pub input: String,

    /// Output GeoTIFF path
    #[arg(short, long, value_name = "FILE")]
    pub output: String,

    /// Tile size in pixels (square)
    #[arg(short, long, value_name = "PIXELS", default_value_t = 1024)]
    pub window_size: usize,

    /// Edge handling: none, edge, reflect, symmetric, mean, median,
    /// minimum, maximum, or constant=VALUE
    #[arg(short, long, value_name = "MODE", default_value = "edge")]
    pub pad: EdgePolicy,

    /// 1-based bands to process (default: all)
    #[arg(short, long, value_name = "BANDS", value_delimiter = ',')]
    pub bands: Option<Vec<usize>>,

    /// Number of parallel workers (default: RASTILE_MAX_WORKERS or all cores)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// GTiff compression: DEFLATE, LZW, ZSTD or NONE
    #[arg(long, value_name = "CODEC", default_value = "LZW")]
    pub compression: String,

    /// Override output nodata (default: read from input)
    #[arg(long, value_name = "VALUE")]
    pub nodata: Option<f64>,
}
