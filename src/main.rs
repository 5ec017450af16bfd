use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use rastile::cli::{Args, Command, CommonOpts, FilterKind};
use rastile::error::Result;
use rastile::filters::{AdaptiveGaussian, LocalMean, LocalSum, MedianFilter};
use rastile::io::{self, OutputDtype};
use rastile::processor::TileTransform;
use rastile::sliding::{self, SlidingOptions};
use rastile::terrain::{Hillshade, SkyViewFactor};

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn options_for(common: &CommonOpts, dtype: OutputDtype) -> SlidingOptions {
    SlidingOptions {
        window_size: (common.window_size, common.window_size),
        pad_policy: common.pad,
        bands: common.bands.clone(),
        workers: common.workers,
        compression: common.compression.clone(),
        dtype,
        nodata: common.nodata,
    }
}

/// Radius for a hillshade when none is given: maximum distance at which
/// the highest point of the model can still shadow the lowest.
fn hillshade_radius(input: &Path, elevation: f64, resolution: f64) -> Result<usize> {
    let dataset = io::open_source(input)?;
    let band = dataset.rasterband(1)?;
    let minmax = band.compute_raster_min_max(true)?;
    let radius = Hillshade::derive_radius(minmax.min, minmax.max, elevation, resolution)?;
    info!(
        "Derived shadowing radius {} px from altitude range [{:.1}, {:.1}]",
        radius, minmax.min, minmax.max
    );
    Ok(radius)
}

fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Filter {
            kind,
            kernel_size,
            sigma,
            common,
        } => {
            let transform: Box<dyn TileTransform> = match kind {
                FilterKind::Median => Box::new(MedianFilter::new(*kernel_size)?),
                FilterKind::Sum => Box::new(LocalSum::new(*kernel_size)?),
                FilterKind::Mean => Box::new(LocalMean::new(*kernel_size)?),
                FilterKind::AdaptiveGaussian => {
                    Box::new(AdaptiveGaussian::new(*kernel_size, *sigma)?)
                }
            };
            let options = options_for(common, OutputDtype::Float32);
            sliding::compute_sliding(
                Path::new(&common.input),
                Path::new(&common.output),
                transform.as_ref(),
                &options,
                None,
            )
        }
        Command::Hillshade {
            elevation,
            azimuth,
            radius,
            resolution,
            common,
        } => {
            let radius = match radius {
                Some(r) => *r,
                None => hillshade_radius(Path::new(&common.input), *elevation, *resolution)?,
            };
            let transform = Hillshade::new(*elevation, *azimuth, radius, *resolution)?;
            let mut options = options_for(common, OutputDtype::UInt8);
            options.nodata = Some(common.nodata.unwrap_or(255.0));
            sliding::compute_sliding(
                Path::new(&common.input),
                Path::new(&common.output),
                &transform,
                &options,
                None,
            )
        }
        Command::Svf {
            radius,
            directions,
            resolution,
            altitude,
            common,
        } => {
            let transform = SkyViewFactor::new(*radius, *directions, *resolution, *altitude)?;
            let options = options_for(common, OutputDtype::Float32);
            sliding::compute_sliding(
                Path::new(&common.input),
                Path::new(&common.output),
                &transform,
                &options,
                None,
            )
        }
    }
}
