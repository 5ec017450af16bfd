//! Tiled sliding-window processing for GeoTIFF rasters.
//!
//! A raster is partitioned into a grid of windows, each window is read
//! with an overlap margin, transformed, trimmed back to its window and
//! written to the output raster, optionally in parallel. Built-in
//! transforms cover sliding-window filters (median, local sum, local
//! mean, adaptive gaussian) and terrain tools (cast-shadow hillshade,
//! sky view factor).

pub mod cli;
pub mod dispatch;
pub mod error;
pub mod filters;
pub mod grid;
pub mod io;
pub mod padding;
pub mod processor;
pub mod sliding;
pub mod terrain;

pub use error::{RastileError, Result};
pub use grid::{Tile, WindowGrid};
pub use io::{OutputDescriptor, OutputDtype};
pub use padding::{EdgePolicy, PadStatistic};
pub use processor::TileTransform;
pub use sliding::{compute_sliding, SlidingOptions};
