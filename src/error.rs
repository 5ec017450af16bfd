use thiserror::Error;

use crate::grid::Tile;

#[derive(Error, Debug)]
pub enum RastileError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Invalid window size: {0}x{1} (both dimensions must be positive)")]
    InvalidWindowSize(usize, usize),

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Invalid overlap: {overlap} (must be strictly less than half the window size, window={window})")]
    InvalidOverlap { overlap: usize, window: usize },

    #[error("Invalid worker count: {0} (must be at least 1)")]
    InvalidWorkerCount(usize),

    #[error("Invalid band {0}: input raster has {1} band(s)")]
    InvalidBand(usize, usize),

    #[error("Invalid pad mode: {0}")]
    InvalidPadMode(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid kernel size: {0} (must be positive)")]
    InvalidKernelSize(usize),

    #[error("Invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Transform output shape {actual:?} does not match expected padded shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Processing failed for tile rows [{},{}), cols [{},{}): {source}",
            tile.row_start, tile.row_end, tile.col_start, tile.col_end)]
    TileFailed {
        tile: Tile,
        #[source]
        source: Box<RastileError>,
    },

    #[error("Run cancelled before completion")]
    Cancelled,
}

impl RastileError {
    /// Wrap an error with the coordinates of the tile it occurred on.
    /// Already-tagged errors keep their original tile.
    pub fn for_tile(self, tile: Tile) -> Self {
        match self {
            e @ RastileError::TileFailed { .. } => e,
            e => RastileError::TileFailed {
                tile,
                source: Box::new(e),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RastileError>;
