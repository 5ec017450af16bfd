use ndarray::{s, Array3};

use crate::error::{RastileError, Result};
use crate::padding::{EdgePolicy, PaddedWindow};

/// A pure, tile-local raster algorithm. The engine's only contract with a
/// transform is shape-in/shape-out equality at the padded resolution; the
/// trimmed interior must be valid wherever the pad radius covers the
/// algorithm's neighborhood.
///
/// Implementations must not share mutable state across tiles: the same
/// transform instance is applied concurrently from multiple workers.
pub trait TileTransform: Send + Sync {
    /// Display name, used in logs and output file naming.
    fn name(&self) -> &str;

    /// Whether the transform runs once per band (on a single-band stack)
    /// or once on the full band stack.
    fn per_band(&self) -> bool {
        false
    }

    /// Pad radius the transform needs around each tile.
    fn required_overlap(&self) -> usize {
        0
    }

    /// Apply the algorithm to a padded (bands, rows, cols) window.
    /// Invalid pixels are NaN on input and must be NaN on output.
    fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>>;
}

/// Run a transform on one padded window and trim the result back to the
/// originating tile's exact extent. Any failure is tagged with the tile's
/// coordinates.
pub fn process_tile(
    transform: &dyn TileTransform,
    data: &Array3<f64>,
    window: &PaddedWindow,
    policy: EdgePolicy,
) -> Result<Array3<f64>> {
    process_tile_inner(transform, data, window, policy)
        .map_err(|e| e.for_tile(window.tile))
}

fn process_tile_inner(
    transform: &dyn TileTransform,
    data: &Array3<f64>,
    window: &PaddedWindow,
    policy: EdgePolicy,
) -> Result<Array3<f64>> {
    let (bands, rows, cols) = data.dim();
    let output = transform.apply(data)?;

    if output.dim() != (bands, rows, cols) {
        return Err(RastileError::ShapeMismatch {
            expected: (bands, rows, cols),
            actual: output.dim(),
        });
    }

    let (row_off, col_off) = window.tile_offset(policy);
    let trimmed = output
        .slice(s![
            ..,
            row_off..row_off + window.tile.height(),
            col_off..col_off + window.tile.width()
        ])
        .to_owned();

    debug_assert_eq!(
        trimmed.dim(),
        (bands, window.tile.height(), window.tile.width())
    );
    Ok(trimmed)
}
