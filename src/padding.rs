use std::str::FromStr;

use ndarray::Array3;

use crate::error::{RastileError, Result};
use crate::grid::Tile;

/// Statistic used by [`EdgePolicy::Statistic`] to synthesize out-of-bounds
/// pixels from the valid part of the read window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadStatistic {
    Mean,
    Median,
    Min,
    Max,
}

/// Rule for synthesizing pixel values where a padded window extends past
/// the raster boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgePolicy {
    /// No synthesis: boundary windows stay smaller than the nominal
    /// padded size.
    None,
    /// Replicate the nearest valid pixel.
    Edge,
    /// Mirror without repeating the boundary pixel.
    Reflect,
    /// Mirror, repeating the boundary pixel.
    Symmetric,
    /// Fill with a fixed value.
    Constant(f64),
    /// Fill with a statistic of the valid read region.
    Statistic(PadStatistic),
}

impl FromStr for EdgePolicy {
    type Err = RastileError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("constant=") {
            let v: f64 = value
                .parse()
                .map_err(|_| RastileError::InvalidPadMode(s.to_string()))?;
            return Ok(EdgePolicy::Constant(v));
        }
        match lower.as_str() {
            "none" => Ok(EdgePolicy::None),
            "edge" => Ok(EdgePolicy::Edge),
            "reflect" => Ok(EdgePolicy::Reflect),
            "symmetric" => Ok(EdgePolicy::Symmetric),
            "constant" => Ok(EdgePolicy::Constant(0.0)),
            "mean" => Ok(EdgePolicy::Statistic(PadStatistic::Mean)),
            "median" => Ok(EdgePolicy::Statistic(PadStatistic::Median)),
            "min" | "minimum" => Ok(EdgePolicy::Statistic(PadStatistic::Min)),
            "max" | "maximum" => Ok(EdgePolicy::Statistic(PadStatistic::Max)),
            _ => Err(RastileError::InvalidPadMode(s.to_string())),
        }
    }
}

/// Read geometry for one tile: the tile extent expanded by the pad radius,
/// clipped to the raster bounds, with the clipped excess recorded per side
/// so it can be synthesized by an [`EdgePolicy`].
#[derive(Debug, Clone, Copy)]
pub struct PaddedWindow {
    pub tile: Tile,
    pub radius: usize,

    // Region actually read from the source, clipped to [0,H)x[0,W)
    pub read_row_start: usize,
    pub read_row_end: usize,
    pub read_col_start: usize,
    pub read_col_end: usize,

    // Clipped excess per side, to be synthesized
    pub synth_top: usize,
    pub synth_bottom: usize,
    pub synth_left: usize,
    pub synth_right: usize,
}

impl PaddedWindow {
    pub fn new(tile: Tile, radius: usize, raster_width: usize, raster_height: usize) -> Self {
        let read_row_start = tile.row_start.saturating_sub(radius);
        let read_col_start = tile.col_start.saturating_sub(radius);
        let read_row_end = (tile.row_end + radius).min(raster_height);
        let read_col_end = (tile.col_end + radius).min(raster_width);

        Self {
            tile,
            radius,
            read_row_start,
            read_row_end,
            read_col_start,
            read_col_end,
            synth_top: radius - (tile.row_start - read_row_start),
            synth_bottom: radius - (read_row_end - tile.row_end),
            synth_left: radius - (tile.col_start - read_col_start),
            synth_right: radius - (read_col_end - tile.col_end),
        }
    }

    pub fn read_height(&self) -> usize {
        self.read_row_end - self.read_row_start
    }

    pub fn read_width(&self) -> usize {
        self.read_col_end - self.read_col_start
    }

    /// Offset of the tile's first row/col inside the read region.
    pub fn tile_offset_in_read(&self) -> (usize, usize) {
        (
            self.tile.row_start - self.read_row_start,
            self.tile.col_start - self.read_col_start,
        )
    }

    /// Offset of the tile's first row/col inside the array produced for
    /// this window under the given policy. With synthesis the array has the
    /// nominal padded shape and the offset is the full radius; without it
    /// the array is the clipped read region.
    pub fn tile_offset(&self, policy: EdgePolicy) -> (usize, usize) {
        match policy {
            EdgePolicy::None => self.tile_offset_in_read(),
            _ => (self.radius, self.radius),
        }
    }

    /// Shape of the window array handed to the transform (rows, cols).
    pub fn data_shape(&self, policy: EdgePolicy) -> (usize, usize) {
        match policy {
            EdgePolicy::None => (self.read_height(), self.read_width()),
            _ => (
                self.tile.height() + 2 * self.radius,
                self.tile.width() + 2 * self.radius,
            ),
        }
    }
}

/// Map an out-of-range index into the valid range [0, n) per policy.
/// Folds repeatedly so radii larger than the array still resolve.
/// A size-1 axis has nothing to mirror and degenerates to replication.
fn mirror_index(mut idx: isize, n: usize, include_edge: bool) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    loop {
        if idx < 0 {
            idx = if include_edge { -idx - 1 } else { -idx };
        } else if idx >= n {
            idx = if include_edge { 2 * n - 1 - idx } else { 2 * n - 2 - idx };
        } else {
            return idx as usize;
        }
    }
}

fn statistic(data: &Array3<f64>, stat: PadStatistic) -> f64 {
    let valid: Vec<f64> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    match stat {
        PadStatistic::Mean => valid.iter().sum::<f64>() / valid.len() as f64,
        PadStatistic::Median => {
            let mut sorted = valid;
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        PadStatistic::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
        PadStatistic::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Expand the read data of a window to the nominal padded shape,
/// synthesizing the clipped excess per the edge policy. The center of the
/// result equals the read data; only the out-of-bounds ring is synthetic.
pub fn pad_window(data: Array3<f64>, window: &PaddedWindow, policy: EdgePolicy) -> Array3<f64> {
    let (st, sb, sl, sr) = (
        window.synth_top,
        window.synth_bottom,
        window.synth_left,
        window.synth_right,
    );
    if policy == EdgePolicy::None || (st == 0 && sb == 0 && sl == 0 && sr == 0) {
        return data;
    }

    let (bands, rows, cols) = data.dim();
    let out_rows = rows + st + sb;
    let out_cols = cols + sl + sr;

    let fill = match policy {
        EdgePolicy::Constant(v) => Some(v),
        EdgePolicy::Statistic(stat) => Some(statistic(&data, stat)),
        _ => None,
    };

    let mut out = Array3::<f64>::zeros((bands, out_rows, out_cols));
    for b in 0..bands {
        for r in 0..out_rows {
            let src_r = r as isize - st as isize;
            for c in 0..out_cols {
                let src_c = c as isize - sl as isize;
                let in_bounds = src_r >= 0
                    && src_r < rows as isize
                    && src_c >= 0
                    && src_c < cols as isize;

                out[[b, r, c]] = if in_bounds {
                    data[[b, src_r as usize, src_c as usize]]
                } else if let Some(v) = fill {
                    v
                } else {
                    let (mr, mc) = match policy {
                        EdgePolicy::Edge => (
                            src_r.clamp(0, rows as isize - 1) as usize,
                            src_c.clamp(0, cols as isize - 1) as usize,
                        ),
                        EdgePolicy::Reflect => {
                            (mirror_index(src_r, rows, false), mirror_index(src_c, cols, false))
                        }
                        EdgePolicy::Symmetric => {
                            (mirror_index(src_r, rows, true), mirror_index(src_c, cols, true))
                        }
                        // None / Constant / Statistic handled above
                        _ => unreachable!(),
                    };
                    data[[b, mr, mc]]
                };
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn tile(r0: usize, r1: usize, c0: usize, c1: usize) -> Tile {
        Tile {
            row_start: r0,
            row_end: r1,
            col_start: c0,
            col_end: c1,
        }
    }

    fn band(values: ndarray::Array2<f64>) -> Array3<f64> {
        let (h, w) = values.dim();
        values.into_shape_with_order((1, h, w)).unwrap()
    }

    #[test]
    fn test_interior_window_needs_no_synthesis() {
        let w = PaddedWindow::new(tile(10, 20, 10, 20), 3, 100, 100);
        assert_eq!((w.read_row_start, w.read_row_end), (7, 23));
        assert_eq!((w.read_col_start, w.read_col_end), (7, 23));
        assert_eq!(
            (w.synth_top, w.synth_bottom, w.synth_left, w.synth_right),
            (0, 0, 0, 0)
        );
        assert_eq!(w.data_shape(EdgePolicy::Edge), (16, 16));
    }

    #[test]
    fn test_corner_window_clipping() {
        let w = PaddedWindow::new(tile(0, 10, 0, 10), 3, 100, 100);
        assert_eq!((w.read_row_start, w.read_col_start), (0, 0));
        assert_eq!((w.synth_top, w.synth_left), (3, 3));
        assert_eq!((w.synth_bottom, w.synth_right), (0, 0));
        // Nominal shape is preserved under a synthesizing policy
        assert_eq!(w.data_shape(EdgePolicy::Edge), (16, 16));
        // but not under the none policy
        assert_eq!(w.data_shape(EdgePolicy::None), (13, 13));
        assert_eq!(w.tile_offset(EdgePolicy::Edge), (3, 3));
        assert_eq!(w.tile_offset(EdgePolicy::None), (0, 0));
    }

    #[test]
    fn test_edge_replicate_border() {
        // 2x2 read region at the top-left corner, radius 2: the synthesized
        // border must repeat the nearest valid pixel
        let w = PaddedWindow::new(tile(0, 2, 0, 2), 2, 50, 50);
        let data = band(arr2(&[[1.0, 2.0, 5.0, 6.0], [3.0, 4.0, 7.0, 8.0],
                               [9.0, 9.0, 9.0, 9.0], [9.0, 9.0, 9.0, 9.0]]));
        let padded = pad_window(data, &w, EdgePolicy::Edge);
        assert_eq!(padded.dim(), (1, 6, 6));
        // rows above the raster replicate row 0 of the read data
        for r in 0..2 {
            assert_eq!(padded[[0, r, 2]], 1.0);
            assert_eq!(padded[[0, r, 3]], 2.0);
        }
        // the corner replicates pixel (0,0) in every synthesized cell
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(padded[[0, r, c]], 1.0);
            }
        }
        // center equals the read data
        assert_eq!(padded[[0, 2, 2]], 1.0);
        assert_eq!(padded[[0, 3, 3]], 4.0);
    }

    #[test]
    fn test_reflect_vs_symmetric() {
        let w = PaddedWindow::new(tile(0, 3, 0, 3), 2, 50, 50);
        let data = band(arr2(&[
            [1.0, 2.0, 3.0, 0.0, 0.0],
            [4.0, 5.0, 6.0, 0.0, 0.0],
            [7.0, 8.0, 9.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
        ]));
        let reflect = pad_window(data.clone(), &w, EdgePolicy::Reflect);
        let symmetric = pad_window(data, &w, EdgePolicy::Symmetric);
        // reflect mirrors without the boundary pixel: row -1 -> row 1
        assert_eq!(reflect[[0, 1, 2]], 4.0);
        // symmetric repeats the boundary pixel: row -1 -> row 0
        assert_eq!(symmetric[[0, 1, 2]], 1.0);
    }

    #[test]
    fn test_constant_and_statistic_fill() {
        let w = PaddedWindow::new(tile(0, 2, 0, 2), 1, 50, 50);
        let data = band(arr2(&[[1.0, 2.0, 0.0], [3.0, f64::NAN, 0.0], [0.0, 0.0, 0.0]]));

        let constant = pad_window(data.clone(), &w, EdgePolicy::Constant(-9.0));
        assert_eq!(constant[[0, 0, 0]], -9.0);

        // mean ignores NaN: (1+2+3+0*5)/8
        let mean = pad_window(data.clone(), &w, EdgePolicy::Statistic(PadStatistic::Mean));
        assert!((mean[[0, 0, 0]] - 0.75).abs() < 1e-12);

        let max = pad_window(data, &w, EdgePolicy::Statistic(PadStatistic::Max));
        assert_eq!(max[[0, 0, 0]], 3.0);
    }

    #[test]
    fn test_pad_mode_parsing() {
        assert_eq!("edge".parse::<EdgePolicy>().unwrap(), EdgePolicy::Edge);
        assert_eq!("NONE".parse::<EdgePolicy>().unwrap(), EdgePolicy::None);
        assert_eq!(
            "median".parse::<EdgePolicy>().unwrap(),
            EdgePolicy::Statistic(PadStatistic::Median)
        );
        assert_eq!(
            "constant=1.5".parse::<EdgePolicy>().unwrap(),
            EdgePolicy::Constant(1.5)
        );
        assert!("banana".parse::<EdgePolicy>().is_err());
    }

    #[test]
    fn test_mirror_index_folds_large_radii() {
        // radius larger than the array keeps folding back into range
        assert_eq!(mirror_index(-5, 3, false), 1);
        assert_eq!(mirror_index(7, 3, false), 1);
        assert_eq!(mirror_index(-4, 3, true), 2);
    }

    #[test]
    fn test_mirror_index_size_one_axis_replicates() {
        // a size-1 axis has no mirror image; every index resolves to 0
        // instead of folding forever
        assert_eq!(mirror_index(-1, 1, false), 0);
        assert_eq!(mirror_index(3, 1, false), 0);
        assert_eq!(mirror_index(-2, 1, true), 0);
    }

    #[test]
    fn test_reflect_pad_on_single_row_raster() {
        // 1x1 tile of a 5x1 raster, radius 1: the single-row axis
        // degenerates to edge replication under reflect
        let w = PaddedWindow::new(tile(0, 1, 2, 3), 1, 5, 1);
        let data = band(arr2(&[[1.0, 2.0, 3.0]]));
        let padded = pad_window(data, &w, EdgePolicy::Reflect);
        assert_eq!(padded.dim(), (1, 3, 3));
        for c in 0..3 {
            assert_eq!(padded[[0, 0, c]], padded[[0, 1, c]]);
            assert_eq!(padded[[0, 2, c]], padded[[0, 1, c]]);
        }
        assert_eq!(padded[[0, 1, 1]], 2.0);
    }
}
